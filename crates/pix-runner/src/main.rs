//! # pix-runner
//!
//! Supervisor binary for the composite price index feed.
//!
//! Maps the shared-memory region, loads the symbol roster, starts one
//! session per exchange with a non-empty roster row, the index engine, and
//! (unless disabled) the persistence sink, then waits for an interrupt and
//! shuts everything down cooperatively.
//!
//! # Usage
//!
//! ```bash
//! pix-runner --exchange-info exchange_info.json --save-period 100
//! ```
//!
//! `SHM_PATH` overrides the region file; the database connection comes from
//! `DB_CONN_STR` or the `POSTGRES_*` variables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pix_core::config::{self, ExchangeInfo};
use pix_core::shm::ShmRegion;
use pix_core::types::Exchange;
use pix_md::index::IndexEngine;
use pix_md::sink::{DbWriter, run_sink};
use pix_md::{SessionCtx, UPDATE_CHANNEL_CAPACITY};
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Composite price index feed.
#[derive(Parser)]
#[command(name = "pix-runner", about = "Composite price index feed")]
struct Cli {
    /// Whether to save price indices to the database.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    save_db: bool,

    /// Path to the symbol roster file.
    #[arg(long, default_value = "exchange_info.json")]
    exchange_info: PathBuf,

    /// Period (ms) between database snapshots.
    #[arg(long, default_value_t = 100)]
    save_period: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pix_core::logging::init(&cli.log_level, cli.log_dir.as_deref(), "pix-runner");

    // 1. Map the shared-memory region and NaN-initialize it.
    let shm_path = config::shm_path_from_env();
    let shm = Arc::new(ShmRegion::create(&shm_path)?);
    info!("shm region mapped at {} ({} bytes)", shm_path.display(), ShmRegion::size());

    // 2. Load the roster.
    let roster = ExchangeInfo::load(&cli.exchange_info)?;
    info!("roster loaded — {} exchange rows, {} slots", roster.symbols.len(), roster.normalized().len());

    // 3. Resolve the database connection up front so that missing
    //    configuration aborts before any socket is opened.
    let db = if cli.save_db {
        Some(DbWriter::connect(&config::db_conn_str_from_env()?).await?)
    } else {
        None
    };

    let (update_tx, update_rx) = mpsc::channel::<usize>(UPDATE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 4. One session per exchange with a non-empty roster row.
    let mut sessions = Vec::new();
    for exchange in Exchange::ALL {
        let row = roster.row(exchange);
        if row.is_empty() {
            continue;
        }
        info!("starting {exchange} session ({} symbols)", row.iter().filter(|s| !s.is_empty()).count());
        let ctx = SessionCtx {
            exchange,
            symbols: row.to_vec(),
            shm: shm.clone(),
            update_tx: update_tx.clone(),
            shutdown: shutdown_rx.clone(),
        };
        sessions.push(pix_md::spawn_session(ctx));
    }
    // Sessions hold the only senders now; the engine drains until they stop.
    drop(update_tx);

    // 5. Index engine — single consumer of the update channel.
    let engine = IndexEngine::new(shm.clone());
    let engine_task = tokio::spawn(engine.run(update_rx, shutdown_rx.clone()));

    // 6. Persistence sink.
    let sink_task = db.map(|db| {
        tokio::spawn(run_sink(
            db,
            shm.clone(),
            roster.normalized().to_vec(),
            Duration::from_millis(cli.save_period),
            shutdown_rx.clone(),
        ))
    });

    info!("all workers started — press Ctrl+C to stop");

    // 7. Cooperative shutdown on interrupt.
    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    let _ = shutdown_tx.send(true);

    for session in sessions {
        let _ = session.await;
    }
    let _ = engine_task.await;
    if let Some(task) = sink_task {
        let _ = task.await;
    }

    info!("all workers stopped — goodbye");
    Ok(())
}
