//! Persistence sink — periodic snapshots of the index vector into the
//! time-series store.
//!
//! Persistence is best-effort: a failed insert is logged and the tick moves
//! on, the in-memory index stays the authoritative live view. Rows are
//! re-emitted every tick whether or not they changed; deduplication is the
//! store's concern.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pix_core::shm::ShmRegion;
use pix_core::types::PriceIndex;
use tokio::sync::watch;
use tokio_postgres::NoTls;
use tracing::{error, info, warn};

pub struct DbWriter {
    client: tokio_postgres::Client,
}

impl DbWriter {
    /// Connect and spawn the connection driver task. A failure here is
    /// startup-fatal for the caller.
    pub async fn connect(conn_str: &str) -> anyhow::Result<Self> {
        let (client, connection) = tokio_postgres::connect(conn_str, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {e}");
            }
        });
        info!("connected to postgres");
        Ok(Self { client })
    }

    pub async fn insert_price_index(&self, symbol: &str, ix: &PriceIndex) -> anyhow::Result<()> {
        const QUERY: &str = "INSERT INTO price_index \
            (time, symbol, price_index, num_exchanges, bid_vwap, ask_vwap, bid_qty_total, ask_qty_total) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";
        self.client
            .execute(
                QUERY,
                &[
                    &SystemTime::now(),
                    &symbol,
                    &ix.val,
                    &ix.count,
                    &ix.bid_vwap,
                    &ix.ask_vwap,
                    &ix.bid_qty_total,
                    &ix.ask_qty_total,
                ],
            )
            .await?;
        Ok(())
    }
}

/// Snapshot every named slot with a finite index value, once per interval,
/// until shutdown.
pub async fn run_sink(
    db: DbWriter,
    shm: Arc<ShmRegion>,
    normalized_symbols: Vec<String>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("persistence sink started (period {period:?}, {} slots)", normalized_symbols.len());
    let mut tick = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                for (slot, symbol) in normalized_symbols.iter().enumerate() {
                    // Slots without a canonical name cannot be persisted.
                    if symbol.is_empty() {
                        continue;
                    }
                    let ix = shm.index(slot).load();
                    if !ix.val.is_finite() {
                        continue;
                    }
                    if let Err(e) = db.insert_price_index(symbol, &ix).await {
                        warn!("price_index insert failed for {symbol}: {e}");
                    }
                }
            }
        }
    }
    info!("persistence sink stopped");
}
