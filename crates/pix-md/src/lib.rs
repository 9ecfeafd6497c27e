//! # pix-md
//!
//! Exchange sessions, quote normalizers, the composite index engine, and the
//! persistence sink.
//!
//! ## Architecture
//!
//! Each venue module exposes `run(ctx)` — a self-contained session task that
//! connects, subscribes, reads, normalizes, writes its lattice row, and
//! signals the index engine through the bounded update channel. Sessions for
//! venues with a plain text protocol share the generic loop in [`ws`]; HTX
//! (gzip + app-level ping), Kucoin (token bootstrap + paced subscriptions),
//! and Mexc (protobuf frames) carry their own loops.

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod gateio;
pub mod htx;
pub mod index;
pub mod json_util;
pub mod kucoin;
pub mod mexc;
pub mod okx;
pub mod sink;
pub mod ws;

use std::sync::Arc;

use ahash::AHashMap;
use pix_core::shm::ShmRegion;
use pix_core::types::{Exchange, TickerData};
use tokio::sync::{mpsc, watch};

/// Capacity of the update channel. Senders await when it fills, which
/// backpressures the feeds; the index engine keeps it cheap to drain.
pub const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Everything one exchange session needs: its lattice row, its slice of the
/// roster, the update channel, and the shutdown signal.
#[derive(Clone)]
pub struct SessionCtx {
    pub exchange: Exchange,
    /// Native spellings, slot-aligned; an empty entry means the venue does
    /// not list that pair.
    pub symbols: Vec<String>,
    pub shm: Arc<ShmRegion>,
    pub update_tx: mpsc::Sender<usize>,
    pub shutdown: watch::Receiver<bool>,
}

impl SessionCtx {
    /// `(slot, native spelling)` pairs, skipping empty roster entries.
    pub fn slot_entries(&self) -> impl Iterator<Item = (usize, &str)> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_empty())
            .map(|(i, s)| (i, s.as_str()))
    }

    /// Native spelling → slot map used by the normalizers.
    pub fn slot_map(&self) -> AHashMap<String, usize> {
        self.slot_entries().map(|(i, s)| (s.to_string(), i)).collect()
    }

    /// Write the owned lattice cell, then signal the index engine. The send
    /// awaits when the channel is full, backpressuring the feed, and its
    /// internal synchronization makes the cell write visible to the
    /// receiver.
    pub async fn publish(&self, slot: usize, data: TickerData) {
        self.shm.ticker(self.exchange, slot).store(data);
        // Err only when the engine is gone, i.e. during shutdown.
        let _ = self.update_tx.send(slot).await;
    }
}

/// Spawn the session task for one exchange row.
pub fn spawn_session(ctx: SessionCtx) -> tokio::task::JoinHandle<()> {
    match ctx.exchange {
        Exchange::Binance => tokio::spawn(binance::run(ctx)),
        Exchange::Bybit => tokio::spawn(bybit::run(ctx)),
        Exchange::Coinbase => tokio::spawn(coinbase::run(ctx)),
        Exchange::Gateio => tokio::spawn(gateio::run(ctx)),
        Exchange::Htx => tokio::spawn(htx::run(ctx)),
        Exchange::Kucoin => tokio::spawn(kucoin::run(ctx)),
        Exchange::Mexc => tokio::spawn(mexc::run(ctx)),
        Exchange::Okx => tokio::spawn(okx::run(ctx)),
    }
}
