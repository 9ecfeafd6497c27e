//! Composite price index engine.
//!
//! Single consumer of the update channel. Each received slot triggers a
//! from-scratch recompute of that symbol's index over the whole exchange
//! column: a liquidity-weighted average of per-venue mid-prices, plus global
//! per-side VWAPs and size totals. The per-exchange weights are private to
//! the engine and adapt slowly toward each venue's share of visible
//! top-of-book liquidity.

use std::sync::Arc;

use pix_core::shm::{MAX_SYMBOLS, ShmRegion};
use pix_core::types::{Exchange, NUM_EXCHANGES, PriceIndex};
use tokio::sync::{mpsc, watch};
use tracing::info;

/// EMA smoothing: weight retained per recompute.
const EMA_KEEP: f64 = 0.99;
/// EMA smoothing: gain applied to the observed liquidity share.
const EMA_GAIN: f64 = 0.01;

pub struct IndexEngine {
    shm: Arc<ShmRegion>,
    /// `weights[slot][exchange ordinal]`. Positive, not renormalized — the
    /// index only uses relative magnitudes. Every symbol row starts from the
    /// same default venue profile.
    weights: Vec<[f64; NUM_EXCHANGES]>,
}

impl IndexEngine {
    pub fn new(shm: Arc<ShmRegion>) -> Self {
        let defaults: [f64; NUM_EXCHANGES] = Exchange::ALL.map(|e| e.default_weight());
        Self { shm, weights: vec![defaults; MAX_SYMBOLS] }
    }

    /// Consume slot updates until shutdown or until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<usize>, mut shutdown: watch::Receiver<bool>) {
        info!("index engine started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                slot = rx.recv() => {
                    match slot {
                        Some(j) => self.recompute(j),
                        None => break,
                    }
                }
            }
        }
        info!("index engine stopped");
    }

    /// Recompute `indices[slot]` from the current lattice column.
    pub fn recompute(&mut self, slot: usize) {
        let mut weighted_mid = 0.0;
        let mut total_weight = 0.0;
        let mut bid_qty_total = 0.0;
        let mut ask_qty_total = 0.0;
        let mut bid_not_total = 0.0;
        let mut ask_not_total = 0.0;
        let mut count = 0i32;
        let mut qty_per_exch = [0.0f64; NUM_EXCHANGES];

        // First pass: gather contributions. A row contributes when all four
        // fields are finite and some top-of-book size is visible.
        for e in Exchange::ALL {
            let t = self.shm.ticker(e, slot).load();
            if !t.is_contributing() {
                continue;
            }
            let i = e.ordinal();
            qty_per_exch[i] = t.bid_qty + t.ask_qty;

            bid_qty_total += t.bid_qty;
            ask_qty_total += t.ask_qty;
            bid_not_total += t.bid_qty * t.bid;
            ask_not_total += t.ask_qty * t.ask;

            let w = self.weights[slot][i];
            weighted_mid += t.mid() * w;
            total_weight += w;
            count += 1;
        }

        // Second pass: adapt weights toward each venue's share of the
        // displayed liquidity.
        let qty_total = bid_qty_total + ask_qty_total;
        for i in 0..NUM_EXCHANGES {
            if qty_per_exch[i] > 0.0 {
                let share = qty_per_exch[i] / qty_total;
                self.weights[slot][i] = EMA_KEEP * self.weights[slot][i] + EMA_GAIN * share;
            }
        }

        let cell = self.shm.index(slot);
        if total_weight > 0.0 {
            // Any row that added weight also added positive quantities, so
            // the VWAP divisors cannot be zero here.
            assert!(bid_qty_total > 0.0, "contributing rows with zero bid liquidity");
            cell.commit(PriceIndex::new(
                weighted_mid / total_weight,
                count,
                bid_not_total / bid_qty_total,
                ask_not_total / ask_qty_total,
                bid_qty_total,
                ask_qty_total,
            ));
        } else {
            cell.invalidate();
        }
    }
}
