//! The closed set of supported venues.

use std::fmt;

/// Number of supported exchanges; also the number of rows in the ticker
/// lattice and in the roster file.
pub const NUM_EXCHANGES: usize = 8;

/// A centralized exchange. The ordinal is stable: it is the row index into
/// the ticker lattice and into the roster file, and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Exchange {
    Binance = 0,
    Bybit = 1,
    Coinbase = 2,
    Gateio = 3,
    Htx = 4,
    Kucoin = 5,
    Mexc = 6,
    Okx = 7,
}

impl Exchange {
    /// All venues in ordinal order.
    pub const ALL: [Exchange; NUM_EXCHANGES] = [
        Exchange::Binance,
        Exchange::Bybit,
        Exchange::Coinbase,
        Exchange::Gateio,
        Exchange::Htx,
        Exchange::Kucoin,
        Exchange::Mexc,
        Exchange::Okx,
    ];

    /// Row index into the lattice and the roster.
    #[inline]
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Inverse of [`Exchange::ordinal`].
    pub fn from_ordinal(ix: usize) -> Option<Exchange> {
        Self::ALL.get(ix).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Exchange::Binance => "Binance",
            Exchange::Bybit => "Bybit",
            Exchange::Coinbase => "Coinbase",
            Exchange::Gateio => "Gateio",
            Exchange::Htx => "HTX",
            Exchange::Kucoin => "Kucoin",
            Exchange::Mexc => "Mexc",
            Exchange::Okx => "OKX",
        }
    }

    /// Initial per-venue weight used by the index engine before the EMA
    /// adaptation has seen any liquidity. The profile sums to 1.0.
    pub fn default_weight(self) -> f64 {
        match self {
            Exchange::Binance => 0.40,
            Exchange::Bybit => 0.075,
            Exchange::Coinbase => 0.072,
            Exchange::Gateio => 0.074,
            Exchange::Htx => 0.068,
            Exchange::Kucoin => 0.070,
            Exchange::Mexc => 0.10,
            Exchange::Okx => 0.05,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_round_trip() {
        for (ix, e) in Exchange::ALL.iter().enumerate() {
            assert_eq!(e.ordinal(), ix);
            assert_eq!(Exchange::from_ordinal(ix), Some(*e));
        }
        assert_eq!(Exchange::from_ordinal(NUM_EXCHANGES), None);
    }

    #[test]
    fn default_weights_sum_to_one() {
        let sum: f64 = Exchange::ALL.iter().map(|e| e.default_weight()).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
