//! Shared type definitions: the exchange enumeration and the POD records
//! exposed through shared memory.

pub mod exchange;
pub mod ticker;

pub use exchange::{Exchange, NUM_EXCHANGES};
pub use ticker::{PriceIndex, TickerData};
