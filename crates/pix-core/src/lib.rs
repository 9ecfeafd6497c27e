//! # pix-core
//!
//! Core crate for the composite price index feed, providing:
//!
//! - **Types** (`types`) — the exchange enumeration and the POD ticker/index
//!   records shared with external readers
//! - **Shared memory** (`shm`) — the fixed-layout mmap'd region holding the
//!   ticker lattice and the index vector
//! - **Configuration** (`config`) — symbol roster loading and environment knobs
//! - **Error types** (`error`) — domain-specific `PixError` via thiserror
//! - **Logging** (`logging`) — tracing-based structured logging
//! - **Time utilities** (`time_util`) — millisecond timestamps for venue
//!   protocol ids

pub mod config;
pub mod error;
pub mod logging;
pub mod shm;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
