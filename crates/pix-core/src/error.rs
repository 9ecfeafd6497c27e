//! Typed error definitions for the price index feed.
//!
//! Provides [`PixError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate seamlessly with
//! `anyhow::Result` at task boundaries.

use thiserror::Error;

/// Domain-specific errors for the price index feed.
#[derive(Debug, Error)]
pub enum PixError {
    /// Environment or CLI configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Symbol roster loading or validation error.
    #[error("roster error: {0}")]
    Roster(String),

    /// Shared memory creation, truncation, or mapping error.
    #[error("shm error: {0}")]
    Shm(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Quote message parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Time-series store error.
    #[error("database error: {0}")]
    Database(String),
}
