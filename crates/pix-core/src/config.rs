//! Symbol roster loading and environment configuration.
//!
//! The roster file (`exchange_info.json`) is a 2-D array of native symbol
//! spellings indexed `[exchange ordinal][symbol slot]`:
//!
//! ```json
//! { "symbols": [
//!     ["BTCUSDT", "ETHUSDT"],
//!     ["BTCUSDT", "ETHUSDT"],
//!     ["BTC-USD", "ETH-USD"]
//! ] }
//! ```
//!
//! Column *j* on every row is the same logical pair; row 0 (Binance) carries
//! the canonical normalized name used by the persistence sink. An empty
//! entry means the venue does not list that pair.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PixError;
use crate::shm::MAX_SYMBOLS;
use crate::types::{Exchange, NUM_EXCHANGES};

/// Env var overriding the shared-memory file path.
pub const SHM_PATH_ENV: &str = "SHM_PATH";
/// Default shared-memory file, created in the working directory.
pub const DEFAULT_SHM_PATH: &str = ".price_ix.data";

/// The per-exchange symbol roster, column-aligned across exchanges.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<Vec<String>>,
}

impl ExchangeInfo {
    /// Load and validate the roster file.
    pub fn load(path: &Path) -> Result<Self, PixError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PixError::Roster(format!("read {}: {e}", path.display())))?;
        let info: ExchangeInfo = serde_json::from_str(&content)
            .map_err(|e| PixError::Roster(format!("parse {}: {e}", path.display())))?;
        info.validate()?;
        Ok(info)
    }

    fn validate(&self) -> Result<(), PixError> {
        if self.symbols.len() > NUM_EXCHANGES {
            return Err(PixError::Roster(format!(
                "{} exchange rows, only {NUM_EXCHANGES} supported",
                self.symbols.len()
            )));
        }
        for (ix, row) in self.symbols.iter().enumerate() {
            if row.len() > MAX_SYMBOLS {
                let name = Exchange::from_ordinal(ix).map(|e| e.name()).unwrap_or("?");
                return Err(PixError::Roster(format!(
                    "{name} row has {} symbols, lattice holds {MAX_SYMBOLS}",
                    row.len()
                )));
            }
        }
        Ok(())
    }

    /// Native spellings for one exchange row; empty when the roster has no
    /// row for the venue.
    pub fn row(&self, exchange: Exchange) -> &[String] {
        self.symbols.get(exchange.ordinal()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row 0: the canonical normalized symbol names, one per slot.
    pub fn normalized(&self) -> &[String] {
        self.symbols.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Shared-memory file path: `SHM_PATH` or the working-directory default.
pub fn shm_path_from_env() -> PathBuf {
    match env::var(SHM_PATH_ENV) {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => PathBuf::from(DEFAULT_SHM_PATH),
    }
}

/// Time-series connection string: `DB_CONN_STR` verbatim, or assembled from
/// the five `POSTGRES_*` parts. Each part is required when `DB_CONN_STR` is
/// unset; a missing one is a startup-fatal condition.
pub fn db_conn_str_from_env() -> Result<String, PixError> {
    if let Ok(s) = env::var("DB_CONN_STR")
        && !s.is_empty()
    {
        return Ok(s);
    }
    let user = require_env("POSTGRES_USER")?;
    let password = require_env("POSTGRES_PASSWORD")?;
    let dbname = require_env("POSTGRES_DB")?;
    let host = require_env("POSTGRES_HOST")?;
    let port = require_env("POSTGRES_PORT")?;
    Ok(assemble_conn_str(&user, &password, &host, &port, &dbname))
}

fn require_env(key: &str) -> Result<String, PixError> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(PixError::Config(format!("required environment variable missing: {key}"))),
    }
}

fn assemble_conn_str(user: &str, password: &str, host: &str, port: &str, dbname: &str) -> String {
    format!("postgres://{user}:{password}@{host}:{port}/{dbname}?sslmode=disable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_roster_rows_and_normalized() {
        let json = r#"{ "symbols": [
            ["BTCUSDT", "ETHUSDT"],
            ["BTCUSDT"],
            ["BTC-USD", "ETH-USD"]
        ] }"#;
        let info: ExchangeInfo = serde_json::from_str(json).unwrap();
        info.validate().unwrap();
        assert_eq!(info.normalized(), ["BTCUSDT", "ETHUSDT"]);
        assert_eq!(info.row(Exchange::Coinbase), ["BTC-USD", "ETH-USD"]);
        // rows beyond the file are empty → no session for those venues
        assert!(info.row(Exchange::Okx).is_empty());
    }

    #[test]
    fn too_many_rows_rejected() {
        let rows: Vec<Vec<String>> = (0..NUM_EXCHANGES + 1).map(|_| vec![]).collect();
        let info = ExchangeInfo { symbols: rows };
        assert!(info.validate().is_err());
    }

    #[test]
    fn oversized_row_rejected() {
        let row: Vec<String> = (0..MAX_SYMBOLS + 1).map(|i| format!("S{i}USDT")).collect();
        let info = ExchangeInfo { symbols: vec![row] };
        assert!(info.validate().is_err());
    }

    #[test]
    fn conn_str_assembly() {
        assert_eq!(
            assemble_conn_str("u", "p", "db.host", "5432", "prices"),
            "postgres://u:p@db.host:5432/prices?sslmode=disable"
        );
    }
}
