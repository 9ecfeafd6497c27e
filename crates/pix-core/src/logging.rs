//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is always on; passing a log directory adds a daily-rotating
//! file layer. The level can be overridden at runtime via `RUST_LOG`.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. Call once at program start.
///
/// - `log_level`: default level if `RUST_LOG` is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `prefix`: log file name prefix
pub fn init(log_level: &str, log_dir: Option<&Path>, prefix: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, prefix);
            let file_layer =
                fmt::layer().with_writer(file_appender).with_ansi(false).with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(console_layer).init();
        }
    }
}
