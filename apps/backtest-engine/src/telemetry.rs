//! Tracing Setup
//!
//! Installs a `tracing_subscriber` fmt subscriber driven by
//! [`LoggingConfig`]. `RUST_LOG`, when set, takes precedence over the
//! configured level.
//!
//! # Usage
//!
//! ```rust,ignore
//! use backtest_engine::{config::LoggingConfig, telemetry::init_tracing};
//!
//! fn main() {
//!     init_tracing(&LoggingConfig::default());
//!     // ... application code
//! }
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` if set and valid, otherwise the configured level.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global subscriber.
///
/// Logs go to stderr so stdout stays free for results. Calling this more
/// than once is harmless; later calls are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(config.include_target)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(level = %config.level, format = ?config.format, "Tracing initialized");
    }
}
