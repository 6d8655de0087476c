//! Configuration module for the backtest engine.
//!
//! Provides configuration loading, validation, and environment variable
//! interpolation for the data, session, collaborator and logging settings.
//!
//! # Usage
//!
//! ```rust,ignore
//! use backtest_engine::config::{Config, load_config};
//!
//! // Load from default path (backtest.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/backtest.yaml"))?;
//!
//! println!("instruments: {:?}", config.data.instruments);
//! ```

mod data;
mod observability;
mod trading;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use data::{DataConfig, TickLayout};
pub use observability::{LogFormat, LoggingConfig, ObservabilityConfig};
pub use trading::{ExecutionConfig, PortfolioConfig, SessionConfig, StatisticsConfig};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "backtest.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("cannot read config {path}: {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("invalid config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("invalid config value: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Market data.
    #[serde(default)]
    pub data: DataConfig,
    /// Dispatch loop.
    #[serde(default)]
    pub session: SessionConfig,
    /// Portfolio.
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    /// Simulated execution.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Statistics output.
    #[serde(default)]
    pub statistics: StatisticsConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Check value ranges and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(self)
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "backtest.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Read and parse a config file without validating it.
///
/// Lets callers apply overrides before calling [`Config::validate`].
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read or parsed.
pub fn read_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    let interpolated = interpolate_env_vars(&contents);
    Ok(serde_yaml_bw::from_str(&interpolated)?)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.data.instruments.is_empty() {
        return Err(ConfigError::ValidationError(
            "data.instruments must list at least one instrument".to_string(),
        ));
    }

    if let Some(blank) = config.data.instruments.iter().find(|i| i.trim().is_empty()) {
        return Err(ConfigError::ValidationError(format!(
            "data.instruments contains a blank entry: {blank:?}"
        )));
    }

    if config.data.dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "data.dir must not be empty".to_string(),
        ));
    }

    if let Some(month) = config.data.month
        && !month.is_valid()
    {
        return Err(ConfigError::ValidationError(format!(
            "data.month.month must be 1-12, got {}",
            month.month
        )));
    }

    if config.portfolio.order_quantity == 0 {
        return Err(ConfigError::ValidationError(
            "portfolio.order_quantity must be positive".to_string(),
        ));
    }

    if config.portfolio.initial_cash.is_sign_negative() {
        return Err(ConfigError::ValidationError(
            "portfolio.initial_cash must not be negative".to_string(),
        ));
    }

    if config.execution.commission.is_sign_negative() {
        return Err(ConfigError::ValidationError(
            "execution.commission must not be negative".to_string(),
        ));
    }

    if config.execution.venue.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "execution.venue must not be empty".to_string(),
        ));
    }

    if config.statistics.display_every == 0 {
        return Err(ConfigError::ValidationError(
            "statistics.display_every must be positive".to_string(),
        ));
    }

    if config.session.max_iterations == 0 {
        return Err(ConfigError::ValidationError(
            "session.max_iterations must be positive".to_string(),
        ));
    }

    Ok(())
}
