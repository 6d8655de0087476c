//! Session loop and reference collaborator configuration.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::handlers::{DisplayStrategy, FixedQuantitySizer, SimulatedExecution};
use crate::session::SessionSettings;

/// Dispatch loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause between cycles in milliseconds.
    #[serde(default)]
    pub heartbeat_ms: u64,
    /// Stop after this many cycles.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// Skip the heartbeat and the final report.
    #[serde(default)]
    pub testing: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: 0,
            max_iterations: default_max_iterations(),
            testing: false,
        }
    }
}

impl SessionConfig {
    /// Loop settings for a [`TradingSession`](crate::session::TradingSession).
    #[must_use]
    pub const fn settings(&self) -> SessionSettings {
        SessionSettings {
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            max_iterations: self.max_iterations,
            testing: self.testing,
        }
    }
}

const fn default_max_iterations() -> u64 {
    SessionSettings::DEFAULT_MAX_ITERATIONS
}

/// Portfolio configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortfolioConfig {
    /// Starting cash.
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,
    /// Units per order.
    #[serde(default = "default_order_quantity")]
    pub order_quantity: u64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            order_quantity: default_order_quantity(),
        }
    }
}

const fn default_initial_cash() -> Decimal {
    dec!(500000.00)
}

const fn default_order_quantity() -> u64 {
    FixedQuantitySizer::DEFAULT_QUANTITY
}

/// Simulated execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Venue attributed to fills.
    #[serde(default = "default_venue")]
    pub venue: String,
    /// Flat commission per fill.
    #[serde(default = "default_commission")]
    pub commission: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            venue: default_venue(),
            commission: default_commission(),
        }
    }
}

fn default_venue() -> String {
    SimulatedExecution::DEFAULT_VENUE.to_string()
}

const fn default_commission() -> Decimal {
    SimulatedExecution::DEFAULT_COMMISSION
}

/// Statistics and progress display configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatisticsConfig {
    /// Directory for `equity.csv` and `results.json`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Log progress every this many price events.
    #[serde(default = "default_display_every")]
    pub display_every: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            display_every: default_display_every(),
        }
    }
}

const fn default_display_every() -> u64 {
    DisplayStrategy::DEFAULT_EVERY
}
