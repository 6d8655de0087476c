// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::items_after_statements,
        clippy::panic
    )
)]

//! Backtest Engine - Rust Core Library
//!
//! Deterministic event-driven market-data simulation.
//!
//! # Architecture
//!
//! Data flows leaves-first:
//!
//! - **Domain**: timestamps, canonical 5dp decimals, price observations,
//!   compound price events and derived events (signal, order, fill)
//! - **Stream**: positioned row readers (CSV, in-memory), data sources and
//!   the per-instrument adapter that validates and normalizes rows
//! - **Scheduler**: k-way merge of instrument streams into compound events,
//!   one per distinct timestamp, plus last-known market queries
//! - **Session**: the dispatch loop and its secondary FIFO queue
//! - **Handlers**: strategy, portfolio, execution and statistics contracts
//!   with reference implementations
//!
//! Determinism: given the same input files a run produces the same events in
//! the same order with byte-identical decimal text.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Configuration loading and validation.
pub mod config;

/// Domain types.
pub mod domain;

/// Strategy, portfolio, execution and statistics collaborators.
pub mod handlers;

/// Session assembly from configuration.
pub mod runner;

/// K-way merge scheduler.
pub mod scheduler;

/// Dispatch loop and secondary queue.
pub mod session;

/// Per-instrument streams and data sources.
pub mod stream;

/// Tracing subscriber setup.
pub mod telemetry;

pub use config::{Config, ConfigError, load_config, load_config_from_string, read_config};
pub use domain::{
    Action, DerivedEvent, Fill, InstrumentId, Order, PriceEvent, PriceKind, PriceObservation,
    Signal, Timestamp,
};
pub use handlers::{
    ExecutionHandler, HandlerContext, HandlerError, PortfolioHandler, Results, Statistics, Strategy,
};
pub use runner::build_session;
pub use scheduler::{MergeScheduler, SubscriptionError};
pub use session::{
    EventQueue, SessionAbort, SessionError, SessionReport, SessionSettings, Termination,
    TradingSession,
};
pub use stream::{CsvDirectorySource, DataSource, InMemoryDataSource};
