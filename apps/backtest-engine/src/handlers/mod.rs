//! Collaborators driven by the dispatch loop.
//!
//! The loop only knows these traits:
//! - [`Strategy`] (chained through [`Strategies`])
//! - [`PortfolioHandler`], which consults a [`PositionSizer`] and a [`RiskManager`]
//! - [`ExecutionHandler`]
//! - [`Statistics`]
//!
//! Each callback receives a [`HandlerContext`] for market queries and for
//! emitting derived events. Reference implementations are provided so a
//! complete run can be assembled from configuration alone.

mod context;
mod error;
mod execution;
mod math;
mod portfolio;
mod sizing;
mod statistics;
mod strategy;

pub use context::HandlerContext;
pub use error::HandlerError;
pub use execution::{ExecutionHandler, SimulatedExecution};
pub use portfolio::{PortfolioHandler, Position, SimplePortfolio};
pub use sizing::{FixedQuantitySizer, PassThroughRiskManager, PortfolioView, PositionSizer, RiskManager};
pub use statistics::{EquityPoint, EquityStatistics, Results, Statistics};
pub use strategy::{DisplayStrategy, Strategies, Strategy};
