//! Assemble a session from configuration.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::Venue;
use crate::handlers::{
    DisplayStrategy, EquityStatistics, FixedQuantitySizer, PassThroughRiskManager,
    SimplePortfolio, SimulatedExecution,
};
use crate::scheduler::MergeScheduler;
use crate::session::{SessionError, TradingSession};
use crate::stream::DataSource;

/// Build a session over `source` using the reference collaborators.
///
/// Instruments that fail to subscribe are logged and skipped; the session
/// still runs over the rest.
///
/// # Errors
///
/// Returns [`SessionError::MissingComponent`] if no instrument could be
/// subscribed.
pub fn build_session(
    config: &Config,
    source: Arc<dyn DataSource>,
    cancellation: CancellationToken,
) -> Result<TradingSession, SessionError> {
    let mut scheduler = MergeScheduler::new(config.data.kind, source);
    let failures = scheduler.subscribe_all(config.data.instruments.iter().map(String::as_str));
    for failure in &failures {
        warn!(error = %failure, "Instrument skipped");
    }
    if scheduler.active_count() == 0 {
        return Err(SessionError::MissingComponent("subscribed instrument"));
    }
    info!(
        subscribed = scheduler.active_count(),
        skipped = failures.len(),
        "Market data ready"
    );

    let portfolio = SimplePortfolio::new(
        config.portfolio.initial_cash,
        Box::new(FixedQuantitySizer::new(config.portfolio.order_quantity)),
        Box::new(PassThroughRiskManager),
    );
    let execution = SimulatedExecution::new(
        Venue::new(config.execution.venue.clone()),
        config.execution.commission,
    );
    let mut statistics = EquityStatistics::new(config.portfolio.initial_cash);
    if let Some(dir) = &config.statistics.output_dir {
        statistics = statistics.with_output_dir(dir);
    }

    TradingSession::builder()
        .scheduler(scheduler)
        .strategy(DisplayStrategy::new(config.statistics.display_every))
        .portfolio(portfolio)
        .execution(execution)
        .statistics(statistics)
        .settings(config.session.settings())
        .cancellation(cancellation)
        .build()
}
