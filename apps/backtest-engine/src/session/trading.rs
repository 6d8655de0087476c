//! The dispatch loop.
//!
//! Each cycle pulls one compound price event from the scheduler, hands it to
//! the strategy chain, the portfolio and statistics (in that order), then
//! drains every derived event the collaborators emitted before asking for
//! the next price event. Time never moves backwards between cycles.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{DispatchStage, SessionAbort, SessionError};
use super::queue::EventQueue;
use crate::domain::{DerivedEvent, PriceEvent, PriceKind, Timestamp};
use crate::handlers::{
    ExecutionHandler, HandlerContext, PortfolioHandler, Results, Statistics, Strategies, Strategy,
};
use crate::scheduler::{DataFailure, MergeScheduler};

/// Loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Pause between cycles (ignored in testing mode).
    pub heartbeat: Duration,
    /// Stop after this many cycles.
    pub max_iterations: u64,
    /// Skip the heartbeat and the final report.
    pub testing: bool,
}

impl SessionSettings {
    /// Default cycle budget.
    pub const DEFAULT_MAX_ITERATIONS: u64 = 10_000_000_000;
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::ZERO,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            testing: false,
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Built, strategies not yet initialized.
    Initializing,
    /// Requesting and dispatching price events.
    Running,
    /// Emptying the secondary queue.
    Draining,
    /// Done, normally or not.
    Finished,
}

/// Why a session stopped normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every stream was drained.
    Exhausted,
    /// `max_iterations` cycles ran.
    IterationBudget,
    /// The cancellation token fired.
    Interrupted,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Exhausted => "exhausted",
            Self::IterationBudget => "iteration_budget",
            Self::Interrupted => "interrupted",
        })
    }
}

/// What the loop processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Price events dispatched.
    pub cycles: u64,
    /// Tick events among them.
    pub ticks: u64,
    /// Bar events among them.
    pub bars: u64,
    /// Signals drained.
    pub signals: u64,
    /// Orders drained.
    pub orders: u64,
    /// Fills drained.
    pub fills: u64,
    /// Timestamp of the last dispatched price event.
    pub last_timestamp: Option<Timestamp>,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Statistics results.
    pub results: Results,
    /// Why the loop stopped.
    pub termination: Termination,
    /// Loop counters.
    pub counters: SessionCounters,
    /// Instruments that failed to subscribe or stopped on bad data.
    pub data_failures: Vec<DataFailure>,
}

/// A backtest run: scheduler, collaborators and loop state.
pub struct TradingSession {
    scheduler: MergeScheduler,
    strategies: Strategies,
    portfolio: Box<dyn PortfolioHandler>,
    execution: Box<dyn ExecutionHandler>,
    statistics: Box<dyn Statistics>,
    settings: SessionSettings,
    cancellation: CancellationToken,
    queue: EventQueue,
    state: SessionState,
    previous_timestamp: Option<Timestamp>,
    counters: SessionCounters,
}

impl std::fmt::Debug for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingSession")
            .field("scheduler", &self.scheduler)
            .field("strategies", &self.strategies)
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl TradingSession {
    /// Start assembling a session.
    #[must_use]
    pub fn builder() -> TradingSessionBuilder {
        TradingSessionBuilder::new()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Token that interrupts the run at the next cycle boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Drive the loop to completion.
    ///
    /// On exhaustion, budget or interruption the strategies are
    /// deinitialized and the report carries the final statistics. A fatal
    /// error skips deinitialization and returns whatever statistics were
    /// collected.
    pub fn run(mut self) -> Result<SessionReport, SessionAbort> {
        let started = Instant::now();
        info!(
            kind = %self.scheduler.kind(),
            instruments = self.scheduler.active_count(),
            strategies = ?self.strategies.names().collect::<Vec<_>>(),
            max_iterations = self.settings.max_iterations,
            testing = self.settings.testing,
            "Session starting"
        );

        let outcome = self.execute().and_then(|termination| {
            self.strategies
                .on_deinit()
                .map_err(SessionError::handler(DispatchStage::Deinit))?;
            Ok(termination)
        });
        self.state = SessionState::Finished;

        match outcome {
            Ok(termination) => Ok(self.finish(termination, started.elapsed())),
            Err(error) => Err(self.abort(error)),
        }
    }

    fn execute(&mut self) -> Result<Termination, SessionError> {
        self.strategies
            .on_init()
            .map_err(SessionError::handler(DispatchStage::Init))?;
        self.state = SessionState::Running;

        loop {
            if self.cancellation.is_cancelled() {
                info!(cycles = self.counters.cycles, "Session interrupted");
                return Ok(Termination::Interrupted);
            }
            if self.counters.cycles >= self.settings.max_iterations {
                info!(cycles = self.counters.cycles, "Iteration budget reached");
                return Ok(Termination::IterationBudget);
            }
            let Some(event) = self.scheduler.advance() else {
                return Ok(Termination::Exhausted);
            };

            let current = event.timestamp();
            check_ordering(self.previous_timestamp, current)?;

            self.dispatch_price(&event)?;
            self.drain()?;

            self.previous_timestamp = Some(current);
            self.counters.cycles += 1;
            match event.kind() {
                PriceKind::Tick => self.counters.ticks += 1,
                PriceKind::Bar => self.counters.bars += 1,
            }
            self.counters.last_timestamp = Some(current);

            if !self.settings.testing && !self.settings.heartbeat.is_zero() {
                std::thread::sleep(self.settings.heartbeat);
            }
        }
    }

    fn dispatch_price(&mut self, event: &PriceEvent) -> Result<(), SessionError> {
        debug!(event = %event, "Dispatching price event");
        let mut ctx = HandlerContext::new(&self.scheduler, &mut self.queue);

        self.strategies
            .on_price(event, &mut ctx)
            .map_err(SessionError::handler(DispatchStage::Strategy))?;
        self.portfolio
            .on_price(event, &mut ctx)
            .map_err(SessionError::handler(DispatchStage::Portfolio))?;
        self.statistics.on_price(event, self.portfolio.equity());
        Ok(())
    }

    /// Handle queued events until none are left, including those emitted
    /// while draining.
    fn drain(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Draining;

        while let Some(derived) = self.queue.try_pop() {
            debug!(event = %derived, "Draining derived event");
            let mut ctx = HandlerContext::new(&self.scheduler, &mut self.queue);

            match &derived {
                DerivedEvent::Signal(signal) => {
                    self.counters.signals += 1;
                    self.strategies
                        .on_signal(signal, &mut ctx)
                        .map_err(SessionError::handler(DispatchStage::Strategy))?;
                    self.portfolio
                        .on_signal(signal, &mut ctx)
                        .map_err(SessionError::handler(DispatchStage::Portfolio))?;
                }
                DerivedEvent::Order(order) => {
                    self.counters.orders += 1;
                    self.strategies
                        .on_order(order, &mut ctx)
                        .map_err(SessionError::handler(DispatchStage::Strategy))?;
                    self.execution
                        .on_order(order, &mut ctx)
                        .map_err(SessionError::handler(DispatchStage::Execution))?;
                }
                DerivedEvent::Fill(fill) => {
                    self.counters.fills += 1;
                    self.strategies
                        .on_fill(fill, &mut ctx)
                        .map_err(SessionError::handler(DispatchStage::Strategy))?;
                    self.portfolio
                        .on_fill(fill, &mut ctx)
                        .map_err(SessionError::handler(DispatchStage::Portfolio))?;
                }
            }
        }

        self.state = SessionState::Running;
        Ok(())
    }

    fn finish(self, termination: Termination, elapsed: Duration) -> SessionReport {
        let results = self.statistics.results();
        info!(
            termination = %termination,
            cycles = self.counters.cycles,
            ticks = self.counters.ticks,
            bars = self.counters.bars,
            signals = self.counters.signals,
            orders = self.counters.orders,
            fills = self.counters.fills,
            derived_events = self.queue.total_enqueued(),
            data_failures = self.scheduler.failures().len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Session finished"
        );

        if !self.settings.testing
            && let Err(e) = self.statistics.report(&results)
        {
            warn!(error = %e, "Failed to report statistics");
        }

        SessionReport {
            results,
            termination,
            counters: self.counters,
            data_failures: self.scheduler.failures().to_vec(),
        }
    }

    fn abort(self, error: SessionError) -> SessionAbort {
        error!(
            error = %error,
            cycles = self.counters.cycles,
            last_timestamp = ?self.counters.last_timestamp,
            "Session aborted"
        );
        SessionAbort {
            error,
            partial_results: self.statistics.results(),
            counters: self.counters,
        }
    }
}

/// Time may stand still between cycles but never run backwards.
fn check_ordering(previous: Option<Timestamp>, current: Timestamp) -> Result<(), SessionError> {
    match previous {
        Some(previous) if current < previous => {
            Err(SessionError::OrderingViolation { previous, current })
        }
        _ => Ok(()),
    }
}

/// Assembles a [`TradingSession`].
#[derive(Default)]
pub struct TradingSessionBuilder {
    scheduler: Option<MergeScheduler>,
    strategies: Strategies,
    portfolio: Option<Box<dyn PortfolioHandler>>,
    execution: Option<Box<dyn ExecutionHandler>>,
    statistics: Option<Box<dyn Statistics>>,
    settings: SessionSettings,
    cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for TradingSessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingSessionBuilder")
            .field("has_scheduler", &self.scheduler.is_some())
            .field("strategies", &self.strategies)
            .field("has_portfolio", &self.portfolio.is_some())
            .field("has_execution", &self.execution.is_some())
            .field("has_statistics", &self.statistics.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl TradingSessionBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the market data scheduler (instruments already subscribed).
    #[must_use]
    pub fn scheduler(mut self, scheduler: MergeScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Append a strategy to the chain.
    #[must_use]
    pub fn strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Set the portfolio handler.
    #[must_use]
    pub fn portfolio(mut self, portfolio: impl PortfolioHandler + 'static) -> Self {
        self.portfolio = Some(Box::new(portfolio));
        self
    }

    /// Set the execution handler.
    #[must_use]
    pub fn execution(mut self, execution: impl ExecutionHandler + 'static) -> Self {
        self.execution = Some(Box::new(execution));
        self
    }

    /// Set the statistics collector.
    #[must_use]
    pub fn statistics(mut self, statistics: impl Statistics + 'static) -> Self {
        self.statistics = Some(Box::new(statistics));
        self
    }

    /// Set loop tuning.
    #[must_use]
    pub const fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Build the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingComponent`] if the scheduler, a
    /// strategy, the portfolio, execution or statistics is missing.
    pub fn build(self) -> Result<TradingSession, SessionError> {
        let scheduler = self
            .scheduler
            .ok_or(SessionError::MissingComponent("scheduler"))?;
        if self.strategies.is_empty() {
            return Err(SessionError::MissingComponent("strategy"));
        }
        let portfolio = self
            .portfolio
            .ok_or(SessionError::MissingComponent("portfolio"))?;
        let execution = self
            .execution
            .ok_or(SessionError::MissingComponent("execution"))?;
        let statistics = self
            .statistics
            .ok_or(SessionError::MissingComponent("statistics"))?;

        Ok(TradingSession {
            scheduler,
            strategies: self.strategies,
            portfolio,
            execution,
            statistics,
            settings: self.settings,
            cancellation: self.cancellation.unwrap_or_default(),
            queue: EventQueue::new(),
            state: SessionState::Initializing,
            previous_timestamp: None,
            counters: SessionCounters::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{Action, Signal};
    use crate::handlers::{
        DisplayStrategy, EquityStatistics, FixedQuantitySizer, HandlerError,
        PassThroughRiskManager, SimplePortfolio, SimulatedExecution,
    };
    use crate::stream::InMemoryDataSource;

    fn bars(n: u32) -> Vec<(String, Vec<String>)> {
        (1..=n)
            .map(|day| {
                let close = format!("{}.0", 100 + day);
                (
                    format!("2024-01-{day:02}"),
                    vec![close.clone(), close.clone(), close.clone(), close.clone(), "1000".into(), close],
                )
            })
            .collect()
    }

    fn scheduler(n: u32) -> MergeScheduler {
        let mut source = InMemoryDataSource::new();
        source.add_records("GOOG", &bars(n));
        let mut scheduler = MergeScheduler::new(PriceKind::Bar, Arc::new(source));
        scheduler.subscribe("GOOG").unwrap();
        scheduler
    }

    fn portfolio() -> SimplePortfolio {
        SimplePortfolio::new(
            dec!(10000),
            Box::new(FixedQuantitySizer::new(10)),
            Box::new(PassThroughRiskManager),
        )
    }

    fn testing() -> SessionSettings {
        SessionSettings {
            testing: true,
            ..SessionSettings::default()
        }
    }

    /// Buys on the first bar.
    struct BuyOnce {
        done: bool,
    }

    impl Strategy for BuyOnce {
        fn name(&self) -> &str {
            "buy_once"
        }

        fn on_bar(
            &mut self,
            event: &PriceEvent,
            ctx: &mut HandlerContext<'_>,
        ) -> Result<(), HandlerError> {
            if !self.done {
                for instrument in event.instruments() {
                    ctx.emit(Signal {
                        instrument: instrument.clone(),
                        action: Action::Buy,
                    });
                }
                self.done = true;
            }
            Ok(())
        }
    }

    fn session(n: u32, settings: SessionSettings) -> TradingSession {
        TradingSession::builder()
            .scheduler(scheduler(n))
            .strategy(BuyOnce { done: false })
            .portfolio(portfolio())
            .execution(SimulatedExecution::default())
            .statistics(EquityStatistics::new(dec!(10000)))
            .settings(settings)
            .build()
            .unwrap()
    }

    #[test]
    fn test_run_to_exhaustion() {
        let report = session(5, testing()).run().unwrap();

        assert_eq!(report.termination, Termination::Exhausted);
        assert_eq!(report.counters.cycles, 5);
        assert_eq!(report.counters.bars, 5);
        assert_eq!(report.counters.signals, 1);
        assert_eq!(report.counters.orders, 1);
        assert_eq!(report.counters.fills, 1);
        assert_eq!(report.counters.last_timestamp, Timestamp::parse("2024-01-05").ok());

        // Bought 10 @ 101 with 1.00 commission, marked at 105.
        assert_eq!(report.results["final_equity"], dec!(10039));
    }

    #[test]
    fn test_iteration_budget_stops_gracefully() {
        let settings = SessionSettings {
            max_iterations: 2,
            ..testing()
        };
        let report = session(5, settings).run().unwrap();
        assert_eq!(report.termination, Termination::IterationBudget);
        assert_eq!(report.counters.cycles, 2);
    }

    #[test]
    fn test_cancelled_before_start() {
        let session = session(5, testing());
        session.cancellation_token().cancel();
        let report = session.run().unwrap();
        assert_eq!(report.termination, Termination::Interrupted);
        assert_eq!(report.counters.cycles, 0);
    }

    #[test]
    fn test_ordering_check() {
        let earlier = Timestamp::parse("2024-01-01").unwrap();
        let later = Timestamp::parse("2024-01-02").unwrap();

        assert!(check_ordering(None, earlier).is_ok());
        assert!(check_ordering(Some(earlier), later).is_ok());
        assert!(check_ordering(Some(earlier), earlier).is_ok());
        assert!(matches!(
            check_ordering(Some(later), earlier),
            Err(SessionError::OrderingViolation { previous, current })
                if previous == later && current == earlier
        ));
    }

    #[test]
    fn test_missing_component() {
        let err = TradingSession::builder()
            .scheduler(scheduler(1))
            .strategy(DisplayStrategy::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingComponent("portfolio")));

        let err = TradingSession::builder().build().unwrap_err();
        assert!(matches!(err, SessionError::MissingComponent("scheduler")));
    }

    #[test]
    fn test_zero_quantity_aborts_with_partial_results() {
        let session = TradingSession::builder()
            .scheduler(scheduler(3))
            .strategy(BuyOnce { done: false })
            .portfolio(SimplePortfolio::new(
                dec!(10000),
                Box::new(FixedQuantitySizer::new(0)),
                Box::new(PassThroughRiskManager),
            ))
            .execution(SimulatedExecution::default())
            .statistics(EquityStatistics::new(dec!(10000)))
            .settings(testing())
            .build()
            .unwrap();

        let abort = session.run().unwrap_err();
        assert!(matches!(
            abort.error,
            SessionError::Handler {
                stage: DispatchStage::Execution,
                source: HandlerError::ZeroQuantity(_),
            }
        ));
        assert_eq!(abort.partial_results["events"], dec!(1));
        assert_eq!(abort.counters.cycles, 0);
    }
}
