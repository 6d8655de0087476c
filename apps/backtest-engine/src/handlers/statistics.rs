//! Run statistics: equity curve and performance summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::HandlerError;
use super::math;
use crate::domain::{PriceEvent, Timestamp, normalize};

/// Named metrics produced at the end of a run.
pub type Results = BTreeMap<String, Decimal>;

/// Observes the portfolio after every price event.
pub trait Statistics: Send {
    /// Record the portfolio's equity after `event` was dispatched.
    fn on_price(&mut self, event: &PriceEvent, equity: Decimal);

    /// Metrics so far. Safe to call mid-run for partial results.
    fn results(&self) -> Results;

    /// Publish `results` (logs, files). Side effects only.
    fn report(&self, results: &Results) -> Result<(), HandlerError>;
}

/// A point on the equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Portfolio equity after the event.
    pub equity: Decimal,
}

/// Equity curve collector.
///
/// Results:
/// - `final_equity`
/// - `total_return`, `total_return_pct`
/// - `max_drawdown`, `max_drawdown_pct`
/// - `sharpe` (per-event returns annualized by √252, omitted when undefined)
/// - `events`
#[derive(Debug, Clone)]
pub struct EquityStatistics {
    initial_equity: Decimal,
    curve: Vec<EquityPoint>,
    output_dir: Option<PathBuf>,
}

impl EquityStatistics {
    /// Track a portfolio starting at `initial_equity`.
    #[must_use]
    pub const fn new(initial_equity: Decimal) -> Self {
        Self {
            initial_equity,
            curve: Vec::new(),
            output_dir: None,
        }
    }

    /// Write `equity.csv` and `results.json` into `dir` on report.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Recorded equity curve.
    #[must_use]
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.curve
    }

    fn write_equity_csv(&self, path: &Path) -> Result<(), HandlerError> {
        let report_error = |source: std::io::Error| HandlerError::Report {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| report_error(std::io::Error::other(e)))?;
        writer
            .write_record(["timestamp", "equity"])
            .map_err(|e| report_error(std::io::Error::other(e)))?;
        for point in &self.curve {
            writer
                .write_record([point.timestamp.to_string(), point.equity.to_string()])
                .map_err(|e| report_error(std::io::Error::other(e)))?;
        }
        writer.flush().map_err(report_error)
    }

    fn write_results_json(path: &Path, results: &Results) -> Result<(), HandlerError> {
        let json = serde_json::to_string_pretty(results).map_err(|e| HandlerError::Report {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        fs::write(path, json).map_err(|source| HandlerError::Report {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Statistics for EquityStatistics {
    fn on_price(&mut self, event: &PriceEvent, equity: Decimal) {
        self.curve.push(EquityPoint {
            timestamp: event.timestamp(),
            equity,
        });
    }

    fn results(&self) -> Results {
        let mut results = Results::new();

        let equities: Vec<Decimal> = std::iter::once(self.initial_equity)
            .chain(self.curve.iter().map(|p| p.equity))
            .collect();
        let final_equity = equities.last().copied().unwrap_or(self.initial_equity);
        let total_return = final_equity - self.initial_equity;

        results.insert("events".into(), Decimal::from(self.curve.len()));
        results.insert("final_equity".into(), normalize(final_equity));
        results.insert("total_return".into(), normalize(total_return));
        if !self.initial_equity.is_zero() {
            results.insert(
                "total_return_pct".into(),
                normalize(total_return / self.initial_equity * Decimal::ONE_HUNDRED),
            );
        }

        let (drawdown, drawdown_pct) = math::max_drawdown(self.initial_equity, &equities);
        results.insert("max_drawdown".into(), normalize(drawdown));
        results.insert("max_drawdown_pct".into(), normalize(drawdown_pct));

        if let Some(sharpe) = math::annualized_sharpe(&math::period_returns(&equities)) {
            results.insert("sharpe".into(), normalize(sharpe));
        }

        results
    }

    fn report(&self, results: &Results) -> Result<(), HandlerError> {
        for (name, value) in results {
            info!(metric = %name, value = %value, "Result");
        }

        let Some(dir) = &self.output_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir).map_err(|source| HandlerError::Report {
            path: dir.clone(),
            source,
        })?;

        let equity_path = dir.join("equity.csv");
        self.write_equity_csv(&equity_path)?;
        let results_path = dir.join("results.json");
        Self::write_results_json(&results_path, results)?;

        info!(
            equity = %equity_path.display(),
            results = %results_path.display(),
            "Report written"
        );
        Ok(())
    }
}
