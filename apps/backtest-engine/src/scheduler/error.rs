//! Subscription error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::InstrumentId;
use crate::stream::{SourceError, StreamError};

/// Subscribing or unsubscribing an instrument failed.
///
/// Never fatal to the scheduler: other instruments keep streaming.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The instrument is already active.
    #[error("instrument {0} is already subscribed")]
    AlreadySubscribed(InstrumentId),

    /// The instrument is not active.
    #[error("instrument {0} was never subscribed")]
    NotSubscribed(InstrumentId),

    /// The data source has nothing for the instrument.
    #[error("no data source for instrument {0}")]
    MissingDataSource(InstrumentId),

    /// The data source failed to open the instrument.
    #[error("data source error: {0}")]
    Source(SourceError),

    /// The instrument's data holds no observations.
    #[error("no observations for instrument {0}")]
    EmptyStream(InstrumentId),

    /// The first observation was unusable.
    #[error("input data error: {0}")]
    Stream(#[from] StreamError),
}

impl From<SourceError> for SubscriptionError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::NotFound(instrument) => Self::MissingDataSource(instrument),
            other => Self::Source(other),
        }
    }
}

/// Why an instrument stopped (or never started) producing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `subscribe` was rejected.
    Subscription,
    /// The stream hit an input data error mid-run.
    InputData,
}

/// A recorded per-instrument failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFailure {
    /// Instrument affected.
    pub instrument: InstrumentId,
    /// Failure category.
    pub kind: FailureKind,
    /// Rendered error.
    pub message: String,
}
