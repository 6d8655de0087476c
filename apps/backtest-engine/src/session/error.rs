//! Session error types.

use std::fmt;

use thiserror::Error;

use super::trading::SessionCounters;
use crate::domain::Timestamp;
use crate::handlers::{HandlerError, Results};

/// Which part of the dispatch cycle a handler error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    /// Strategy `on_init`.
    Init,
    /// Strategy chain.
    Strategy,
    /// Portfolio handler.
    Portfolio,
    /// Execution handler.
    Execution,
    /// Strategy `on_deinit`.
    Deinit,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Strategy => "strategy",
            Self::Portfolio => "portfolio",
            Self::Execution => "execution",
            Self::Deinit => "deinit",
        })
    }
}

/// Fatal session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The scheduler produced an event earlier than the previous one.
    #[error("event at {current} precedes previous event at {previous}")]
    OrderingViolation {
        /// Timestamp of the last dispatched event.
        previous: Timestamp,
        /// Timestamp of the offending event.
        current: Timestamp,
    },

    /// A collaborator failed while handling an event.
    #[error("{stage} handler failed: {source}")]
    Handler {
        /// Where in the cycle.
        stage: DispatchStage,
        /// Underlying error.
        #[source]
        source: HandlerError,
    },

    /// The builder was missing a required collaborator.
    #[error("missing session component: {0}")]
    MissingComponent(&'static str),
}

impl SessionError {
    pub(crate) fn handler(stage: DispatchStage) -> impl Fn(HandlerError) -> Self {
        move |source| Self::Handler { stage, source }
    }
}

/// A session that stopped on a fatal error, with what it had computed.
#[derive(Debug, Error)]
#[error("session aborted: {error}")]
pub struct SessionAbort {
    /// Why the session stopped.
    #[source]
    pub error: SessionError,
    /// Statistics collected up to the failure.
    pub partial_results: Results,
    /// Counters at the time of failure.
    pub counters: SessionCounters,
}
