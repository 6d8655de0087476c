//! Collaborator error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::InstrumentId;

/// A collaborator could not handle an event.
///
/// Raised from inside the dispatch loop, every variant aborts the session.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// An order reached execution with nothing to fill.
    #[error("order for {0} has zero quantity")]
    ZeroQuantity(InstrumentId),

    /// No observation has been seen for the instrument yet.
    #[error("no price available for {0}")]
    NoPrice(InstrumentId),

    /// A collaborator refused the event.
    #[error("{handler} rejected event: {reason}")]
    Rejected {
        /// Collaborator name.
        handler: String,
        /// Why.
        reason: String,
    },

    /// Writing a report artifact failed.
    #[error("failed to write report {path}: {source}")]
    Report {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Rejected`].
    pub fn rejected(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}
