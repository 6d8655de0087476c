//! Stream layer error types.

use thiserror::Error;

use crate::domain::{InstrumentId, ObservationError, Timestamp, TimestampError};

/// A positioned reader failed to produce a row.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// IO error reading data.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A row is missing a required column.
    #[error("line {line}: missing column {column}")]
    MissingColumn {
        /// Line (record) number, 1-based.
        line: u64,
        /// Zero-based column index.
        column: usize,
    },
}

/// A data source could not open an instrument's rows.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No data exists for the instrument.
    #[error("no data for instrument: {0}")]
    NotFound(InstrumentId),

    /// IO error opening data.
    #[error("IO error opening {instrument}: {source}")]
    Io {
        /// Instrument being opened.
        instrument: InstrumentId,
        /// The underlying IO error.
        source: std::io::Error,
    },
}

/// Input data error for one instrument's stream.
///
/// Fatal for that instrument only: the adapter stops producing observations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The reader failed.
    #[error("{instrument}: {source}")]
    Reader {
        /// Instrument whose stream failed.
        instrument: InstrumentId,
        /// Underlying reader failure.
        source: ReaderError,
    },

    /// The row's timestamp could not be parsed.
    #[error("{instrument} line {line}: {source}")]
    Timestamp {
        /// Instrument whose stream failed.
        instrument: InstrumentId,
        /// Line number of the bad row.
        line: u64,
        /// Underlying parse failure.
        source: TimestampError,
    },

    /// The row's price fields could not be parsed.
    #[error("{instrument} line {line}: {source}")]
    Observation {
        /// Instrument whose stream failed.
        instrument: InstrumentId,
        /// Line number of the bad row.
        line: u64,
        /// Underlying parse failure.
        source: ObservationError,
    },

    /// Timestamps within one instrument's stream must strictly increase.
    #[error(
        "{instrument} line {line}: timestamp {current} does not follow previous {previous}"
    )]
    NonMonotonic {
        /// Instrument whose stream failed.
        instrument: InstrumentId,
        /// Line number of the bad row.
        line: u64,
        /// Timestamp of the previous observation.
        previous: Timestamp,
        /// Offending timestamp.
        current: Timestamp,
    },
}

impl StreamError {
    /// Instrument the error belongs to.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentId {
        match self {
            Self::Reader { instrument, .. }
            | Self::Timestamp { instrument, .. }
            | Self::Observation { instrument, .. }
            | Self::NonMonotonic { instrument, .. } => instrument,
        }
    }
}
