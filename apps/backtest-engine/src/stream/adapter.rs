//! Per-instrument stream adapter.
//!
//! Wraps one instrument's positioned reader and turns raw rows into
//! canonical `(Timestamp, PriceObservation)` pairs, one at a time.
//!
//! Timestamps must strictly increase within a stream. Any input data error
//! (unreadable row, bad timestamp, bad price field, repeated or backwards
//! timestamp) moves the adapter into a terminal failed state: the error is
//! returned once and every later call reports exhaustion.

use tracing::{debug, warn};

use super::error::StreamError;
use super::reader::RowReader;
use crate::domain::{InstrumentId, PriceKind, PriceObservation, Timestamp};

/// Lifecycle of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// More rows may be available.
    Streaming,
    /// The reader reported end of data.
    Exhausted,
    /// An input data error ended the stream.
    Failed,
}

/// Ordered observations for a single instrument.
pub struct InstrumentStream {
    instrument: InstrumentId,
    kind: PriceKind,
    reader: Box<dyn RowReader>,
    state: StreamState,
    last_timestamp: Option<Timestamp>,
    rows_read: u64,
}

impl std::fmt::Debug for InstrumentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentStream")
            .field("instrument", &self.instrument)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("last_timestamp", &self.last_timestamp)
            .field("rows_read", &self.rows_read)
            .finish_non_exhaustive()
    }
}

impl InstrumentStream {
    /// Wrap a reader. Performs no I/O.
    #[must_use]
    pub fn new(instrument: InstrumentId, kind: PriceKind, reader: Box<dyn RowReader>) -> Self {
        Self {
            instrument,
            kind,
            reader,
            state: StreamState::Streaming,
            last_timestamp: None,
            rows_read: 0,
        }
    }

    /// Pull the next observation.
    ///
    /// `Ok(None)` means the stream is exhausted (or previously failed) and
    /// will stay that way.
    pub fn next_observation(
        &mut self,
    ) -> Result<Option<(Timestamp, PriceObservation)>, StreamError> {
        if self.state != StreamState::Streaming {
            return Ok(None);
        }

        match self.read_next() {
            Ok(Some((timestamp, observation))) => {
                self.last_timestamp = Some(timestamp);
                self.rows_read += 1;
                Ok(Some((timestamp, observation)))
            }
            Ok(None) => {
                debug!(
                    instrument = %self.instrument,
                    rows = self.rows_read,
                    "Stream exhausted"
                );
                self.state = StreamState::Exhausted;
                Ok(None)
            }
            Err(e) => {
                warn!(
                    instrument = %self.instrument,
                    rows = self.rows_read,
                    error = %e,
                    "Stream failed on input data error"
                );
                self.state = StreamState::Failed;
                Err(e)
            }
        }
    }

    fn read_next(&mut self) -> Result<Option<(Timestamp, PriceObservation)>, StreamError> {
        let Some(row) = self
            .reader
            .next_row()
            .map_err(|source| StreamError::Reader {
                instrument: self.instrument.clone(),
                source,
            })?
        else {
            return Ok(None);
        };

        let timestamp =
            Timestamp::parse(&row.timestamp).map_err(|source| StreamError::Timestamp {
                instrument: self.instrument.clone(),
                line: row.line,
                source,
            })?;

        if let Some(previous) = self.last_timestamp
            && timestamp <= previous
        {
            return Err(StreamError::NonMonotonic {
                instrument: self.instrument.clone(),
                line: row.line,
                previous,
                current: timestamp,
            });
        }

        let observation = PriceObservation::from_fields(self.kind, &row.fields).map_err(
            |source| StreamError::Observation {
                instrument: self.instrument.clone(),
                line: row.line,
                source,
            },
        )?;

        Ok(Some((timestamp, observation)))
    }

    /// Instrument served by this stream.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    /// Observation shape produced.
    #[must_use]
    pub const fn kind(&self) -> PriceKind {
        self.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// True once the stream will produce nothing more.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state != StreamState::Streaming
    }

    /// Timestamp of the last observation produced.
    #[must_use]
    pub const fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Observations produced so far.
    #[must_use]
    pub const fn rows_read(&self) -> u64 {
        self.rows_read
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::stream::InMemoryReader;

    fn bar_stream(records: &[(&str, Vec<&str>)]) -> InstrumentStream {
        InstrumentStream::new(
            InstrumentId::new("GOOG"),
            PriceKind::Bar,
            Box::new(InMemoryReader::from_records(records)),
        )
    }

    fn bar(close: &str) -> Vec<&str> {
        vec!["1", "2", "0.5", close, "100", close]
    }

    #[test]
    fn test_stream_yields_in_order_then_exhausts() {
        let mut stream = bar_stream(&[("2024-01-01", bar("1.5")), ("2024-01-02", bar("1.6"))]);

        let (ts, obs) = stream.next_observation().unwrap().unwrap();
        assert_eq!(ts, Timestamp::parse("2024-01-01").unwrap());
        assert_eq!(obs.as_bar().unwrap().close, dec!(1.5));

        assert!(stream.next_observation().unwrap().is_some());
        assert!(stream.next_observation().unwrap().is_none());
        assert_eq!(stream.state(), StreamState::Exhausted);
        assert!(stream.next_observation().unwrap().is_none());
        assert_eq!(stream.rows_read(), 2);
    }

    #[test]
    fn test_duplicate_timestamp_is_input_error() {
        let mut stream = bar_stream(&[
            ("2024-01-01", bar("1.5")),
            ("2024-01-01", bar("1.6")),
            ("2024-01-02", bar("1.7")),
        ]);

        assert!(stream.next_observation().unwrap().is_some());
        let err = stream.next_observation().unwrap_err();
        assert!(matches!(err, StreamError::NonMonotonic { line: 2, .. }));
        assert_eq!(stream.state(), StreamState::Failed);

        // Never resurrected, even though a valid row follows.
        assert!(stream.next_observation().unwrap().is_none());
        assert_eq!(stream.last_timestamp(), Timestamp::parse("2024-01-01").ok());
    }

    #[test]
    fn test_backwards_timestamp_is_input_error() {
        let mut stream = bar_stream(&[("2024-01-02", bar("1.5")), ("2024-01-01", bar("1.6"))]);
        stream.next_observation().unwrap();
        assert!(matches!(
            stream.next_observation(),
            Err(StreamError::NonMonotonic { .. })
        ));
    }

    #[test]
    fn test_malformed_row_is_input_error() {
        let mut stream = bar_stream(&[("2024-01-01", vec!["1", "2"])]);
        let err = stream.next_observation().unwrap_err();
        assert!(matches!(err, StreamError::Observation { line: 1, .. }));
        assert_eq!(err.instrument().as_str(), "GOOG");
        assert!(stream.is_exhausted());
    }

    #[test]
    fn test_bad_timestamp_is_input_error() {
        let mut stream = bar_stream(&[("yesterday", bar("1.5"))]);
        assert!(matches!(
            stream.next_observation(),
            Err(StreamError::Timestamp { .. })
        ));
    }
}
