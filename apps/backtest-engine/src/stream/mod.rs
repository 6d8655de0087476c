//! Per-instrument price streams.
//!
//! - [`RowReader`]: positioned source of raw rows (CSV or in-memory)
//! - [`DataSource`]: opens a reader for an instrument
//! - [`InstrumentStream`]: validates, parses and normalizes rows into
//!   time-ordered observations

mod adapter;
mod error;
mod reader;
mod source;

pub use adapter::{InstrumentStream, StreamState};
pub use error::{ReaderError, SourceError, StreamError};
pub use reader::{CsvLayout, CsvRowReader, InMemoryReader, RawRow, RowReader};
pub use source::{CsvDirectorySource, DataMonth, DataSource, InMemoryDataSource};
