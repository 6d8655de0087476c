//! Positioned readers producing raw price rows.
//!
//! A reader yields rows in file order and reports end-of-data (`Ok(None)`)
//! distinctly from a malformed row (`Err`). It never interprets values;
//! parsing and normalization belong to the stream adapter.

use std::collections::VecDeque;
use std::io::Read;

use serde::{Deserialize, Serialize};

use super::error::ReaderError;

/// One undecoded row: a timestamp field plus price fields in fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Line number in the underlying source, 1-based.
    pub line: u64,
    /// Raw timestamp text.
    pub timestamp: String,
    /// Raw price/volume fields.
    pub fields: Vec<String>,
}

impl RawRow {
    /// Create a raw row.
    #[must_use]
    pub fn new<S: Into<String>>(line: u64, timestamp: S, fields: Vec<String>) -> Self {
        Self {
            line,
            timestamp: timestamp.into(),
            fields,
        }
    }
}

/// Source of raw rows for a single instrument.
pub trait RowReader: Send {
    /// Read the next row, `Ok(None)` at end of data.
    fn next_row(&mut self) -> Result<Option<RawRow>, ReaderError>;
}

/// Rows held in memory (for testing and programmatic feeds).
#[derive(Debug, Default, Clone)]
pub struct InMemoryReader {
    rows: VecDeque<RawRow>,
}

impl InMemoryReader {
    /// Create a reader over prepared rows.
    #[must_use]
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self { rows: rows.into() }
    }

    /// Build rows from `(timestamp, fields)` pairs, numbering lines from 1.
    #[must_use]
    pub fn from_records<S: AsRef<str>>(records: &[(S, Vec<S>)]) -> Self {
        let rows = records
            .iter()
            .zip(1u64..)
            .map(|((ts, fields), line)| {
                RawRow::new(
                    line,
                    ts.as_ref(),
                    fields.iter().map(|f| f.as_ref().to_string()).collect(),
                )
            })
            .collect();
        Self::new(rows)
    }

    /// Rows not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowReader for InMemoryReader {
    fn next_row(&mut self) -> Result<Option<RawRow>, ReaderError> {
        Ok(self.rows.pop_front())
    }
}

/// Column positions of a CSV price file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvLayout {
    /// Whether the first record is a header.
    pub has_headers: bool,
    /// Zero-based index of the timestamp column.
    pub timestamp_column: usize,
    /// Zero-based indices of the price columns, in observation field order.
    pub price_columns: Vec<usize>,
}

impl CsvLayout {
    /// Historic tick files: `Ticker,Time,Bid,Ask` with a header row.
    #[must_use]
    pub fn tick() -> Self {
        Self {
            has_headers: true,
            timestamp_column: 1,
            price_columns: vec![2, 3],
        }
    }

    /// Headerless monthly tick files: `ticker,yyyymmdd HH:MM:SS.sss,bid,ask`.
    #[must_use]
    pub fn compact_tick() -> Self {
        Self {
            has_headers: false,
            ..Self::tick()
        }
    }

    /// Yahoo daily bars: `Date,Open,High,Low,Close,Volume,Adj Close`.
    #[must_use]
    pub fn yahoo_daily_bar() -> Self {
        Self {
            has_headers: true,
            timestamp_column: 0,
            price_columns: vec![1, 2, 3, 4, 5, 6],
        }
    }
}

/// Reads rows from CSV data according to a [`CsvLayout`].
pub struct CsvRowReader<R> {
    reader: csv::Reader<R>,
    layout: CsvLayout,
    record: csv::StringRecord,
    rows_read: u64,
}

impl<R: Read> CsvRowReader<R> {
    /// Wrap a byte source.
    pub fn new(source: R, layout: CsvLayout) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(layout.has_headers)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);
        Self {
            reader,
            layout,
            record: csv::StringRecord::new(),
            rows_read: 0,
        }
    }

    fn column(&self, line: u64, column: usize) -> Result<String, ReaderError> {
        self.record
            .get(column)
            .map(str::to_string)
            .ok_or(ReaderError::MissingColumn { line, column })
    }
}

impl<R> std::fmt::Debug for CsvRowReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRowReader")
            .field("layout", &self.layout)
            .field("rows_read", &self.rows_read)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Send> RowReader for CsvRowReader<R> {
    fn next_row(&mut self) -> Result<Option<RawRow>, ReaderError> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        self.rows_read += 1;

        let line = self
            .record
            .position()
            .map_or(self.rows_read, csv::Position::line);

        let timestamp = self.column(line, self.layout.timestamp_column)?;
        let fields = self
            .layout
            .price_columns
            .iter()
            .map(|&column| self.column(line, column))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RawRow::new(line, timestamp, fields)))
    }
}
