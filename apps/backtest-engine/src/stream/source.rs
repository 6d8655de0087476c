//! Data sources that open per-instrument readers.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::SourceError;
use super::reader::{CsvLayout, CsvRowReader, InMemoryReader, RawRow, RowReader};
use crate::domain::{InstrumentId, PriceKind};

/// Opens a positioned reader for one instrument.
pub trait DataSource: Send + Sync {
    /// Open the rows for `instrument`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] when the source has no data for the
    /// instrument, or another error when the data exists but cannot be opened.
    fn open(
        &self,
        instrument: &InstrumentId,
        kind: PriceKind,
    ) -> Result<Box<dyn RowReader>, SourceError>;

    /// Get the name of this data source.
    fn name(&self) -> &'static str;
}

/// In-memory data source for testing.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDataSource {
    data: HashMap<InstrumentId, Vec<RawRow>>,
}

impl InMemoryDataSource {
    /// Create a new empty in-memory data source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Add rows for an instrument, replacing any previous rows.
    pub fn add_rows(&mut self, instrument: impl Into<InstrumentId>, rows: Vec<RawRow>) {
        self.data.insert(instrument.into(), rows);
    }

    /// Add `(timestamp, fields)` records for an instrument.
    pub fn add_records<S: AsRef<str>>(
        &mut self,
        instrument: impl Into<InstrumentId>,
        records: &[(S, Vec<S>)],
    ) {
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
        self.add_rows(instrument, rows);
    }
}

impl DataSource for InMemoryDataSource {
    fn open(
        &self,
        instrument: &InstrumentId,
        _kind: PriceKind,
    ) -> Result<Box<dyn RowReader>, SourceError> {
        let rows = self
            .data
            .get(instrument)
            .ok_or_else(|| SourceError::NotFound(instrument.clone()))?;
        Ok(Box::new(InMemoryReader::new(rows.clone())))
    }

    fn name(&self) -> &'static str {
        "InMemory"
    }
}

/// Calendar month of a `<TICKER>-YYYY-MM.csv` tick file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMonth {
    /// Four-digit year.
    pub year: u16,
    /// Month of the year, 1 to 12.
    pub month: u8,
}

impl DataMonth {
    /// Whether `month` names a real calendar month.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.month >= 1 && self.month <= 12
    }
}

/// Directory of `<TICKER>.csv` files, or of `<TICKER>-YYYY-MM.csv` files
/// once a month is selected.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
    tick_layout: CsvLayout,
    bar_layout: CsvLayout,
    month: Option<DataMonth>,
}

impl CsvDirectorySource {
    /// Source over `dir` using the stock tick and Yahoo bar layouts.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tick_layout: CsvLayout::tick(),
            bar_layout: CsvLayout::yahoo_daily_bar(),
            month: None,
        }
    }

    /// Read one month's files per instrument (`<TICKER>-YYYY-MM.csv`).
    #[must_use]
    pub fn with_month(mut self, month: DataMonth) -> Self {
        self.month = Some(month);
        self
    }

    /// Override the layout used for tick files.
    #[must_use]
    pub fn with_tick_layout(mut self, layout: CsvLayout) -> Self {
        self.tick_layout = layout;
        self
    }

    /// Override the layout used for bar files.
    #[must_use]
    pub fn with_bar_layout(mut self, layout: CsvLayout) -> Self {
        self.bar_layout = layout;
        self
    }

    /// Directory being read.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `instrument`'s rows.
    #[must_use]
    pub fn path_for(&self, instrument: &InstrumentId) -> PathBuf {
        match self.month {
            Some(DataMonth { year, month }) => {
                self.dir.join(format!("{instrument}-{year:04}-{month:02}.csv"))
            }
            None => self.dir.join(format!("{instrument}.csv")),
        }
    }
}

impl DataSource for CsvDirectorySource {
    fn open(
        &self,
        instrument: &InstrumentId,
        kind: PriceKind,
    ) -> Result<Box<dyn RowReader>, SourceError> {
        let path = self.path_for(instrument);
        let file = File::open(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(instrument.clone())
            } else {
                SourceError::Io {
                    instrument: instrument.clone(),
                    source,
                }
            }
        })?;

        let layout = match kind {
            PriceKind::Tick => self.tick_layout.clone(),
            PriceKind::Bar => self.bar_layout.clone(),
        };
        Ok(Box::new(CsvRowReader::new(BufReader::new(file), layout)))
    }

    fn name(&self) -> &'static str {
        "CsvDirectory"
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_in_memory_data_source() {
        let mut source = InMemoryDataSource::new();
        source.add_records("AAPL", &[("2024-01-01", vec!["1", "2"])]);

        let mut reader = source
            .open(&InstrumentId::new("AAPL"), PriceKind::Tick)
            .unwrap();
        assert!(reader.next_row().unwrap().is_some());
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_in_memory_data_source_no_data() {
        let source = InMemoryDataSource::new();
        let result = source.open(&InstrumentId::new("AAPL"), PriceKind::Tick);
        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[test]
    fn test_csv_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("GOOG.csv")).unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Volume,Adj Close").unwrap();
        writeln!(file, "2016-01-04,743.00,744.06,731.26,741.84,3272800,741.84").unwrap();
        drop(file);

        let source = CsvDirectorySource::new(dir.path());
        let mut reader = source
            .open(&InstrumentId::new("GOOG"), PriceKind::Bar)
            .unwrap();
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.timestamp, "2016-01-04");

        let missing = source.open(&InstrumentId::new("IBM"), PriceKind::Bar);
        assert!(matches!(missing, Err(SourceError::NotFound(id)) if id.as_str() == "IBM"));
    }

    #[test]
    fn test_monthly_tick_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("EURUSD-2016-01.csv")).unwrap();
        writeln!(file, "EURUSD,20160104 00:00:00.100,1.08710,1.08720").unwrap();
        drop(file);

        let january = DataMonth { year: 2016, month: 1 };
        let source = CsvDirectorySource::new(dir.path())
            .with_tick_layout(CsvLayout::compact_tick())
            .with_month(january);
        assert_eq!(
            source.path_for(&InstrumentId::new("EURUSD")),
            dir.path().join("EURUSD-2016-01.csv")
        );

        let mut reader = source
            .open(&InstrumentId::new("EURUSD"), PriceKind::Tick)
            .unwrap();
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.timestamp, "20160104 00:00:00.100");
        assert!(reader.next_row().unwrap().is_none());

        let february = source.with_month(DataMonth { year: 2016, month: 2 });
        let missing = february.open(&InstrumentId::new("EURUSD"), PriceKind::Tick);
        assert!(matches!(missing, Err(SourceError::NotFound(_))));
    }

    #[test]
    fn test_data_month_range() {
        assert!(DataMonth { year: 2016, month: 12 }.is_valid());
        assert!(!DataMonth { year: 2016, month: 0 }.is_valid());
        assert!(!DataMonth { year: 2016, month: 13 }.is_valid());
    }
}
