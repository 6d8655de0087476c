//! Market data configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::PriceKind;
use crate::stream::{CsvDirectorySource, CsvLayout, DataMonth};

/// Tick file layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TickLayout {
    /// `Ticker,Time,Bid,Ask` with a header row.
    #[default]
    Headered,
    /// Same columns without a header row.
    Compact,
}

/// Where price files live and which instruments to load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataConfig {
    /// Directory of `<TICKER>.csv` files.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Observation shape of every file.
    #[serde(default = "default_kind")]
    pub kind: PriceKind,
    /// Instruments to subscribe, in order.
    #[serde(default)]
    pub instruments: Vec<String>,
    /// Tick file layout (ignored for bars).
    #[serde(default)]
    pub tick_layout: TickLayout,
    /// Read `<TICKER>-YYYY-MM.csv` files for this month instead of `<TICKER>.csv`.
    #[serde(default)]
    pub month: Option<DataMonth>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            kind: default_kind(),
            instruments: Vec::new(),
            tick_layout: TickLayout::default(),
            month: None,
        }
    }
}

impl DataConfig {
    /// CSV source for this configuration.
    #[must_use]
    pub fn csv_source(&self) -> CsvDirectorySource {
        let mut source = CsvDirectorySource::new(&self.dir);
        if let Some(month) = self.month {
            source = source.with_month(month);
        }
        match self.tick_layout {
            TickLayout::Headered => source,
            TickLayout::Compact => source.with_tick_layout(CsvLayout::compact_tick()),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_kind() -> PriceKind {
    PriceKind::Bar
}
