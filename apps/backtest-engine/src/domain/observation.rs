//! Price observation shapes: top-of-book ticks and OHLCV bars.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::decimal::{DecimalError, parse_decimal};

/// Seconds in one daily bar period.
pub const DAILY_BAR_PERIOD_SECS: u32 = 86_400;

/// Which observation shape a stream produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceKind {
    /// Best bid / best ask updates.
    Tick,
    /// Open-high-low-close-volume aggregates.
    Bar,
}

impl PriceKind {
    /// Number of price fields a raw row of this kind carries after the timestamp.
    #[must_use]
    pub const fn field_count(self) -> usize {
        match self {
            Self::Tick => 2,
            Self::Bar => 6,
        }
    }
}

impl std::fmt::Display for PriceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tick => write!(f, "tick"),
            Self::Bar => write!(f, "bar"),
        }
    }
}

/// Top-of-book quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
}

/// OHLCV bar with adjusted close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing (unadjusted) price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
    /// Split/dividend adjusted close.
    pub adj_close: Decimal,
}

/// One instrument's priced observation at one timestamp.
///
/// Every field is canonical (see [`super::decimal::normalize`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceObservation {
    /// Quote update.
    Tick(Tick),
    /// Aggregated bar.
    Bar(Bar),
}

impl PriceObservation {
    /// Build an observation of the given kind from raw textual fields.
    ///
    /// Tick fields are `bid, ask`; bar fields are
    /// `open, high, low, close, volume, adj_close`.
    pub fn from_fields<S: AsRef<str>>(
        kind: PriceKind,
        fields: &[S],
    ) -> Result<Self, ObservationError> {
        if fields.len() != kind.field_count() {
            return Err(ObservationError::FieldCount {
                kind,
                expected: kind.field_count(),
                actual: fields.len(),
            });
        }

        let mut values = Vec::with_capacity(fields.len());
        for (index, raw) in fields.iter().enumerate() {
            let value = parse_decimal(raw.as_ref())
                .map_err(|source| ObservationError::Field { index, source })?;
            values.push(value);
        }

        Ok(match kind {
            PriceKind::Tick => Self::Tick(Tick {
                bid: values[0],
                ask: values[1],
            }),
            PriceKind::Bar => Self::Bar(Bar {
                open: values[0],
                high: values[1],
                low: values[2],
                close: values[3],
                volume: values[4],
                adj_close: values[5],
            }),
        })
    }

    /// Shape of this observation.
    #[must_use]
    pub const fn kind(&self) -> PriceKind {
        match self {
            Self::Tick(_) => PriceKind::Tick,
            Self::Bar(_) => PriceKind::Bar,
        }
    }

    /// Quote, if this is a tick.
    #[must_use]
    pub const fn as_tick(&self) -> Option<&Tick> {
        match self {
            Self::Tick(tick) => Some(tick),
            Self::Bar(_) => None,
        }
    }

    /// Bar, if this is a bar.
    #[must_use]
    pub const fn as_bar(&self) -> Option<&Bar> {
        match self {
            Self::Bar(bar) => Some(bar),
            Self::Tick(_) => None,
        }
    }

    /// Reference price used for marking positions: mid for ticks, close for bars.
    #[must_use]
    pub fn mark_price(&self) -> Decimal {
        match self {
            Self::Tick(tick) => super::decimal::normalize((tick.bid + tick.ask) / Decimal::TWO),
            Self::Bar(bar) => bar.close,
        }
    }
}

/// A raw row could not be turned into an observation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
    /// Wrong number of price fields for the stream kind.
    #[error("{kind} row needs {expected} price fields, got {actual}")]
    FieldCount {
        /// Stream kind.
        kind: PriceKind,
        /// Required field count.
        expected: usize,
        /// Field count found.
        actual: usize,
    },

    /// A single field failed to parse.
    #[error("price field {index}: {source}")]
    Field {
        /// Zero-based index among the price fields.
        index: usize,
        /// Underlying parse failure.
        source: DecimalError,
    },
}
