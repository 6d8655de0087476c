//! Events flowing through a simulation session.
//!
//! A [`PriceEvent`] is produced by the merge scheduler and bundles every
//! instrument whose next observation shares the earliest pending timestamp.
//! [`DerivedEvent`]s are produced by collaborators while reacting to a price
//! event and are drained within the same dispatch cycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::identifiers::{InstrumentId, Venue};
use super::observation::{DAILY_BAR_PERIOD_SECS, PriceKind, PriceObservation};
use super::timestamp::Timestamp;

/// Compound price event: all instruments observed at one timestamp.
///
/// Deserialization goes through the same non-empty check as [`PriceEvent::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PriceEventParts")]
pub struct PriceEvent {
    timestamp: Timestamp,
    kind: PriceKind,
    observations: Vec<(InstrumentId, PriceObservation)>,
}

/// A serialized compound event with no observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("compound price event at {0} has no observations")]
pub struct EmptyPriceEvent(pub Timestamp);

#[derive(Deserialize)]
struct PriceEventParts {
    timestamp: Timestamp,
    kind: PriceKind,
    observations: Vec<(InstrumentId, PriceObservation)>,
}

impl TryFrom<PriceEventParts> for PriceEvent {
    type Error = EmptyPriceEvent;

    fn try_from(parts: PriceEventParts) -> Result<Self, Self::Error> {
        Self::new(parts.timestamp, parts.kind, parts.observations)
            .ok_or(EmptyPriceEvent(parts.timestamp))
    }
}

impl PriceEvent {
    /// Create a compound event.
    ///
    /// Returns `None` when `observations` is empty; a compound event always
    /// carries at least one instrument.
    #[must_use]
    pub fn new(
        timestamp: Timestamp,
        kind: PriceKind,
        observations: Vec<(InstrumentId, PriceObservation)>,
    ) -> Option<Self> {
        if observations.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            kind,
            observations,
        })
    }

    /// Shared timestamp of every observation in the event.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Tick or bar.
    #[must_use]
    pub const fn kind(&self) -> PriceKind {
        self.kind
    }

    /// Bar period in seconds (daily bars only; `None` for ticks).
    #[must_use]
    pub const fn period_secs(&self) -> Option<u32> {
        match self.kind {
            PriceKind::Bar => Some(DAILY_BAR_PERIOD_SECS),
            PriceKind::Tick => None,
        }
    }

    /// Whether the event carries an observation for `instrument`.
    #[must_use]
    pub fn contains(&self, instrument: &str) -> bool {
        self.get(instrument).is_some()
    }

    /// Observation for `instrument`, if present.
    #[must_use]
    pub fn get(&self, instrument: &str) -> Option<&PriceObservation> {
        self.observations
            .iter()
            .find(|(id, _)| id.as_str() == instrument)
            .map(|(_, obs)| obs)
    }

    /// Instruments in insertion order.
    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.observations.iter().map(|(id, _)| id)
    }

    /// `(instrument, observation)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, &PriceObservation)> {
        self.observations.iter().map(|(id, obs)| (id, obs))
    }

    /// Number of instruments in the event.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl fmt::Display for PriceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [", self.timestamp, self.kind)?;
        for (i, id) in self.instruments().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "]")
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Bought (long).
    Buy,
    /// Sold (short).
    Sell,
}

impl Action {
    /// Blotter mnemonic: `BOT` or `SLD`.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Buy => "BOT",
            Self::Sell => "SLD",
        }
    }

    /// +1 for buys, -1 for sells.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A strategy's intent to trade an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Instrument to trade.
    pub instrument: InstrumentId,
    /// Direction.
    pub action: Action,
}

/// A sized order for the execution handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Instrument to trade.
    pub instrument: InstrumentId,
    /// Direction.
    pub action: Action,
    /// Units to transact.
    pub quantity: u64,
}

/// An executed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Market time of the fill.
    pub timestamp: Timestamp,
    /// Instrument traded.
    pub instrument: InstrumentId,
    /// Direction.
    pub action: Action,
    /// Units filled.
    pub quantity: u64,
    /// Venue the fill is attributed to.
    pub venue: Venue,
    /// Fill price per unit.
    pub price: Decimal,
    /// Commission charged for the whole fill.
    pub commission: Decimal,
}

impl Fill {
    /// Gross notional of the fill (price × quantity), before commission.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Event generated while reacting to a price event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DerivedEvent {
    /// Strategy signal.
    Signal(Signal),
    /// Sized order.
    Order(Order),
    /// Execution report.
    Fill(Fill),
}

impl From<Signal> for DerivedEvent {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}

impl From<Order> for DerivedEvent {
    fn from(order: Order) -> Self {
        Self::Order(order)
    }
}

impl From<Fill> for DerivedEvent {
    fn from(fill: Fill) -> Self {
        Self::Fill(fill)
    }
}

impl fmt::Display for DerivedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(s) => write!(f, "Signal {} {}", s.instrument, s.action),
            Self::Order(o) => write!(f, "Order {} {} x{}", o.instrument, o.action, o.quantity),
            Self::Fill(fill) => write!(
                f,
                "Fill @ {} {} {} x{} {} price={} commission={}",
                fill.timestamp,
                fill.instrument,
                fill.action,
                fill.quantity,
                fill.venue,
                fill.price,
                fill.commission
            ),
        }
    }
}
