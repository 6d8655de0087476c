//! Domain types: identifiers, market time, canonical decimals, price
//! observations and the events a session dispatches.

pub mod decimal;
mod event;
mod identifiers;
mod observation;
mod timestamp;

pub use decimal::{DecimalError, PRICE_SCALE, normalize, parse_decimal};
pub use event::{Action, DerivedEvent, EmptyPriceEvent, Fill, Order, PriceEvent, Signal};
pub use identifiers::{InstrumentId, Venue};
pub use observation::{
    Bar, DAILY_BAR_PERIOD_SECS, ObservationError, PriceKind, PriceObservation, Tick,
};
pub use timestamp::{Timestamp, TimestampError};
