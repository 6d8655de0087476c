//! Time-ordered merge of instrument streams.
//!
//! [`MergeScheduler`] owns one [`InstrumentStream`](crate::stream::InstrumentStream)
//! per subscribed instrument and emits compound [`PriceEvent`](crate::domain::PriceEvent)s
//! in non-decreasing timestamp order.

mod error;
mod merge;

pub use error::{DataFailure, FailureKind, SubscriptionError};
pub use merge::MergeScheduler;
