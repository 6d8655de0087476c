//! Fixed-scale decimal normalization for price and volume fields.
//!
//! Every numeric field is parsed once, when a stream adapter ingests a raw
//! row, and rounded to [`PRICE_SCALE`] fractional digits with round-half-down
//! tie breaking. Values always carry exactly that many digits afterwards, so
//! two runs over the same input produce byte-identical fills and statistics.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Fractional digits kept for every price and volume field.
pub const PRICE_SCALE: u32 = 5;

/// Round-half-down: ties resolve toward zero.
const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointTowardZero;

/// Failed to read a raw numeric field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalError {
    /// The field was empty or whitespace.
    #[error("empty numeric field")]
    Empty,

    /// The field is not a finite decimal number.
    #[error("invalid numeric field '{0}'")]
    Invalid(String),
}

/// Round a decimal to the canonical price scale.
///
/// Idempotent: normalizing an already canonical value returns it unchanged.
#[must_use]
pub fn normalize(value: Decimal) -> Decimal {
    if is_canonical(value) {
        return value;
    }
    let mut rounded = value.round_dp_with_strategy(PRICE_SCALE, ROUNDING);
    // round_dp never widens the scale; pad so the textual form is fixed
    rounded.rescale(PRICE_SCALE);
    rounded
}

/// Parse a raw textual field into a canonical decimal.
///
/// Accepts plain (`101.25`) and scientific (`1.0125e2`) notation.
pub fn parse_decimal(raw: &str) -> Result<Decimal, DecimalError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecimalError::Empty);
    }

    let value = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| DecimalError::Invalid(trimmed.to_string()))?;

    Ok(normalize(value))
}

/// Check whether a value is already in canonical form.
///
/// Exactly [`PRICE_SCALE`] fractional digits leaves nothing to round.
#[must_use]
pub const fn is_canonical(value: Decimal) -> bool {
    value.scale() == PRICE_SCALE
}
