//! Decimal statistics used by the equity statistics collector.

use rust_decimal::Decimal;

const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 10); // 0.0000000001

/// Trading days per year used to annualize per-period ratios.
pub const TRADING_DAYS: Decimal = Decimal::from_parts(252, 0, 0, false, 0);

/// Arithmetic mean; `None` when empty.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().sum();
    Some(sum / Decimal::from(values.len()))
}

/// Sample standard deviation; `None` with fewer than two values.
pub fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }

    let avg = mean(values)?;
    let variance_sum: Decimal = values.iter().map(|v| (*v - avg) * (*v - avg)).sum();
    let variance = variance_sum / Decimal::from(values.len() - 1);

    sqrt_decimal(variance)
}

/// Square root by Newton's method; `None` for negative input.
pub fn sqrt_decimal(value: Decimal) -> Option<Decimal> {
    if value < Decimal::ZERO {
        return None;
    }
    if value == Decimal::ZERO {
        return Some(Decimal::ZERO);
    }

    let mut guess = if value > Decimal::ONE { value / Decimal::TWO } else { Decimal::ONE };

    for _ in 0..100 {
        let next = (guess + value / guess) / Decimal::TWO;
        if (next - guess).abs() < TOLERANCE {
            return Some(next);
        }
        guess = next;
    }

    Some(guess)
}

/// Simple returns between consecutive values, skipping zero bases.
pub fn period_returns(values: &[Decimal]) -> Vec<Decimal> {
    values
        .windows(2)
        .filter(|w| !w[0].is_zero())
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Per-period Sharpe ratio annualized by √252 (zero risk-free rate).
///
/// `None` with fewer than two returns or zero dispersion.
pub fn annualized_sharpe(returns: &[Decimal]) -> Option<Decimal> {
    let avg = mean(returns)?;
    let std = std_dev(returns)?;
    if std.is_zero() {
        return None;
    }
    Some(avg / std * sqrt_decimal(TRADING_DAYS)?)
}

/// Largest peak-to-trough decline, absolute and as a percentage of the peak.
pub fn max_drawdown(start: Decimal, values: &[Decimal]) -> (Decimal, Decimal) {
    let mut peak = start;
    let mut max_abs = Decimal::ZERO;
    let mut max_pct = Decimal::ZERO;

    for value in values {
        if *value > peak {
            peak = *value;
        }
        let drawdown = peak - *value;
        if drawdown > max_abs {
            max_abs = drawdown;
        }
        if peak > Decimal::ZERO {
            let pct = drawdown / peak * Decimal::ONE_HUNDRED;
            if pct > max_pct {
                max_pct = pct;
            }
        }
    }

    (max_abs, max_pct)
}
