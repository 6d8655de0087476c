//! Position sizing and risk refinement policies.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::{InstrumentId, Order};

/// Read-only snapshot of a portfolio handed to sizing and risk policies.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioView<'a> {
    /// Cash balance.
    pub cash: Decimal,
    /// Cash plus marked-to-market positions.
    pub equity: Decimal,
    positions: &'a BTreeMap<InstrumentId, i64>,
}

impl<'a> PortfolioView<'a> {
    /// Snapshot over a net-position map.
    #[must_use]
    pub const fn new(cash: Decimal, equity: Decimal, positions: &'a BTreeMap<InstrumentId, i64>) -> Self {
        Self {
            cash,
            equity,
            positions,
        }
    }

    /// Signed net quantity held (zero if flat or unknown).
    #[must_use]
    pub fn position(&self, instrument: &str) -> i64 {
        self.positions.get(instrument).copied().unwrap_or_default()
    }

    /// Instruments with a non-zero position.
    pub fn open_instruments(&self) -> impl Iterator<Item = &'a InstrumentId> {
        self.positions
            .iter()
            .filter(|(_, quantity)| **quantity != 0)
            .map(|(id, _)| id)
    }
}

/// Turns an unsized order into a sized one.
pub trait PositionSizer: Send {
    /// Size `initial` (whose quantity is zero when coming from a signal).
    fn size_order(&self, portfolio: &PortfolioView<'_>, initial: Order) -> Order;
}

/// Adjusts or splits a sized order, possibly dropping it.
pub trait RiskManager: Send {
    /// Orders to send to execution for `sized`; empty to veto.
    fn refine_orders(&self, portfolio: &PortfolioView<'_>, sized: Order) -> Vec<Order>;
}

/// Gives every order the same quantity.
#[derive(Debug, Clone, Copy)]
pub struct FixedQuantitySizer {
    quantity: u64,
}

impl FixedQuantitySizer {
    /// Default order size.
    pub const DEFAULT_QUANTITY: u64 = 100;

    /// Size every order to `quantity`.
    #[must_use]
    pub const fn new(quantity: u64) -> Self {
        Self { quantity }
    }

    /// Configured size.
    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }
}

impl Default for FixedQuantitySizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUANTITY)
    }
}

impl PositionSizer for FixedQuantitySizer {
    fn size_order(&self, _portfolio: &PortfolioView<'_>, initial: Order) -> Order {
        Order {
            quantity: self.quantity,
            ..initial
        }
    }
}

/// Forwards every sized order untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughRiskManager;

impl RiskManager for PassThroughRiskManager {
    fn refine_orders(&self, _portfolio: &PortfolioView<'_>, sized: Order) -> Vec<Order> {
        vec![sized]
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::Action;

    #[test]
    fn test_fixed_sizer_then_pass_through() {
        let mut positions = BTreeMap::new();
        positions.insert(InstrumentId::new("GOOG"), 100);
        positions.insert(InstrumentId::new("IBM"), 0);
        let view = PortfolioView::new(dec!(1000), dec!(2000), &positions);

        let initial = Order {
            instrument: InstrumentId::new("GOOG"),
            action: Action::Sell,
            quantity: 0,
        };
        let sized = FixedQuantitySizer::new(25).size_order(&view, initial);
        assert_eq!(sized.quantity, 25);
        assert_eq!(sized.action, Action::Sell);

        let refined = PassThroughRiskManager.refine_orders(&view, sized.clone());
        assert_eq!(refined, vec![sized]);

        assert_eq!(view.position("GOOG"), 100);
        assert_eq!(view.position("MSFT"), 0);
        assert_eq!(view.open_instruments().count(), 1);
    }
}
