//! Portfolio handler: cash, positions, and turning signals into orders.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::context::HandlerContext;
use super::error::HandlerError;
use super::sizing::{PortfolioView, PositionSizer, RiskManager};
use crate::domain::{Fill, InstrumentId, Order, PriceEvent, Signal};

/// Holds capital and positions; reacts to prices, signals and fills.
pub trait PortfolioHandler: Send {
    /// Mark positions to the new prices.
    fn on_price(&mut self, event: &PriceEvent, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError>;

    /// Turn a signal into zero or more orders.
    fn on_signal(&mut self, signal: &Signal, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError>;

    /// Book a fill.
    fn on_fill(&mut self, fill: &Fill, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError>;

    /// Cash plus marked-to-market positions.
    fn equity(&self) -> Decimal;

    /// Cash balance.
    fn cash(&self) -> Decimal;
}

/// A net position in one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Signed quantity (negative is short).
    pub quantity: i64,
    /// Average entry price of the open quantity.
    pub avg_price: Decimal,
    /// Last mark.
    pub market_price: Decimal,
}

impl Position {
    /// Quantity times last mark.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.market_price
    }

    /// Open profit at the last mark.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        Decimal::from(self.quantity) * (self.market_price - self.avg_price)
    }

    /// Apply a signed fill quantity at `price`, returning realized PnL.
    fn apply(&mut self, delta: i64, price: Decimal) -> Decimal {
        let mut realized = Decimal::ZERO;
        if delta == 0 {
            return realized;
        }

        if self.quantity == 0 || self.quantity.signum() == delta.signum() {
            let held = Decimal::from(self.quantity.unsigned_abs());
            let added = Decimal::from(delta.unsigned_abs());
            self.avg_price = (self.avg_price * held + price * added) / (held + added);
        } else {
            let closing = self.quantity.unsigned_abs().min(delta.unsigned_abs());
            realized = (price - self.avg_price)
                * Decimal::from(closing)
                * Decimal::from(self.quantity.signum());
        }

        let before = self.quantity;
        self.quantity += delta;

        if self.quantity == 0 {
            self.avg_price = Decimal::ZERO;
        } else if before != 0 && before.signum() != self.quantity.signum() {
            // Flipped through flat: the remainder opened at this price.
            self.avg_price = price;
        }
        self.market_price = price;
        realized
    }
}

/// Cash-and-positions portfolio with pluggable sizing and risk policies.
pub struct SimplePortfolio {
    initial_cash: Decimal,
    cash: Decimal,
    positions: BTreeMap<InstrumentId, Position>,
    realized_pnl: Decimal,
    commission_paid: Decimal,
    fills: u64,
    sizer: Box<dyn PositionSizer>,
    risk: Box<dyn RiskManager>,
}

impl std::fmt::Debug for SimplePortfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplePortfolio")
            .field("initial_cash", &self.initial_cash)
            .field("cash", &self.cash)
            .field("positions", &self.positions)
            .field("realized_pnl", &self.realized_pnl)
            .field("commission_paid", &self.commission_paid)
            .field("fills", &self.fills)
            .finish_non_exhaustive()
    }
}

impl SimplePortfolio {
    /// Start flat with `initial_cash`.
    pub fn new(
        initial_cash: Decimal,
        sizer: Box<dyn PositionSizer>,
        risk: Box<dyn RiskManager>,
    ) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            positions: BTreeMap::new(),
            realized_pnl: Decimal::ZERO,
            commission_paid: Decimal::ZERO,
            fills: 0,
            sizer,
            risk,
        }
    }

    /// Starting capital.
    #[must_use]
    pub const fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    /// Position in `instrument`, if one was ever opened.
    #[must_use]
    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Every position ever opened (including flat ones).
    #[must_use]
    pub const fn positions(&self) -> &BTreeMap<InstrumentId, Position> {
        &self.positions
    }

    /// Profit locked in by closing trades.
    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Commission charged so far.
    #[must_use]
    pub const fn commission_paid(&self) -> Decimal {
        self.commission_paid
    }

    /// Fills booked so far.
    #[must_use]
    pub const fn fills(&self) -> u64 {
        self.fills
    }

    fn net_positions(&self) -> BTreeMap<InstrumentId, i64> {
        self.positions
            .iter()
            .map(|(id, position)| (id.clone(), position.quantity))
            .collect()
    }
}

impl PortfolioHandler for SimplePortfolio {
    fn on_price(&mut self, event: &PriceEvent, _ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        for (instrument, observation) in event.iter() {
            if let Some(position) = self.positions.get_mut(instrument) {
                position.market_price = observation.mark_price();
            }
        }
        Ok(())
    }

    fn on_signal(&mut self, signal: &Signal, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        let net = self.net_positions();
        let view = PortfolioView::new(self.cash, self.equity(), &net);

        let initial = Order {
            instrument: signal.instrument.clone(),
            action: signal.action,
            quantity: 0,
        };
        let sized = self.sizer.size_order(&view, initial);

        for order in self.risk.refine_orders(&view, sized) {
            debug!(
                instrument = %order.instrument,
                action = %order.action,
                quantity = order.quantity,
                "Order from signal"
            );
            ctx.emit(order);
        }
        Ok(())
    }

    fn on_fill(&mut self, fill: &Fill, _ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        let quantity = i64::try_from(fill.quantity).map_err(|_| {
            HandlerError::rejected("portfolio", format!("fill quantity {} too large", fill.quantity))
        })?;
        let sign = fill.action.sign();
        let delta = quantity * sign;

        // Buying spends cash, selling raises it.
        self.cash -= fill.notional() * Decimal::from(sign);
        self.cash -= fill.commission;
        self.commission_paid += fill.commission;
        self.fills += 1;

        let position = self.positions.entry(fill.instrument.clone()).or_default();
        let realized = position.apply(delta, fill.price);
        self.realized_pnl += realized;

        info!(
            instrument = %fill.instrument,
            action = %fill.action,
            quantity = fill.quantity,
            price = %fill.price,
            commission = %fill.commission,
            position = position.quantity,
            cash = %self.cash,
            "Fill booked"
        );
        Ok(())
    }

    fn equity(&self) -> Decimal {
        self.cash
            + self
                .positions
                .values()
                .map(Position::market_value)
                .sum::<Decimal>()
    }

    fn cash(&self) -> Decimal {
        self.cash
    }
}
