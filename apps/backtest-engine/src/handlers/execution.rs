//! Execution handler: turns orders into fills.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::context::HandlerContext;
use super::error::HandlerError;
use crate::domain::{Fill, Order, Venue};

/// Sends orders to a (real or simulated) venue.
pub trait ExecutionHandler: Send {
    /// Execute `order`, emitting fills through the context.
    fn on_order(&mut self, order: &Order, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError>;
}

/// Fills every order immediately at the last known price.
///
/// No latency, slippage or partial fills. Buys fill at the ask and sells at
/// the bid on ticks; both fill at the close on bars. The fill is stamped
/// with the instrument's last observation time.
#[derive(Debug, Clone)]
pub struct SimulatedExecution {
    venue: Venue,
    commission: Decimal,
    fills: u64,
}

impl SimulatedExecution {
    /// Default venue attributed to fills.
    pub const DEFAULT_VENUE: &'static str = "ARCA";
    /// Default flat commission per fill.
    pub const DEFAULT_COMMISSION: Decimal = dec!(1.00);

    /// Attribute fills to `venue` and charge a flat `commission` each.
    #[must_use]
    pub const fn new(venue: Venue, commission: Decimal) -> Self {
        Self {
            venue,
            commission,
            fills: 0,
        }
    }

    /// Fills produced so far.
    #[must_use]
    pub const fn fills(&self) -> u64 {
        self.fills
    }
}

impl Default for SimulatedExecution {
    fn default() -> Self {
        Self::new(Venue::new(Self::DEFAULT_VENUE), Self::DEFAULT_COMMISSION)
    }
}

impl ExecutionHandler for SimulatedExecution {
    fn on_order(&mut self, order: &Order, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        if order.quantity == 0 {
            return Err(HandlerError::ZeroQuantity(order.instrument.clone()));
        }

        let market = ctx.market();
        let instrument = order.instrument.as_str();
        let price = market
            .last_price(instrument, order.action)
            .ok_or_else(|| HandlerError::NoPrice(order.instrument.clone()))?;
        let timestamp = market
            .last_timestamp(instrument)
            .ok_or_else(|| HandlerError::NoPrice(order.instrument.clone()))?;

        let fill = Fill {
            timestamp,
            instrument: order.instrument.clone(),
            action: order.action,
            quantity: order.quantity,
            venue: self.venue.clone(),
            price,
            commission: self.commission,
        };
        debug!(
            instrument = %fill.instrument,
            action = %fill.action,
            quantity = fill.quantity,
            price = %fill.price,
            venue = %fill.venue,
            "Simulated fill"
        );

        self.fills += 1;
        ctx.emit(fill);
        Ok(())
    }
}
