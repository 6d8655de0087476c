//! Strategy callbacks and the ordered strategy chain.

use std::time::Instant;

use tracing::{debug, info};

use super::context::HandlerContext;
use super::error::HandlerError;
use crate::domain::{Fill, Order, PriceEvent, PriceKind, Signal};

/// A trading strategy.
///
/// Every callback defaults to doing nothing. Strategies emit signals through
/// the context; they never call other collaborators directly.
pub trait Strategy: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called once before the first price event.
    fn on_init(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A compound tick event.
    fn on_tick(
        &mut self,
        _event: &PriceEvent,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A compound bar event.
    fn on_bar(
        &mut self,
        _event: &PriceEvent,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A signal drained from the queue.
    fn on_signal(
        &mut self,
        _signal: &Signal,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// An order drained from the queue.
    fn on_order(
        &mut self,
        _order: &Order,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A fill drained from the queue.
    fn on_fill(&mut self, _fill: &Fill, _ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once after the last price event on graceful completion.
    fn on_deinit(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Ordered list of strategies; each callback reaches every member in order.
#[derive(Default)]
pub struct Strategies {
    members: Vec<Box<dyn Strategy>>,
}

impl std::fmt::Debug for Strategies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Strategies {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy at the end of the chain.
    pub fn push(&mut self, strategy: Box<dyn Strategy>) {
        self.members.push(strategy);
    }

    /// Number of strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Strategy names in chain order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|s| s.name())
    }

    /// Forward `on_init`.
    pub fn on_init(&mut self) -> Result<(), HandlerError> {
        self.members.iter_mut().try_for_each(|s| s.on_init())
    }

    /// Forward a price event to `on_tick` or `on_bar` by its kind.
    pub fn on_price(
        &mut self,
        event: &PriceEvent,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        match event.kind() {
            PriceKind::Tick => self.members.iter_mut().try_for_each(|s| s.on_tick(event, ctx)),
            PriceKind::Bar => self.members.iter_mut().try_for_each(|s| s.on_bar(event, ctx)),
        }
    }

    /// Forward `on_signal`.
    pub fn on_signal(
        &mut self,
        signal: &Signal,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        self.members.iter_mut().try_for_each(|s| s.on_signal(signal, ctx))
    }

    /// Forward `on_order`.
    pub fn on_order(
        &mut self,
        order: &Order,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        self.members.iter_mut().try_for_each(|s| s.on_order(order, ctx))
    }

    /// Forward `on_fill`.
    pub fn on_fill(&mut self, fill: &Fill, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerError> {
        self.members.iter_mut().try_for_each(|s| s.on_fill(fill, ctx))
    }

    /// Forward `on_deinit`.
    pub fn on_deinit(&mut self) -> Result<(), HandlerError> {
        self.members.iter_mut().try_for_each(|s| s.on_deinit())
    }
}

/// Logs throughput every `every` price events and the first `window`
/// events of each block. Emits nothing.
#[derive(Debug)]
pub struct DisplayStrategy {
    every: u64,
    window: u64,
    seen: u64,
    started: Option<Instant>,
}

impl DisplayStrategy {
    /// Default block size.
    pub const DEFAULT_EVERY: u64 = 10_000;
    /// Default number of events echoed per block.
    pub const DEFAULT_WINDOW: u64 = 5;

    /// Log every `every` events (minimum 1).
    #[must_use]
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            window: Self::DEFAULT_WINDOW,
            seen: 0,
            started: None,
        }
    }

    /// Echo the first `window` events of each block at debug level.
    #[must_use]
    pub const fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    /// Price events seen so far.
    #[must_use]
    pub const fn seen(&self) -> u64 {
        self.seen
    }

    fn on_price_event(&mut self, event: &PriceEvent) {
        let started = *self.started.get_or_insert_with(Instant::now);

        if self.seen % self.every == 0 && self.seen != 0 {
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                self.seen as f64 / elapsed
            } else {
                0.0
            };
            info!(
                events = self.seen,
                timestamp = %event.timestamp(),
                elapsed_secs = elapsed,
                events_per_sec = rate,
                "Replay progress"
            );
        }
        if self.seen % self.every < self.window {
            debug!(index = self.seen, event = %event, "Price event");
        }
        self.seen += 1;
    }
}

impl Default for DisplayStrategy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EVERY)
    }
}

impl Strategy for DisplayStrategy {
    fn name(&self) -> &str {
        "display"
    }

    fn on_init(&mut self) -> Result<(), HandlerError> {
        self.seen = 0;
        self.started = Some(Instant::now());
        Ok(())
    }

    fn on_tick(
        &mut self,
        event: &PriceEvent,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        self.on_price_event(event);
        Ok(())
    }

    fn on_bar(
        &mut self,
        event: &PriceEvent,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError> {
        self.on_price_event(event);
        Ok(())
    }

    fn on_deinit(&mut self) -> Result<(), HandlerError> {
        info!(events = self.seen, "Display strategy finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{InstrumentId, PriceObservation, Tick, Timestamp};
    use crate::scheduler::MergeScheduler;
    use crate::session::EventQueue;
    use crate::stream::InMemoryDataSource;

    /// Records which callbacks it received.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Strategy for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn on_tick(
            &mut self,
            _event: &PriceEvent,
            _ctx: &mut HandlerContext<'_>,
        ) -> Result<(), HandlerError> {
            self.log.lock().unwrap().push(format!("{}:tick", self.name));
            Ok(())
        }

        fn on_bar(
            &mut self,
            _event: &PriceEvent,
            _ctx: &mut HandlerContext<'_>,
        ) -> Result<(), HandlerError> {
            self.log.lock().unwrap().push(format!("{}:bar", self.name));
            Ok(())
        }

        fn on_order(
            &mut self,
            _order: &Order,
            _ctx: &mut HandlerContext<'_>,
        ) -> Result<(), HandlerError> {
            self.log.lock().unwrap().push(format!("{}:order", self.name));
            Ok(())
        }
    }

    fn tick_event() -> PriceEvent {
        PriceEvent::new(
            Timestamp::parse("2024-01-01 09:30:00").unwrap(),
            PriceKind::Tick,
            vec![(
                InstrumentId::new("EURUSD"),
                PriceObservation::Tick(Tick {
                    bid: dec!(1.1),
                    ask: dec!(1.2),
                }),
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_chain_forwards_in_order_to_matching_callback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Strategies::new();
        chain.push(Box::new(Recorder { name: "a", log: Arc::clone(&log) }));
        chain.push(Box::new(Recorder { name: "b", log: Arc::clone(&log) }));

        let market = MergeScheduler::new(PriceKind::Tick, Arc::new(InMemoryDataSource::new()));
        let mut queue = EventQueue::new();
        let mut ctx = HandlerContext::new(&market, &mut queue);

        chain.on_price(&tick_event(), &mut ctx).unwrap();
        chain
            .on_order(
                &Order {
                    instrument: InstrumentId::new("EURUSD"),
                    action: crate::domain::Action::Buy,
                    quantity: 1,
                },
                &mut ctx,
            )
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:tick", "b:tick", "a:order", "b:order"]
        );
        assert_eq!(chain.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_display_strategy_counts_and_emits_nothing() {
        let market = MergeScheduler::new(PriceKind::Tick, Arc::new(InMemoryDataSource::new()));
        let mut queue = EventQueue::new();
        let mut ctx = HandlerContext::new(&market, &mut queue);

        let mut display = DisplayStrategy::new(2).with_window(1);
        display.on_init().unwrap();
        for _ in 0..5 {
            display.on_tick(&tick_event(), &mut ctx).unwrap();
        }
        assert_eq!(display.seen(), 5);
        assert_eq!(ctx.pending(), 0);
    }
}
