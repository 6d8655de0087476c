//! What a collaborator may touch while handling an event.

use crate::domain::DerivedEvent;
use crate::scheduler::MergeScheduler;
use crate::session::EventQueue;

/// Read-only market access plus the ability to emit derived events.
#[derive(Debug)]
pub struct HandlerContext<'a> {
    market: &'a MergeScheduler,
    events: &'a mut EventQueue,
}

impl<'a> HandlerContext<'a> {
    /// Borrow the scheduler and the secondary queue for one callback.
    pub fn new(market: &'a MergeScheduler, events: &'a mut EventQueue) -> Self {
        Self { market, events }
    }

    /// Last-known market state.
    #[must_use]
    pub const fn market(&self) -> &'a MergeScheduler {
        self.market
    }

    /// Queue an event for the current cycle's drain.
    pub fn emit(&mut self, event: impl Into<DerivedEvent>) {
        self.events.push(event);
    }

    /// Events waiting in the queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.events.len()
    }
}
