//! Secondary FIFO of derived events.

use std::collections::VecDeque;

use crate::domain::DerivedEvent;

/// Unbounded, non-blocking FIFO drained within each dispatch cycle.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<DerivedEvent>,
    total_enqueued: u64,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at the tail.
    pub fn push(&mut self, event: impl Into<DerivedEvent>) {
        self.events.push_back(event.into());
        self.total_enqueued += 1;
    }

    /// Take the event at the head; `None` when empty.
    pub fn try_pop(&mut self) -> Option<DerivedEvent> {
        self.events.pop_front()
    }

    /// Events currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events pushed since creation.
    #[must_use]
    pub const fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }
}
