//! K-way merge of per-instrument streams into compound price events.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::error::{DataFailure, FailureKind, SubscriptionError};
use crate::domain::{Action, InstrumentId, PriceEvent, PriceKind, PriceObservation, Timestamp};
use crate::stream::{DataSource, InstrumentStream};

/// A queued observation waiting in the merge heap.
///
/// The observation travels with the entry and only reaches the last-known
/// cache once it is emitted.
#[derive(Debug)]
struct PendingEntry {
    timestamp: Timestamp,
    sequence: u64,
    instrument: InstrumentId,
    generation: u64,
    observation: PriceObservation,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.sequence == other.sequence
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest timestamp, then earliest queued)
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// An active instrument and its stream.
#[derive(Debug)]
struct Subscription {
    stream: InstrumentStream,
    generation: u64,
}

/// Merges per-instrument streams into one time-ordered sequence.
///
/// Each call to [`advance`](Self::advance) emits one [`PriceEvent`] holding
/// every instrument whose next observation carries the earliest pending
/// timestamp. Simultaneous observations are never split across events.
///
/// The scheduler also keeps the last emitted observation per instrument,
/// which collaborators query for fill prices and valuations. Observations
/// read ahead for the merge stay out of that cache until their event goes
/// out.
pub struct MergeScheduler {
    kind: PriceKind,
    source: Arc<dyn DataSource>,
    subscriptions: Vec<Subscription>,
    cache: HashMap<InstrumentId, (Timestamp, PriceObservation)>,
    pending: BinaryHeap<PendingEntry>,
    queued: HashSet<InstrumentId>,
    failures: Vec<DataFailure>,
    next_sequence: u64,
    next_generation: u64,
    events_emitted: u64,
}

impl std::fmt::Debug for MergeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeScheduler")
            .field("kind", &self.kind)
            .field("source", &self.source.name())
            .field("subscriptions", &self.subscriptions)
            .field("pending_len", &self.pending.len())
            .field("failures", &self.failures)
            .field("events_emitted", &self.events_emitted)
            .finish_non_exhaustive()
    }
}

impl MergeScheduler {
    /// Create a scheduler with no subscriptions.
    pub fn new(kind: PriceKind, source: Arc<dyn DataSource>) -> Self {
        Self {
            kind,
            source,
            subscriptions: Vec::new(),
            cache: HashMap::new(),
            pending: BinaryHeap::new(),
            queued: HashSet::new(),
            failures: Vec::new(),
            next_sequence: 0,
            next_generation: 0,
            events_emitted: 0,
        }
    }

    /// Subscribe an instrument and queue its first observation.
    ///
    /// On failure the scheduler is unchanged apart from the recorded
    /// failure, and keeps serving the other instruments.
    pub fn subscribe(&mut self, instrument: impl Into<InstrumentId>) -> Result<(), SubscriptionError> {
        let instrument = instrument.into();

        match self.open_subscription(&instrument) {
            Ok(first) => {
                info!(
                    instrument = %instrument,
                    source = %self.source.name(),
                    first = %first,
                    active = self.subscriptions.len(),
                    "Instrument subscribed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Could not subscribe instrument");
                self.failures.push(DataFailure {
                    instrument,
                    kind: FailureKind::Subscription,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Subscribe several instruments, returning the failures.
    pub fn subscribe_all<I, S>(&mut self, instruments: I) -> Vec<SubscriptionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentId>,
    {
        instruments
            .into_iter()
            .filter_map(|instrument| self.subscribe(instrument).err())
            .collect()
    }

    fn open_subscription(&mut self, instrument: &InstrumentId) -> Result<Timestamp, SubscriptionError> {
        if self.is_subscribed(instrument.as_str()) {
            return Err(SubscriptionError::AlreadySubscribed(instrument.clone()));
        }

        let reader = self.source.open(instrument, self.kind)?;
        let mut stream = InstrumentStream::new(instrument.clone(), self.kind, reader);
        let (timestamp, observation) = stream
            .next_observation()?
            .ok_or_else(|| SubscriptionError::EmptyStream(instrument.clone()))?;

        self.next_generation += 1;
        let generation = self.next_generation;

        self.push_pending(timestamp, observation, instrument.clone(), generation);
        self.subscriptions.push(Subscription { stream, generation });

        Ok(timestamp)
    }

    /// Stop emitting events for an instrument.
    ///
    /// Its pending heap entry, if any, is left in place and discarded when
    /// it reaches the top.
    pub fn unsubscribe(&mut self, instrument: &str) -> Result<(), SubscriptionError> {
        let Some(index) = self.index_of(instrument) else {
            warn!(instrument = %instrument, "Could not unsubscribe instrument that was never subscribed");
            return Err(SubscriptionError::NotSubscribed(InstrumentId::new(instrument)));
        };

        let subscription = self.subscriptions.remove(index);
        self.cache.remove(instrument);
        self.queued.remove(instrument);

        info!(
            instrument = %instrument,
            rows_read = subscription.stream.rows_read(),
            active = self.subscriptions.len(),
            "Instrument unsubscribed"
        );
        Ok(())
    }

    /// Emit the next compound event, or `None` once every stream is drained.
    pub fn advance(&mut self) -> Option<PriceEvent> {
        self.refill();

        loop {
            self.discard_stale();
            let head = self.pending.peek()?.timestamp;

            let mut observations = Vec::new();
            while self.pending.peek().is_some_and(|entry| entry.timestamp == head) {
                let Some(entry) = self.pending.pop() else {
                    break;
                };
                if !self.is_live(&entry) {
                    continue;
                }
                self.queued.remove(&entry.instrument);
                self.cache
                    .insert(entry.instrument.clone(), (entry.timestamp, entry.observation));
                observations.push((entry.instrument, entry.observation));
            }

            if let Some(event) = PriceEvent::new(head, self.kind, observations) {
                self.events_emitted += 1;
                debug!(
                    timestamp = %head,
                    instruments = event.len(),
                    sequence = self.events_emitted,
                    "Compound price event"
                );
                return Some(event);
            }
        }
    }

    /// Pull one observation from every live stream not already queued.
    fn refill(&mut self) {
        let mut ready = Vec::new();

        for subscription in &mut self.subscriptions {
            if subscription.stream.is_exhausted()
                || self.queued.contains(subscription.stream.instrument())
            {
                continue;
            }

            let instrument = subscription.stream.instrument().clone();
            match subscription.stream.next_observation() {
                Ok(Some((timestamp, observation))) => {
                    ready.push((timestamp, observation, instrument, subscription.generation));
                }
                Ok(None) => {}
                Err(e) => {
                    self.failures.push(DataFailure {
                        instrument,
                        kind: FailureKind::InputData,
                        message: e.to_string(),
                    });
                }
            }
        }

        for (timestamp, observation, instrument, generation) in ready {
            self.push_pending(timestamp, observation, instrument, generation);
        }
    }

    fn push_pending(
        &mut self,
        timestamp: Timestamp,
        observation: PriceObservation,
        instrument: InstrumentId,
        generation: u64,
    ) {
        self.next_sequence += 1;
        self.queued.insert(instrument.clone());
        self.pending.push(PendingEntry {
            timestamp,
            sequence: self.next_sequence,
            instrument,
            generation,
            observation,
        });
    }

    fn discard_stale(&mut self) {
        while let Some(entry) = self.pending.peek() {
            if self.is_live(entry) {
                break;
            }
            debug!(instrument = %entry.instrument, "Discarding entry for unsubscribed instrument");
            self.pending.pop();
        }
    }

    fn is_live(&self, entry: &PendingEntry) -> bool {
        self.subscriptions.iter().any(|s| {
            s.generation == entry.generation && s.stream.instrument() == &entry.instrument
        })
    }

    fn index_of(&self, instrument: &str) -> Option<usize> {
        self.subscriptions
            .iter()
            .position(|s| s.stream.instrument().as_str() == instrument)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Observation shape served.
    #[must_use]
    pub const fn kind(&self) -> PriceKind {
        self.kind
    }

    /// Whether `instrument` is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self, instrument: &str) -> bool {
        self.index_of(instrument).is_some()
    }

    /// Active instruments in subscription order.
    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.subscriptions.iter().map(|s| s.stream.instrument())
    }

    /// Number of active instruments.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Most recent observation seen for `instrument`.
    ///
    /// Kept after the instrument's stream is exhausted.
    #[must_use]
    pub fn last_observation(&self, instrument: &str) -> Option<&PriceObservation> {
        self.cache.get(instrument).map(|(_, observation)| observation)
    }

    /// Timestamp of the most recent observation for `instrument`.
    #[must_use]
    pub fn last_timestamp(&self, instrument: &str) -> Option<Timestamp> {
        self.cache.get(instrument).map(|(timestamp, _)| *timestamp)
    }

    /// Latest `(bid, ask)` for a tick instrument.
    #[must_use]
    pub fn best_bid_ask(&self, instrument: &str) -> Option<(Decimal, Decimal)> {
        self.last_observation(instrument)
            .and_then(PriceObservation::as_tick)
            .map(|tick| (tick.bid, tick.ask))
    }

    /// Latest unadjusted close for a bar instrument.
    #[must_use]
    pub fn last_close(&self, instrument: &str) -> Option<Decimal> {
        self.last_observation(instrument)
            .and_then(PriceObservation::as_bar)
            .map(|bar| bar.close)
    }

    /// Price a trade would execute at: ask for buys and bid for sells on
    /// ticks, the last close on bars.
    #[must_use]
    pub fn last_price(&self, instrument: &str, action: Action) -> Option<Decimal> {
        match self.last_observation(instrument)? {
            PriceObservation::Tick(tick) => Some(match action {
                Action::Buy => tick.ask,
                Action::Sell => tick.bid,
            }),
            PriceObservation::Bar(bar) => Some(bar.close),
        }
    }

    /// Per-instrument failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> &[DataFailure] {
        &self.failures
    }

    /// Compound events emitted so far.
    #[must_use]
    pub const fn events_emitted(&self) -> u64 {
        self.events_emitted
    }
}

impl Iterator for MergeScheduler {
    type Item = PriceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::stream::InMemoryDataSource;

    fn tick_source() -> InMemoryDataSource {
        let mut source = InMemoryDataSource::new();
        source.add_records(
            "EURUSD",
            &[
                ("2016-01-04 00:00:00.100", vec!["1.08710", "1.08720"]),
                ("2016-01-04 00:00:00.300", vec!["1.08711", "1.08721"]),
            ],
        );
        source.add_records(
            "GBPUSD",
            &[
                ("2016-01-04 00:00:00.200", vec!["1.47010", "1.47030"]),
                ("2016-01-04 00:00:00.300", vec!["1.47011", "1.47031"]),
            ],
        );
        source
    }

    fn names(event: &PriceEvent) -> Vec<&str> {
        event.instruments().map(InstrumentId::as_str).collect()
    }

    #[test]
    fn test_merges_by_timestamp_and_groups_ties() {
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(tick_source()));
        assert!(scheduler.subscribe_all(["EURUSD", "GBPUSD"]).is_empty());

        let first = scheduler.advance().unwrap();
        assert_eq!(names(&first), vec!["EURUSD"]);

        let second = scheduler.advance().unwrap();
        assert_eq!(names(&second), vec!["GBPUSD"]);

        let third = scheduler.advance().unwrap();
        assert_eq!(third.len(), 2);
        assert!(third.contains("EURUSD") && third.contains("GBPUSD"));

        assert!(scheduler.advance().is_none());
        assert!(scheduler.advance().is_none());
        assert_eq!(scheduler.events_emitted(), 3);
    }

    #[test]
    fn test_cache_survives_exhaustion() {
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(tick_source()));
        scheduler.subscribe("EURUSD").unwrap();
        while scheduler.advance().is_some() {}

        assert_eq!(
            scheduler.best_bid_ask("EURUSD"),
            Some((dec!(1.08711), dec!(1.08721)))
        );
        assert_eq!(scheduler.last_price("EURUSD", Action::Buy), Some(dec!(1.08721)));
        assert_eq!(scheduler.last_price("EURUSD", Action::Sell), Some(dec!(1.08711)));
        assert_eq!(scheduler.last_close("EURUSD"), None);
    }

    #[test]
    fn test_cache_never_holds_unemitted_observations() {
        let mut source = InMemoryDataSource::new();
        source.add_records(
            "A",
            &[
                ("2016-01-04 00:00:01", vec!["1.0", "1.0"]),
                ("2016-01-04 00:00:02", vec!["2.0", "2.0"]),
            ],
        );
        source.add_records(
            "B",
            &[
                ("2016-01-04 00:00:01", vec!["8.0", "8.0"]),
                ("2016-01-04 00:00:03", vec!["9.0", "9.0"]),
            ],
        );
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(source));
        scheduler.subscribe_all(["A", "B"]);
        assert!(scheduler.last_observation("A").is_none());

        let first = scheduler.advance().unwrap();
        assert_eq!(first.len(), 2);

        let second = scheduler.advance().unwrap();
        assert_eq!(names(&second), vec!["A"]);
        // B's 00:00:03 row is read ahead but not yet emitted.
        assert_eq!(scheduler.last_timestamp("B"), Some(first.timestamp()));
        assert_eq!(scheduler.best_bid_ask("B"), Some((dec!(8.0), dec!(8.0))));
        assert_eq!(scheduler.best_bid_ask("A"), Some((dec!(2.0), dec!(2.0))));

        let third = scheduler.advance().unwrap();
        assert_eq!(names(&third), vec!["B"]);
        assert_eq!(scheduler.last_timestamp("B"), Some(third.timestamp()));
        assert_eq!(scheduler.best_bid_ask("B"), Some((dec!(9.0), dec!(9.0))));
    }

    #[test]
    fn test_duplicate_subscribe_rejected() {
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(tick_source()));
        scheduler.subscribe("EURUSD").unwrap();
        let err = scheduler.subscribe("EURUSD").unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadySubscribed(_)));
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn test_missing_source_is_reported_not_fatal() {
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(tick_source()));
        scheduler.subscribe("EURUSD").unwrap();

        let err = scheduler.subscribe("USDJPY").unwrap_err();
        assert!(matches!(err, SubscriptionError::MissingDataSource(ref id) if id.as_str() == "USDJPY"));
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(scheduler.failures().len(), 1);
        assert_eq!(scheduler.failures()[0].kind, FailureKind::Subscription);

        // Still usable for the remaining instrument.
        assert_eq!(scheduler.by_ref().count(), 2);
    }

    #[test]
    fn test_unsubscribe_unknown() {
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(tick_source()));
        assert!(matches!(
            scheduler.unsubscribe("EURUSD"),
            Err(SubscriptionError::NotSubscribed(_))
        ));
    }

    #[test]
    fn test_unsubscribe_drops_pending_entry() {
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(tick_source()));
        scheduler.subscribe_all(["EURUSD", "GBPUSD"]);

        scheduler.unsubscribe("EURUSD").unwrap();
        assert!(scheduler.last_observation("EURUSD").is_none());

        let events: Vec<PriceEvent> = scheduler.by_ref().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| names(e) == vec!["GBPUSD"]));
    }

    #[test]
    fn test_resubscribe_ignores_stale_generation() {
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(tick_source()));
        scheduler.subscribe("EURUSD").unwrap();
        scheduler.unsubscribe("EURUSD").unwrap();
        scheduler.subscribe("EURUSD").unwrap();

        // The stale entry from the first subscription must not double-emit.
        let events: Vec<PriceEvent> = scheduler.by_ref().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.len() == 1));
    }

    #[test]
    fn test_empty_stream_subscription() {
        let mut source = InMemoryDataSource::new();
        source.add_rows("EMPTY", Vec::new());
        let mut scheduler = MergeScheduler::new(PriceKind::Bar, Arc::new(source));
        assert!(matches!(
            scheduler.subscribe("EMPTY"),
            Err(SubscriptionError::EmptyStream(_))
        ));
        assert!(scheduler.advance().is_none());
    }

    #[test]
    fn test_input_error_mid_stream_drops_instrument() {
        let mut source = tick_source();
        source.add_records(
            "BADUSD",
            &[
                ("2016-01-04 00:00:00.100", vec!["1.0", "1.1"]),
                ("2016-01-04 00:00:00.100", vec!["1.0", "1.1"]),
                ("2016-01-04 00:00:00.400", vec!["1.0", "1.1"]),
            ],
        );
        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(source));
        scheduler.subscribe_all(["EURUSD", "BADUSD"]);

        let events: Vec<PriceEvent> = scheduler.by_ref().collect();
        let bad_count = events.iter().filter(|e| e.contains("BADUSD")).count();
        assert_eq!(bad_count, 1);
        assert_eq!(events.len(), 2);

        let failure = &scheduler.failures()[0];
        assert_eq!(failure.instrument.as_str(), "BADUSD");
        assert_eq!(failure.kind, FailureKind::InputData);
    }
}
