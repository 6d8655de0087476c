//! Integration tests for the k-way merge scheduler.
//!
//! Uses proptest to verify:
//! 1. Merged timestamps strictly increase from one compound event to the next
//! 2. Every input observation lands in exactly one compound event
//! 3. Last-known prices never come from a later timestamp than the current event
//!
//! And checks the tie, unsubscribe and bad-input scenarios directly.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use backtest_engine::domain::{InstrumentId, PriceKind, Timestamp};
use backtest_engine::scheduler::{FailureKind, MergeScheduler, SubscriptionError};
use backtest_engine::stream::InMemoryDataSource;
use chrono::{NaiveDate, TimeDelta};
use proptest::prelude::*;

fn at(seconds: i64) -> String {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    (base + TimeDelta::seconds(seconds))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn tick_rows(offsets: &[i64]) -> Vec<(String, Vec<String>)> {
    offsets
        .iter()
        .map(|s| (at(*s), vec!["1.00000".to_string(), "1.00010".to_string()]))
        .collect()
}

fn bar_rows(dates: &[&str]) -> Vec<(String, Vec<String>)> {
    dates
        .iter()
        .map(|d| {
            (
                (*d).to_string(),
                ["10", "11", "9", "10.5", "1000", "10.5"]
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            )
        })
        .collect()
}

// ── Strategies (proptest) ────────────────────────────────────────────

/// Strictly increasing second offsets with small gaps, so cross-stream ties are common.
fn arb_offsets() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1..4_i64, 1..20).prop_map(|gaps| {
        gaps.iter()
            .scan(0_i64, |acc, gap| {
                *acc += gap;
                Some(*acc)
            })
            .collect()
    })
}

fn arb_streams() -> impl Strategy<Value = Vec<Vec<i64>>> {
    prop::collection::vec(arb_offsets(), 1..5)
}

// ── 1-3. Ordering, completeness and causality ───────────────────────

proptest! {
    /// Compound events come out in strictly increasing timestamp order and
    /// together hold each input observation exactly once.
    #[test]
    fn merge_is_ordered_and_complete(streams in arb_streams()) {
        let mut source = InMemoryDataSource::new();
        let mut expected = Vec::new();
        for (i, offsets) in streams.iter().enumerate() {
            let name = format!("I{i}");
            source.add_records(name.as_str(), &tick_rows(offsets));
            for s in offsets {
                expected.push((name.clone(), Timestamp::parse(&at(*s)).unwrap()));
            }
        }

        let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(source));
        let names: Vec<String> = (0..streams.len()).map(|i| format!("I{i}")).collect();
        prop_assert!(scheduler.subscribe_all(names.iter().map(String::as_str)).is_empty());

        let mut seen = Vec::new();
        let mut previous: Option<Timestamp> = None;
        while let Some(event) = scheduler.advance() {
            if let Some(previous) = previous {
                prop_assert!(event.timestamp() > previous);
            }
            previous = Some(event.timestamp());
            for instrument in event.instruments() {
                seen.push((instrument.as_str().to_string(), event.timestamp()));
            }
            // Last-known data never runs ahead of the event being dispatched.
            for name in &names {
                if let Some(last) = scheduler.last_timestamp(name) {
                    prop_assert!(last <= event.timestamp());
                }
            }
        }

        expected.sort();
        seen.sort();
        prop_assert_eq!(seen, expected);
        prop_assert!(scheduler.failures().is_empty());
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn test_third_and_first_observations_share_an_event() {
    let mut source = InMemoryDataSource::new();
    source.add_records("A", &tick_rows(&[1, 2, 3, 4]));
    source.add_records("B", &tick_rows(&[3, 5]));

    let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(source));
    scheduler.subscribe_all(["A", "B"]);
    let events: Vec<_> = scheduler.by_ref().collect();

    let tied = &events[2];
    assert_eq!(tied.timestamp(), Timestamp::parse(&at(3)).unwrap());
    assert!(tied.contains("A") && tied.contains("B"));
    assert_eq!(events.len(), 5);
}

#[test]
fn test_identically_dated_bars_group_per_day() {
    let dates = ["2016-01-04", "2016-01-05", "2016-01-06", "2016-01-07", "2016-01-08"];
    let mut source = InMemoryDataSource::new();
    for ticker in ["GOOG", "MSFT", "AAPL"] {
        source.add_records(ticker, &bar_rows(&dates));
    }

    let mut scheduler = MergeScheduler::new(PriceKind::Bar, Arc::new(source));
    assert!(scheduler.subscribe_all(["GOOG", "MSFT", "AAPL"]).is_empty());
    let events: Vec<_> = scheduler.by_ref().collect();

    assert_eq!(events.len(), 5);
    for (event, date) in events.iter().zip(dates) {
        assert_eq!(event.len(), 3);
        assert_eq!(event.timestamp().to_string(), date);
        assert_eq!(event.period_secs(), Some(86_400));
    }
    assert_eq!(scheduler.last_close("MSFT").unwrap().to_string(), "10.50000");
}

#[test]
fn test_unsubscribe_mid_run_stops_instrument() {
    let mut source = InMemoryDataSource::new();
    source.add_records("A", &tick_rows(&[1, 2, 3, 4, 5]));
    source.add_records("B", &tick_rows(&[1, 2, 3, 4, 5]));

    let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(source));
    scheduler.subscribe_all(["A", "B"]);

    let first = scheduler.advance().unwrap();
    assert_eq!(first.len(), 2);
    let second = scheduler.advance().unwrap();
    assert_eq!(second.len(), 2);

    scheduler.unsubscribe("B").unwrap();
    assert!(!scheduler.is_subscribed("B"));
    assert!(scheduler.last_observation("B").is_none());

    let rest: Vec<_> = scheduler.by_ref().collect();
    assert_eq!(rest.len(), 3);
    assert!(rest.iter().all(|e| e.len() == 1 && e.contains("A")));
}

#[test]
fn test_duplicate_timestamp_drops_only_that_instrument() {
    let mut source = InMemoryDataSource::new();
    source.add_records("GOOD", &tick_rows(&[1, 2, 3]));
    source.add_records("DUP", &tick_rows(&[1, 2, 2, 3]));

    let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(source));
    scheduler.subscribe_all(["GOOD", "DUP"]);

    let mut per_instrument: BTreeMap<String, usize> = BTreeMap::new();
    for event in scheduler.by_ref() {
        for instrument in event.instruments() {
            *per_instrument.entry(instrument.to_string()).or_default() += 1;
        }
    }

    assert_eq!(per_instrument["GOOD"], 3);
    assert_eq!(per_instrument["DUP"], 2);

    let failures = scheduler.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].instrument, InstrumentId::new("DUP"));
    assert_eq!(failures[0].kind, FailureKind::InputData);
}

#[test]
fn test_absent_data_source_leaves_active_count() {
    let mut source = InMemoryDataSource::new();
    source.add_records("A", &tick_rows(&[1]));

    let mut scheduler = MergeScheduler::new(PriceKind::Tick, Arc::new(source));
    scheduler.subscribe("A").unwrap();
    let before = scheduler.active_count();

    let err = scheduler.subscribe("NOPE").unwrap_err();
    assert!(matches!(err, SubscriptionError::MissingDataSource(_)));
    assert_eq!(scheduler.active_count(), before);
    assert_eq!(scheduler.failures()[0].kind, FailureKind::Subscription);
    assert_eq!(scheduler.by_ref().count(), 1);
}
