//! Integration tests for the per-security sample store.
//!
//! Covers the reference rising-price scenario, warm-up through a history
//! provider, and the all-or-nothing behavior of a bad history batch.

use chrono::{Datelike, NaiveDate, Weekday};
use signallab_core::config::SampleParams;
use signallab_core::domain::{DailyBar, SecurityId};
use signallab_core::features::{
    BarOutcome, HistoryError, HistoryProvider, SampleStore, WarmUpOutcome,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Duration::days(i)
}

/// Opens rising 1% per day, each bar closing 1% above its open.
fn rising_bars(symbol: &str, n: usize) -> Vec<DailyBar> {
    (0..n)
        .map(|i| {
            let open = 100.0 * 1.01f64.powi(i as i32);
            DailyBar::from_open_close(symbol, day(i as i64), open, open * 1.01)
        })
        .collect()
}

/// Rising bars on Monday-to-Friday dates only.
fn weekday_bars(symbol: &str, n: usize) -> Vec<DailyBar> {
    (0..)
        .map(day)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .enumerate()
        .map(|(i, date)| {
            let open = 100.0 * 1.001f64.powi(i as i32);
            DailyBar::from_open_close(symbol, date, open, open * 1.001)
        })
        .collect()
}

/// History served from a fixed list, honoring the `as_of` / `count` contract.
struct FixedHistory(Vec<DailyBar>);

impl HistoryProvider for FixedHistory {
    fn history(
        &self,
        symbol: &SecurityId,
        as_of: NaiveDate,
        count: usize,
    ) -> Result<Vec<DailyBar>, HistoryError> {
        let before: Vec<DailyBar> = self
            .0
            .iter()
            .filter(|b| &b.symbol == symbol && b.date < as_of)
            .cloned()
            .collect();
        let skip = before.len().saturating_sub(count);
        Ok(before.into_iter().skip(skip).collect())
    }
}

struct FailingHistory;

impl HistoryProvider for FailingHistory {
    fn history(
        &self,
        _symbol: &SecurityId,
        _as_of: NaiveDate,
        _count: usize,
    ) -> Result<Vec<DailyBar>, HistoryError> {
        Err(HistoryError::Source("connection refused".into()))
    }
}

// ──────────────────────────────────────────────
// Reference scenario
// ──────────────────────────────────────────────

#[test]
fn rising_prices_fill_every_table_with_up_labels() {
    let mut store = SampleStore::new("SPY".into(), SampleParams::default());
    for bar in rising_bars("SPY", 200) {
        store.on_daily_bar(&bar);
    }

    let window: Vec<f64> = store.roc_window().iter().copied().collect();
    assert_eq!(window.len(), 4);
    assert!(window.iter().all(|r| (r - 0.01).abs() < 1e-12));

    assert!(store.is_ready());
    assert_eq!(store.features().len(), 132);
    assert_eq!(store.labels().len(), 100);
    assert_eq!(store.pending_opens().len(), 30);
    assert!(store.labels().iter().all(|(_, label)| *label == 1));

    // day 199 labels day 169; the newest 100 labels are days 70..=169
    assert_eq!(store.labels().first_day(), Some(day(70)));
    assert_eq!(store.labels().last().map(|(d, _)| d), Some(day(169)));

    let set = store.training_set().unwrap();
    assert_eq!(set.len(), 100);
    assert!(set.features.iter().all(|row| row.len() == 4));
}

#[test]
fn weekday_calendar_keeps_labels_on_retained_feature_days() {
    let mut store = SampleStore::new("SPY".into(), SampleParams::default());
    for bar in weekday_bars("SPY", 600) {
        store.on_daily_bar(&bar);
        for labeled in store.labels().days() {
            assert!(
                store.features().contains(&labeled),
                "label on {labeled} has no feature row after {}",
                bar.date
            );
        }
        for pending in store.pending_opens().days() {
            assert!(store.features().contains(&pending));
        }
    }

    assert!(store.is_ready());
    assert!(store.labels().len() <= 100);
    assert!(!store.labels().is_empty());
    let set = store.training_set().unwrap();
    assert_eq!(set.len(), store.labels().len());
    assert_eq!(set.days.first().copied(), store.labels().first_day());
}

#[test]
fn labels_wait_for_the_holding_period() {
    let params = SampleParams {
        num_days_per_sample: 1,
        num_samples: 10,
        holding_period_days: 5,
    };
    let mut store = SampleStore::new("SPY".into(), params);
    let bars = rising_bars("SPY", 10);
    for bar in &bars[..5] {
        assert_eq!(
            store.on_daily_bar(bar),
            BarOutcome::Recorded { labeled: None }
        );
    }
    assert_eq!(
        store.on_daily_bar(&bars[5]),
        BarOutcome::Recorded {
            labeled: Some(day(0))
        }
    );
    assert_eq!(store.labels().get(&day(0)), Some(&1));
}

#[test]
fn calendar_gaps_label_latest_qualifying_day() {
    let params = SampleParams {
        num_days_per_sample: 1,
        num_samples: 10,
        holding_period_days: 7,
    };
    let mut store = SampleStore::new("SPY".into(), params);
    store.on_bar(day(0), 100.0, 100.0);
    store.on_bar(day(1), 101.0, 101.0);
    store.on_bar(day(2), 102.0, 102.0);
    // ten-day gap: day 12 reaches back to day 5 or earlier, newest is day 2
    let outcome = store.on_bar(day(12), 90.0, 90.0);
    assert_eq!(
        outcome,
        BarOutcome::Recorded {
            labeled: Some(day(2))
        }
    );
    assert_eq!(store.labels().get(&day(2)), Some(&-1));
    assert!(store.labels().get(&day(0)).is_none());
}

// ──────────────────────────────────────────────
// Warm-up
// ──────────────────────────────────────────────

#[test]
fn warm_up_requests_full_lookback_and_becomes_ready() {
    let provider = FixedHistory(rising_bars("SPY", 300));
    let mut store = SampleStore::new("SPY".into(), SampleParams::default());
    let outcome = store.warm_up_from(&provider, day(250));
    assert_eq!(
        outcome,
        WarmUpOutcome::Replayed {
            bars: 135,
            ready: true
        }
    );
    assert_eq!(store.features().last().map(|(d, _)| d), Some(day(249)));
}

#[test]
fn warm_up_then_live_bars_match_pure_live_feed() {
    let bars = rising_bars("SPY", 160);
    let provider = FixedHistory(bars.clone());

    let mut warmed = SampleStore::new("SPY".into(), SampleParams::default());
    warmed.warm_up_from(&provider, day(150));
    for bar in &bars[150..] {
        warmed.on_daily_bar(bar);
    }

    let mut live = SampleStore::new("SPY".into(), SampleParams::default());
    for bar in &bars[15..] {
        live.on_daily_bar(bar);
    }

    assert_eq!(warmed.training_set(), live.training_set());
    assert_eq!(warmed.latest_features(), live.latest_features());
}

#[test]
fn malformed_history_leaves_store_empty() {
    let mut store = SampleStore::new("SPY".into(), SampleParams::default());
    for bar in rising_bars("SPY", 200) {
        store.on_daily_bar(&bar);
    }
    assert!(store.is_ready());

    let mut history = rising_bars("SPY", 135);
    history[60] = history[59].clone();
    assert_eq!(store.warm_up(&history), WarmUpOutcome::Skipped);
    assert!(!store.is_ready());
    assert!(store.features().is_empty());
    assert!(store.labels().is_empty());
    assert!(store.roc_window().is_empty());
}

#[test]
fn failed_history_request_is_skipped() {
    let mut store = SampleStore::new("SPY".into(), SampleParams::default());
    assert_eq!(
        store.warm_up_from(&FailingHistory, day(10)),
        WarmUpOutcome::Skipped
    );
    assert!(store.features().is_empty());
}

#[test]
fn empty_history_is_skipped() {
    let provider = FixedHistory(Vec::new());
    let mut store = SampleStore::new("SPY".into(), SampleParams::default());
    assert_eq!(store.warm_up_from(&provider, day(10)), WarmUpOutcome::Skipped);
}

#[test]
fn reset_rebuilds_from_provider() {
    let bars = rising_bars("SPY", 300);
    let provider = FixedHistory(bars.clone());
    let mut store = SampleStore::new("SPY".into(), SampleParams::default());
    for bar in &bars[..40] {
        store.on_daily_bar(bar);
    }
    assert!(!store.is_ready());

    store.reset(&provider, day(300));
    assert!(store.is_ready());
    assert_eq!(store.latest_features().map(|(d, _)| d), Some(day(299)));
}
