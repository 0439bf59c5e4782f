//! End-to-end tests: bars through the signal model into the allocator.

use chrono::{Datelike, NaiveDate};
use signallab_core::config::StrategyConfig;
use signallab_core::domain::{DailyBar, SecurityId, SignalDirection};
use signallab_core::features::{HistoryError, HistoryProvider};
use signallab_core::{allocate, CapPolicy, PortfolioSnapshot, SignalModel, WeightAllocator};

fn day(i: i64) -> NaiveDate {
    // Monday
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Duration::days(i)
}

/// Constant daily drift: opens compound by `1 + drift`, closes sit `drift` above the open.
fn drifting_bars(symbol: &str, n: usize, drift: f64) -> Vec<DailyBar> {
    (0..n)
        .map(|i| {
            let open = 100.0 * (1.0 + drift).powi(i as i32);
            DailyBar::from_open_close(symbol, day(i as i64), open, open * (1.0 + drift))
        })
        .collect()
}

struct NoHistory;

impl HistoryProvider for NoHistory {
    fn history(
        &self,
        _symbol: &SecurityId,
        _as_of: NaiveDate,
        _count: usize,
    ) -> Result<Vec<DailyBar>, HistoryError> {
        Ok(Vec::new())
    }
}

struct Preloaded(Vec<DailyBar>);

impl HistoryProvider for Preloaded {
    fn history(
        &self,
        symbol: &SecurityId,
        as_of: NaiveDate,
        count: usize,
    ) -> Result<Vec<DailyBar>, HistoryError> {
        let mut bars: Vec<DailyBar> = self
            .0
            .iter()
            .filter(|b| &b.symbol == symbol && b.date < as_of)
            .cloned()
            .collect();
        let skip = bars.len().saturating_sub(count);
        bars.drain(..skip);
        Ok(bars)
    }
}

#[test]
fn single_class_history_predicts_up_with_certainty() {
    let mut model = SignalModel::new(StrategyConfig::default());
    model.on_universe_changed(&["SPY".into()], &[], &NoHistory, day(0));

    for bar in drifting_bars("SPY", 200, 0.01) {
        model.on_bar(&bar);
    }
    assert_eq!(model.ready_count(), 1);

    let signals = model.update(day(200), 1);
    assert_eq!(signals.len(), 1);
    let signal = &signals[0];
    assert_eq!(signal.direction, SignalDirection::Up);
    assert!((signal.weight.unwrap() - 1.0).abs() < 1e-12);
    assert_eq!(signal.generated_on, day(200));
    assert_eq!(signal.expires_on, day(230));
    assert_eq!(signal.source, "gaussian_nb");
    assert_eq!(model.last_signalled_week(), Some(day(200).iso_week()));
}

#[test]
fn falling_security_gets_no_signal() {
    let mut model = SignalModel::new(StrategyConfig::default());
    model.on_universe_changed(&["UP".into(), "DOWN".into()], &[], &NoHistory, day(0));

    for (up, down) in drifting_bars("UP", 200, 0.01)
        .into_iter()
        .zip(drifting_bars("DOWN", 200, -0.01))
    {
        model.on_bar(&up);
        model.on_bar(&down);
    }
    assert_eq!(model.ready_count(), 2);

    let signals = model.update(day(200), 2);
    let symbols: Vec<&str> = signals.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["UP"]);
}

#[test]
fn warmed_up_universe_signals_on_first_update() {
    let mut history = drifting_bars("AAA", 200, 0.01);
    history.extend(drifting_bars("BBB", 200, 0.02));
    let provider = Preloaded(history);

    let mut model = SignalModel::new(StrategyConfig::default());
    let report = model.on_universe_changed(&["AAA".into(), "BBB".into()], &[], &provider, day(200));
    assert_eq!(report.trained, 2);

    let signals = model.update(day(200), 2);
    assert_eq!(signals.len(), 2);

    let weights = allocate(&signals, 0.03, 0.5);
    assert!((weights[&SecurityId::from("AAA")] - 0.5).abs() < 1e-12);
    assert!((weights[&SecurityId::from("BBB")] - 0.5).abs() < 1e-12);
}

#[test]
fn removed_security_stops_signalling() {
    let mut history = drifting_bars("AAA", 200, 0.01);
    history.extend(drifting_bars("BBB", 200, 0.01));
    let provider = Preloaded(history);

    let mut model = SignalModel::new(StrategyConfig::default());
    model.on_universe_changed(&["AAA".into(), "BBB".into()], &[], &provider, day(200));
    model.on_universe_changed(&[], &["AAA".into()], &provider, day(200));

    let signals = model.update(day(200), 1);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].symbol.as_str(), "BBB");
    assert!(model.store(&"AAA".into()).is_none());
}

#[test]
fn signals_flow_into_cash_capped_weights() {
    let mut history = Vec::new();
    for symbol in ["A", "B", "C", "D", "E"] {
        history.extend(drifting_bars(symbol, 150, 0.01));
    }
    let provider = Preloaded(history);
    let symbols: Vec<SecurityId> = ["A", "B", "C", "D", "E"].into_iter().map(Into::into).collect();

    let mut model = SignalModel::new(StrategyConfig::default());
    model.on_universe_changed(&symbols, &[], &provider, day(150));
    let signals = model.update(day(150), 5);
    assert_eq!(signals.len(), 5);

    let allocator = WeightAllocator::new(
        0.03,
        CapPolicy::CashFraction {
            max_cash_fraction: 0.25,
        },
    );
    let portfolio = PortfolioSnapshot {
        total_value: 100_000.0,
        cash: 40_000.0,
    };
    let weights = allocator.target_weights(&signals, &portfolio);
    // every normalized weight is 0.2, the cap is 0.25 * 0.4 = 0.1
    assert_eq!(weights.len(), 5);
    assert!(weights.values().all(|w| (w - 0.1).abs() < 1e-12));
}
