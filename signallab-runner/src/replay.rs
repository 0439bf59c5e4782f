//! Replay driver: universe schedule → warm-up → daily bars → weekly signals → weights.
//!
//! Two entry points:
//! - `run_replay()`: loads bars for every scheduled symbol, then replays. Used by the CLI.
//! - `replay_loaded()`: replays pre-loaded bars with no I/O. Used by tests.
//!
//! Rebalances happen when new signals are emitted, immediately when a held
//! security leaves the universe, and at most once per ISO week when a holding
//! has lost its backing signal.
//!
//! Orders are not simulated. A paper portfolio is rebalanced instantly at the
//! day's closes so the cash-fraction cap sees a realistic cash balance.

use chrono::{Datelike, IsoWeek, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

use signallab_core::domain::{ConfigHash, DailyBar, SecurityId, Signal};
use signallab_core::{PortfolioSnapshot, SignalModel, WeightAllocator};

use crate::config::{ConfigError, RunConfig, UniverseEntry};
use crate::data_loader::{load_bars, DataSource, LoadError, LoadOptions, LoadedData};
use crate::history::InMemoryHistory;
use crate::signal_book::SignalBook;

/// Errors from the replay driver.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("no trading days between {start} and {end}")]
    NoTradingDays { start: NaiveDate, end: NaiveDate },
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// One security's target after a rebalance. Exits carry weight 0 and no probability.
///
/// A live target can also sit at weight 0 when a cash-derived ceiling is 0;
/// only `exit` marks a position being closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWeight {
    pub symbol: SecurityId,
    pub weight: f64,
    pub p_up: Option<f64>,
    #[serde(default)]
    pub exit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rebalance {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub targets: Vec<TargetWeight>,
}

impl Rebalance {
    pub fn exits(&self) -> impl Iterator<Item = &SecurityId> + '_ {
        self.targets
            .iter()
            .filter(|t| t.exit)
            .map(|t| &t.symbol)
    }

    pub fn gross_exposure(&self) -> f64 {
        self.targets.iter().map(|t| t.weight).sum()
    }
}

/// Complete result of a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config_hash: ConfigHash,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub sources: BTreeMap<SecurityId, DataSource>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub trading_days: usize,
    pub initial_value: f64,
    pub final_value: f64,
    pub signals: Vec<Signal>,
    pub rebalances: Vec<Rebalance>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Load bars for the whole schedule and replay them.
pub fn run_replay(config: &RunConfig) -> Result<ReplayResult, RunError> {
    config.validate()?;
    let opts = LoadOptions {
        data_dir: config.run.data_dir.clone(),
        start: history_start(config),
        end: config.run.end,
        synthetic: config.run.synthetic,
    };
    let loaded = load_bars(&config.all_symbols(), &opts)?;
    info!(
        symbols = loaded.bars.len(),
        bars = loaded.bar_count(),
        synthetic = loaded.has_synthetic,
        "data loaded"
    );
    replay_loaded(config, &loaded)
}

/// First calendar day worth loading so the initial warm-up finds a full lookback.
pub fn history_start(config: &RunConfig) -> NaiveDate {
    let trading_days = config.strategy.sampling.lookback_days() as i64;
    // five trading days per seven calendar days, plus slack for holidays
    config.run.start - chrono::Duration::days(trading_days * 7 / 5 + 14)
}

/// Replay pre-loaded bars over `[run.start, run.end]`.
pub fn replay_loaded(config: &RunConfig, loaded: &LoadedData) -> Result<ReplayResult, RunError> {
    let start = config.run.start;
    let end = config.run.end;

    let mut days: BTreeMap<NaiveDate, Vec<&DailyBar>> = BTreeMap::new();
    for bar in loaded.bars.values().flatten() {
        if bar.date >= start && bar.date <= end {
            days.entry(bar.date).or_default().push(bar);
        }
    }
    if days.is_empty() {
        return Err(RunError::NoTradingDays { start, end });
    }

    let history = InMemoryHistory::new(loaded.bars.clone());
    let mut model = SignalModel::new(config.strategy);
    let allocator = WeightAllocator::from_params(&config.strategy.allocation);
    let mut schedule = UniverseSchedule::new(&config.universe);
    let mut universe: BTreeSet<SecurityId> = BTreeSet::new();
    let mut book = SignalBook::new();
    let mut paper = PaperPortfolio::new(config.portfolio.initial_cash);

    let mut signals_out = Vec::new();
    let mut rebalances = Vec::new();
    let mut last_rebalance_week: Option<IsoWeek> = None;

    for (&day, bars) in &days {
        if let Some(entry) = schedule.advance(day) {
            let next: BTreeSet<SecurityId> = entry.symbols.iter().cloned().collect();
            let added: Vec<SecurityId> = next.difference(&universe).cloned().collect();
            let removed: Vec<SecurityId> = universe.difference(&next).cloned().collect();
            if !added.is_empty() || !removed.is_empty() {
                let report = model.on_universe_changed(&added, &removed, &history, day);
                info!(
                    %day,
                    added = added.len(),
                    removed = removed.len(),
                    trained = report.trained,
                    "universe changed"
                );
            }
            universe = next;
        }

        let mut bar_count = 0;
        for bar in bars {
            paper.mark(bar);
            if model.on_bar(bar).is_some() {
                bar_count += 1;
            }
        }

        let emitted = model.update(day, bar_count);
        let emitted_any = !emitted.is_empty();
        book.extend(emitted.iter().cloned());
        signals_out.extend(emitted);

        let active: Vec<Signal> = book
            .active_on(day)
            .into_iter()
            .filter(|s| universe.contains(&s.symbol))
            .collect();
        let stale_holding = paper
            .held()
            .any(|symbol| !active.iter().any(|s| &s.symbol == symbol));
        let left_universe = paper.held().any(|symbol| !universe.contains(symbol));
        let week = day.iso_week();

        if emitted_any || left_universe || (stale_holding && last_rebalance_week != Some(week)) {
            let weights = allocator.target_weights(&active, &paper.snapshot());
            let rebalance = build_rebalance(day, &weights, &paper, &book);
            debug!(
                %day,
                targets = weights.len(),
                exits = rebalance.exits().count(),
                exposure = rebalance.gross_exposure(),
                "rebalanced"
            );
            paper.rebalance(&weights);
            rebalances.push(rebalance);
            last_rebalance_week = Some(week);
        }

        book.prune(day);
    }

    let final_value = paper.value();
    info!(
        trading_days = days.len(),
        signals = signals_out.len(),
        rebalances = rebalances.len(),
        final_value,
        "replay complete"
    );

    Ok(ReplayResult {
        schema_version: SCHEMA_VERSION,
        config_hash: config.fingerprint()?,
        dataset_hash: loaded.dataset_hash.clone(),
        has_synthetic: loaded.has_synthetic,
        sources: loaded.sources.clone(),
        start,
        end,
        trading_days: days.len(),
        initial_value: config.portfolio.initial_cash,
        final_value,
        signals: signals_out,
        rebalances,
    })
}

fn build_rebalance(
    day: NaiveDate,
    weights: &BTreeMap<SecurityId, f64>,
    paper: &PaperPortfolio,
    book: &SignalBook,
) -> Rebalance {
    let mut targets: Vec<TargetWeight> = weights
        .iter()
        .map(|(symbol, weight)| TargetWeight {
            symbol: symbol.clone(),
            weight: *weight,
            p_up: book.latest_for(symbol, day).and_then(|s| s.confidence),
            exit: false,
        })
        .collect();
    targets.extend(
        paper
            .held()
            .filter(|symbol| !weights.contains_key(*symbol))
            .map(|symbol| TargetWeight {
                symbol: symbol.clone(),
                weight: 0.0,
                p_up: None,
                exit: true,
            }),
    );
    Rebalance {
        date: day,
        portfolio_value: paper.value(),
        targets,
    }
}

/// Walks the dated universe snapshots in order.
struct UniverseSchedule<'a> {
    entries: &'a [UniverseEntry],
    next: usize,
}

impl<'a> UniverseSchedule<'a> {
    fn new(entries: &'a [UniverseEntry]) -> Self {
        Self { entries, next: 0 }
    }

    /// Latest not-yet-applied snapshot effective on or before `day`.
    fn advance(&mut self, day: NaiveDate) -> Option<&'a UniverseEntry> {
        let mut due = None;
        while let Some(entry) = self.entries.get(self.next) {
            if entry.effective > day {
                break;
            }
            due = Some(entry);
            self.next += 1;
        }
        due
    }
}

/// Share holdings marked at the latest close; rebalanced with no costs.
#[derive(Debug)]
struct PaperPortfolio {
    cash: f64,
    shares: BTreeMap<SecurityId, f64>,
    last_close: BTreeMap<SecurityId, f64>,
}

impl PaperPortfolio {
    fn new(cash: f64) -> Self {
        Self {
            cash,
            shares: BTreeMap::new(),
            last_close: BTreeMap::new(),
        }
    }

    fn mark(&mut self, bar: &DailyBar) {
        self.last_close.insert(bar.symbol.clone(), bar.close);
    }

    fn held(&self) -> impl Iterator<Item = &SecurityId> + '_ {
        self.shares.keys()
    }

    fn value(&self) -> f64 {
        self.cash
            + self
                .shares
                .iter()
                .map(|(symbol, qty)| qty * self.last_close.get(symbol).copied().unwrap_or(0.0))
                .sum::<f64>()
    }

    fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            total_value: self.value(),
            cash: self.cash,
        }
    }

    /// Liquidate and re-buy at last closes so each position matches its weight.
    fn rebalance(&mut self, weights: &BTreeMap<SecurityId, f64>) {
        let value = self.value();
        self.shares.clear();
        self.cash = value;
        for (symbol, weight) in weights {
            let Some(&close) = self.last_close.get(symbol) else {
                continue;
            };
            if *weight <= 0.0 || close <= 0.0 {
                continue;
            }
            let notional = weight * value;
            self.shares.insert(symbol.clone(), notional / close);
            self.cash -= notional;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i)
    }

    #[test]
    fn schedule_applies_latest_due_snapshot_once() {
        let entries = vec![
            UniverseEntry {
                effective: day(0),
                symbols: vec!["A".into()],
            },
            UniverseEntry {
                effective: day(2),
                symbols: vec!["B".into()],
            },
            UniverseEntry {
                effective: day(10),
                symbols: vec!["C".into()],
            },
        ];
        let mut schedule = UniverseSchedule::new(&entries);
        let first = schedule.advance(day(5)).unwrap();
        assert_eq!(first.symbols, vec![SecurityId::from("B")]);
        assert!(schedule.advance(day(6)).is_none());
        assert_eq!(schedule.advance(day(12)).unwrap().effective, day(10));
    }

    #[test]
    fn paper_portfolio_tracks_cash_and_value() {
        let mut paper = PaperPortfolio::new(1_000.0);
        paper.mark(&DailyBar::from_open_close("A", day(0), 10.0, 10.0));
        paper.rebalance(&BTreeMap::from([(SecurityId::from("A"), 0.25)]));
        assert!((paper.cash - 750.0).abs() < 1e-9);

        paper.mark(&DailyBar::from_open_close("A", day(1), 10.0, 20.0));
        assert!((paper.value() - 1_250.0).abs() < 1e-9);
        let snap = paper.snapshot();
        assert!((snap.cash - 750.0).abs() < 1e-9);

        paper.rebalance(&BTreeMap::new());
        assert!((paper.cash - 1_250.0).abs() < 1e-9);
        assert_eq!(paper.held().count(), 0);
    }

    #[test]
    fn rebalance_lists_exits_with_zero_weight() {
        let mut paper = PaperPortfolio::new(1_000.0);
        paper.mark(&DailyBar::from_open_close("A", day(0), 10.0, 10.0));
        paper.mark(&DailyBar::from_open_close("B", day(0), 10.0, 10.0));
        paper.rebalance(&BTreeMap::from([(SecurityId::from("A"), 0.5)]));

        let weights = BTreeMap::from([(SecurityId::from("B"), 0.4)]);
        let rebalance = build_rebalance(day(1), &weights, &paper, &SignalBook::new());
        let exits: Vec<&str> = rebalance.exits().map(|s| s.as_str()).collect();
        assert_eq!(exits, vec!["A"]);
        assert!((rebalance.gross_exposure() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn zero_ceiling_targets_are_not_exits() {
        let mut paper = PaperPortfolio::new(1_000.0);
        paper.mark(&DailyBar::from_open_close("A", day(0), 10.0, 10.0));
        paper.rebalance(&BTreeMap::from([(SecurityId::from("A"), 1.0)]));
        assert!(paper.snapshot().cash.abs() < 1e-9);

        // fully invested: a cash-fraction ceiling of 0 pins live targets at 0
        let weights = BTreeMap::from([
            (SecurityId::from("A"), 0.0),
            (SecurityId::from("B"), 0.0),
        ]);
        let rebalance = build_rebalance(day(1), &weights, &paper, &SignalBook::new());
        assert_eq!(rebalance.targets.len(), 2);
        assert_eq!(rebalance.exits().count(), 0);
    }
}
