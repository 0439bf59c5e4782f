//! Weekly signal model: one sample store and one classifier per security.
//!
//! The model owns every `SampleStore`. Daily bars are routed to the store of
//! their security; once per ISO week it retrains every ready store and emits
//! an `Up` signal for each security whose up-class probability clears the
//! threshold. Failures stay local to the security that produced them.

use chrono::{Datelike, IsoWeek, NaiveDate};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::classifier::{fit_with_fallback, Classifier, FitStrategy, GaussianNb, UP_CLASS};
use crate::config::StrategyConfig;
use crate::domain::{DailyBar, SecurityId, Signal};
use crate::features::{BarOutcome, HistoryProvider, SampleStore, WarmUpOutcome};

/// Outcome counts of one training pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingReport {
    /// Stores that received a fresh model.
    pub trained: usize,
    /// Stores whose every fit strategy failed (model cleared).
    pub failed: usize,
    /// Stores not ready or without aligned samples (model untouched).
    pub skipped: usize,
}

pub struct SignalModel {
    config: StrategyConfig,
    classifier: Box<dyn Classifier>,
    strategies: Vec<FitStrategy>,
    stores: BTreeMap<SecurityId, SampleStore>,
    /// ISO week of the last emitted batch of signals.
    week: Option<IsoWeek>,
}

impl SignalModel {
    /// Signal model backed by Gaussian naive Bayes.
    pub fn new(config: StrategyConfig) -> Self {
        Self::with_classifier(config, Box::new(GaussianNb::default()))
    }

    pub fn with_classifier(config: StrategyConfig, classifier: Box<dyn Classifier>) -> Self {
        let strategies = config.model.fit_strategies();
        Self {
            config,
            classifier,
            strategies,
            stores: BTreeMap::new(),
            week: None,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn store(&self, symbol: &SecurityId) -> Option<&SampleStore> {
        self.stores.get(symbol)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &SecurityId> + '_ {
        self.stores.keys()
    }

    pub fn ready_count(&self) -> usize {
        self.stores.values().filter(|s| s.is_ready()).count()
    }

    /// ISO week of the last emitted signals, if any.
    pub fn last_signalled_week(&self) -> Option<IsoWeek> {
        self.week
    }

    /// Seed stores for added securities, drop stores for removed ones, then retrain.
    ///
    /// An added security that is already tracked is re-seeded from scratch.
    pub fn on_universe_changed(
        &mut self,
        added: &[SecurityId],
        removed: &[SecurityId],
        history: &dyn HistoryProvider,
        as_of: NaiveDate,
    ) -> TrainingReport {
        for symbol in added {
            let mut store = SampleStore::new(symbol.clone(), self.config.sampling);
            match store.warm_up_from(history, as_of) {
                WarmUpOutcome::Replayed { bars, ready } => {
                    debug!(%symbol, bars, ready, "security added");
                }
                WarmUpOutcome::Skipped => {
                    debug!(%symbol, "security added without history");
                }
            }
            self.stores.insert(symbol.clone(), store);
        }
        for symbol in removed {
            if self.stores.remove(symbol).is_some() {
                debug!(%symbol, "security removed");
            }
        }
        self.train()
    }

    /// Route a completed daily bar to its store. `None` if the security is not tracked.
    pub fn on_bar(&mut self, bar: &DailyBar) -> Option<BarOutcome> {
        self.stores
            .get_mut(&bar.symbol)
            .map(|store| store.on_daily_bar(bar))
    }

    /// Drop a store's state and re-seed it from history.
    pub fn reset(
        &mut self,
        symbol: &SecurityId,
        history: &dyn HistoryProvider,
        as_of: NaiveDate,
    ) -> Option<WarmUpOutcome> {
        self.stores
            .get_mut(symbol)
            .map(|store| store.reset(history, as_of))
    }

    /// Refit every ready store on its aligned feature/label history.
    ///
    /// Each model is replaced wholesale. A store whose fits all fail ends up
    /// with no model; stores without aligned samples keep their previous one.
    pub fn train(&mut self) -> TrainingReport {
        let mut report = TrainingReport::default();
        for (symbol, store) in self.stores.iter_mut() {
            if !store.is_ready() {
                report.skipped += 1;
                continue;
            }
            let Some(set) = store.training_set() else {
                report.skipped += 1;
                continue;
            };

            match fit_with_fallback(
                self.classifier.as_ref(),
                &self.strategies,
                &set.features,
                &set.labels,
            ) {
                Ok((model, strategy)) => {
                    debug!(%symbol, samples = set.len(), %strategy, model = model.name(), "model trained");
                    store.set_model(Some(model));
                    report.trained += 1;
                }
                Err(e) => {
                    warn!(%symbol, samples = set.len(), error = %e, "all fit strategies failed");
                    store.set_model(None);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Once per ISO week: retrain and emit `Up` signals above the threshold.
    ///
    /// Returns nothing if this week already produced signals or no bars
    /// arrived today. An empty prediction set does not consume the week, so
    /// the next call in the same week tries again.
    pub fn update(&mut self, today: NaiveDate, bar_count: usize) -> Vec<Signal> {
        let week = today.iso_week();
        if self.week == Some(week) || bar_count == 0 {
            return Vec::new();
        }

        self.train();

        let threshold = self.config.model.up_threshold;
        let expiry = self.config.signal_expiry_days;
        let mut signals = Vec::new();

        for (symbol, store) in &self.stores {
            if !store.is_ready() {
                continue;
            }
            let (Some(model), Some((_, row))) = (store.model(), store.latest_features()) else {
                continue;
            };
            if model.n_features_in() != row.len() {
                debug!(
                    %symbol,
                    expected = model.n_features_in(),
                    found = row.len(),
                    "feature width changed since training, skipping"
                );
                continue;
            }

            let p_up = match model.probability_of(row, UP_CLASS) {
                Ok(p) if p.is_finite() => p,
                Ok(_) => 0.0,
                Err(e) => {
                    warn!(%symbol, error = %e, "prediction failed, treating as neutral");
                    0.0
                }
            };
            if p_up > threshold {
                signals.push(Signal::up(symbol.clone(), today, p_up, expiry, model.name()));
            }
        }

        if signals.is_empty() {
            debug!(%today, "no security above threshold, will retry");
            return signals;
        }
        self.week = Some(week);
        info!(%today, count = signals.len(), "emitted weekly signals");
        signals
    }
}
