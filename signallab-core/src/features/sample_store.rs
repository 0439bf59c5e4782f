//! Per-security sample store: lagged-return features with delayed labels.
//!
//! Each completed daily bar pushes its open→close return into a newest-first
//! window. Once the window is full, every bar records a feature row keyed by
//! its day. Labels are resolved separately: the opening price of each recorded
//! day goes into a short ledger, and when a bar arrives at least
//! `holding_period_days` calendar days later, the sign of the open→open return
//! becomes the label of the most recent qualifying ledger day.
//!
//! Features and labels live in independent day-keyed tables and are only
//! joined (by day intersection) when a training set is requested.

use chrono::NaiveDate;
use std::collections::VecDeque;
use tracing::{debug, warn};

use super::day_table::DayTable;
use super::history::{validate_history, HistoryProvider};
use crate::classifier::Model;
use crate::config::SampleParams;
use crate::domain::{DailyBar, SecurityId};

/// What a single bar did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarOutcome {
    /// Day not strictly after the last processed day; ignored.
    Duplicate,
    /// Prices failed the sanity check; ignored.
    Rejected,
    /// Return recorded but the sample window is not full yet.
    Accumulating,
    /// Feature row recorded; `labeled` names the purchase day that received a label.
    Recorded { labeled: Option<NaiveDate> },
}

/// Result of seeding a store from bulk history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmUpOutcome {
    /// History replayed; `ready` reports whether the feature table reached capacity.
    Replayed { bars: usize, ready: bool },
    /// No usable history; the store was left empty.
    Skipped,
}

/// Aligned training data: rows and labels share the same days, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub days: Vec<NaiveDate>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<i8>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug)]
pub struct SampleStore {
    symbol: SecurityId,
    params: SampleParams,
    /// Newest-first lagged open→close returns.
    roc_window: VecDeque<f64>,
    features: DayTable<Vec<f64>>,
    labels: DayTable<i8>,
    pending_opens: DayTable<f64>,
    last_day: Option<NaiveDate>,
    model: Option<Box<dyn Model>>,
}

impl SampleStore {
    pub fn new(symbol: SecurityId, params: SampleParams) -> Self {
        Self {
            symbol,
            params,
            roc_window: VecDeque::with_capacity(params.num_days_per_sample + 1),
            features: DayTable::new(params.feature_capacity()),
            labels: DayTable::new(params.label_capacity()),
            pending_opens: DayTable::new(params.ledger_capacity()),
            last_day: None,
            model: None,
        }
    }

    pub fn symbol(&self) -> &SecurityId {
        &self.symbol
    }

    pub fn params(&self) -> &SampleParams {
        &self.params
    }

    /// Number of bars the history collaborator should supply for warm-up.
    pub fn lookback_days(&self) -> usize {
        self.params.lookback_days()
    }

    /// Newest-first lagged returns.
    pub fn roc_window(&self) -> &VecDeque<f64> {
        &self.roc_window
    }

    pub fn features(&self) -> &DayTable<Vec<f64>> {
        &self.features
    }

    pub fn labels(&self) -> &DayTable<i8> {
        &self.labels
    }

    pub fn pending_opens(&self) -> &DayTable<f64> {
        &self.pending_opens
    }

    /// Ready exactly when the feature table holds its fixed capacity.
    pub fn is_ready(&self) -> bool {
        self.features.len() == self.params.feature_capacity()
    }

    /// Width of a feature row.
    pub fn feature_width(&self) -> usize {
        self.params.num_days_per_sample
    }

    /// Most recent feature row.
    pub fn latest_features(&self) -> Option<(NaiveDate, &[f64])> {
        self.features.last().map(|(d, row)| (d, row.as_slice()))
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    /// Replace the model wholesale (or clear it with `None`).
    pub fn set_model(&mut self, model: Option<Box<dyn Model>>) {
        self.model = model;
    }

    /// Process one completed daily bar.
    pub fn on_bar(&mut self, day: NaiveDate, open: f64, close: f64) -> BarOutcome {
        if self.last_day.is_some_and(|last| day <= last) {
            debug!(symbol = %self.symbol, %day, "ignoring duplicate or out-of-order bar");
            return BarOutcome::Duplicate;
        }
        if !(open.is_finite() && close.is_finite() && open > 0.0) {
            debug!(symbol = %self.symbol, %day, open, close, "ignoring bar with unusable prices");
            return BarOutcome::Rejected;
        }
        self.last_day = Some(day);

        let open_close_return = (close - open) / open;
        self.roc_window.push_front(open_close_return);
        self.roc_window.truncate(self.params.num_days_per_sample);
        if self.roc_window.len() < self.params.num_days_per_sample {
            return BarOutcome::Accumulating;
        }

        self.features
            .insert(day, self.roc_window.iter().copied().collect());
        // Labels and ledger days never outlive the feature rows they describe.
        if let Some(oldest) = self.features.first_day() {
            self.labels.retain_from(oldest);
            self.pending_opens.retain_from(oldest);
        }

        let labeled = self.resolve_label(day, open);

        self.pending_opens.insert(day, open);
        BarOutcome::Recorded { labeled }
    }

    /// Convenience wrapper over [`SampleStore::on_bar`] for a full bar.
    pub fn on_daily_bar(&mut self, bar: &DailyBar) -> BarOutcome {
        self.on_bar(bar.date, bar.open, bar.close)
    }

    /// Label the most recent ledger day at least `holding_period_days` before `day`.
    fn resolve_label(&mut self, day: NaiveDate, open_today: f64) -> Option<NaiveDate> {
        let cutoff = day - chrono::Duration::days(i64::from(self.params.holding_period_days));
        let (open_day, open_then) = self
            .pending_opens
            .latest_at_or_before(cutoff)
            .map(|(d, o)| (d, *o))?;

        let open_open_return = (open_today - open_then) / open_then;
        self.labels.insert(open_day, sign(open_open_return));
        Some(open_day)
    }

    /// Join features and labels on their common days.
    ///
    /// Returns `None` when either side is empty or no day is shared.
    pub fn training_set(&self) -> Option<TrainingSet> {
        if self.features.is_empty() || self.labels.is_empty() {
            return None;
        }
        let mut set = TrainingSet {
            days: Vec::with_capacity(self.labels.len()),
            features: Vec::with_capacity(self.labels.len()),
            labels: Vec::with_capacity(self.labels.len()),
        };
        for (day, label) in self.labels.iter() {
            if let Some(row) = self.features.get(&day) {
                set.days.push(day);
                set.features.push(row.clone());
                set.labels.push(*label);
            }
        }
        if set.is_empty() {
            None
        } else {
            Some(set)
        }
    }

    /// Replay bulk history through the live update path.
    ///
    /// The replay runs against a scratch store and is swapped in only when the
    /// whole batch validates, so a bad batch never leaves partial state behind.
    pub fn warm_up(&mut self, history: &[DailyBar]) -> WarmUpOutcome {
        self.clear();
        if history.is_empty() {
            warn!(symbol = %self.symbol, "not enough history yet");
            return WarmUpOutcome::Skipped;
        }
        if let Err(e) = validate_history(&self.symbol, history) {
            warn!(symbol = %self.symbol, error = %e, "discarding malformed history");
            return WarmUpOutcome::Skipped;
        }

        let mut scratch = SampleStore::new(self.symbol.clone(), self.params);
        for bar in history {
            scratch.on_daily_bar(bar);
        }
        let ready = scratch.is_ready();
        debug!(
            symbol = %self.symbol,
            bars = history.len(),
            features = scratch.features.len(),
            labels = scratch.labels.len(),
            ready,
            "warm-up replayed"
        );
        *self = scratch;
        WarmUpOutcome::Replayed {
            bars: history.len(),
            ready,
        }
    }

    /// Fetch `lookback_days` bars before `as_of` and replay them.
    pub fn warm_up_from(
        &mut self,
        provider: &dyn HistoryProvider,
        as_of: NaiveDate,
    ) -> WarmUpOutcome {
        match provider.history(&self.symbol, as_of, self.lookback_days()) {
            Ok(history) => self.warm_up(&history),
            Err(e) => {
                self.clear();
                warn!(symbol = %self.symbol, error = %e, "history request failed");
                WarmUpOutcome::Skipped
            }
        }
    }

    /// Drop all state and re-seed from history.
    pub fn reset(&mut self, provider: &dyn HistoryProvider, as_of: NaiveDate) -> WarmUpOutcome {
        self.warm_up_from(provider, as_of)
    }

    fn clear(&mut self) {
        self.roc_window.clear();
        self.features.clear();
        self.labels.clear();
        self.pending_opens.clear();
        self.last_day = None;
        self.model = None;
    }
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}
