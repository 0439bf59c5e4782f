//! Active signal bookkeeping between weekly emissions.

use chrono::NaiveDate;

use signallab_core::domain::{SecurityId, Signal};

/// Signals in emission order, kept until they expire.
#[derive(Debug, Default, Clone)]
pub struct SignalBook {
    signals: Vec<Signal>,
}

impl SignalBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn extend(&mut self, signals: impl IntoIterator<Item = Signal>) {
        self.signals.extend(signals);
    }

    /// Signals active on `day`, oldest emission first.
    pub fn active_on(&self, day: NaiveDate) -> Vec<Signal> {
        self.signals
            .iter()
            .filter(|s| s.is_active_on(day))
            .cloned()
            .collect()
    }

    /// Most recent active signal for `symbol`.
    pub fn latest_for(&self, symbol: &SecurityId, day: NaiveDate) -> Option<&Signal> {
        self.signals
            .iter()
            .rev()
            .find(|s| &s.symbol == symbol && s.is_active_on(day))
    }

    /// Drop signals that expired before `day`. Returns how many were dropped.
    pub fn prune(&mut self, day: NaiveDate) -> usize {
        let before = self.signals.len();
        self.signals.retain(|s| s.expires_on >= day);
        before - self.signals.len()
    }
}
