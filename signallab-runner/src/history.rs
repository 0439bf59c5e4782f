//! In-memory history collaborator backed by loaded bars.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use signallab_core::domain::{DailyBar, SecurityId};
use signallab_core::features::{HistoryError, HistoryProvider};

/// Serves warm-up history from bars already held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistory {
    bars: BTreeMap<SecurityId, Vec<DailyBar>>,
}

impl InMemoryHistory {
    /// `bars` must be oldest first per symbol.
    pub fn new(bars: BTreeMap<SecurityId, Vec<DailyBar>>) -> Self {
        Self { bars }
    }

    pub fn bars(&self, symbol: &SecurityId) -> Option<&[DailyBar]> {
        self.bars.get(symbol).map(Vec::as_slice)
    }
}

impl HistoryProvider for InMemoryHistory {
    fn history(
        &self,
        symbol: &SecurityId,
        as_of: NaiveDate,
        count: usize,
    ) -> Result<Vec<DailyBar>, HistoryError> {
        let bars = self
            .bars
            .get(symbol)
            .ok_or_else(|| HistoryError::NoHistory {
                symbol: symbol.clone(),
            })?;
        let end = bars.partition_point(|b| b.date < as_of);
        let start = end.saturating_sub(count);
        Ok(bars[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i)
    }

    fn provider() -> InMemoryHistory {
        let bars = (0..10)
            .map(|i| DailyBar::from_open_close("SPY", day(i), 100.0, 101.0))
            .collect();
        InMemoryHistory::new(BTreeMap::from([(SecurityId::from("SPY"), bars)]))
    }

    #[test]
    fn returns_most_recent_bars_before_as_of() {
        let bars = provider().history(&"SPY".into(), day(6), 3).unwrap();
        let days: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
        assert_eq!(days, vec![day(3), day(4), day(5)]);
    }

    #[test]
    fn short_history_returns_what_exists() {
        let bars = provider().history(&"SPY".into(), day(2), 50).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(provider().history(&"SPY".into(), day(0), 5).unwrap().is_empty());
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let err = provider().history(&"QQQ".into(), day(5), 3).unwrap_err();
        assert!(matches!(err, HistoryError::NoHistory { .. }));
    }
}
