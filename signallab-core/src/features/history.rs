//! History collaborator used to seed sample stores.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{DailyBar, SecurityId};

/// Errors from a history source.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no history for '{symbol}'")]
    NoHistory { symbol: SecurityId },

    #[error("history for '{symbol}' is malformed at {date}: {reason}")]
    Malformed {
        symbol: SecurityId,
        date: NaiveDate,
        reason: String,
    },

    #[error("history source error: {0}")]
    Source(String),
}

/// Supplies bulk daily history for warm-up.
pub trait HistoryProvider: Send + Sync {
    /// Up to `count` most recent daily bars strictly before `as_of`, oldest first.
    ///
    /// An empty vector means "insufficient history" and is not an error.
    fn history(
        &self,
        symbol: &SecurityId,
        as_of: NaiveDate,
        count: usize,
    ) -> Result<Vec<DailyBar>, HistoryError>;
}

/// Check that a history batch is replayable: sane bars, single symbol, strictly increasing days.
pub fn validate_history(symbol: &SecurityId, bars: &[DailyBar]) -> Result<(), HistoryError> {
    let mut previous: Option<NaiveDate> = None;
    for bar in bars {
        let malformed = |reason: &str| HistoryError::Malformed {
            symbol: symbol.clone(),
            date: bar.date,
            reason: reason.to_string(),
        };
        if &bar.symbol != symbol {
            return Err(malformed("bar belongs to another security"));
        }
        if !bar.is_sane() {
            return Err(malformed("bar failed sanity check"));
        }
        if previous.is_some_and(|p| bar.date <= p) {
            return Err(malformed("days are not strictly increasing"));
        }
        previous = Some(bar.date);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, open: f64) -> DailyBar {
        DailyBar::from_open_close(
            "AAPL",
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open,
            open * 1.01,
        )
    }

    #[test]
    fn accepts_ordered_sane_history() {
        let id = SecurityId::from("AAPL");
        assert!(validate_history(&id, &[bar(2, 100.0), bar(3, 101.0)]).is_ok());
        assert!(validate_history(&id, &[]).is_ok());
    }

    #[test]
    fn rejects_duplicate_days() {
        let id = SecurityId::from("AAPL");
        let err = validate_history(&id, &[bar(2, 100.0), bar(2, 101.0)]).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn rejects_broken_prices() {
        let id = SecurityId::from("AAPL");
        let mut broken = bar(3, 100.0);
        broken.close = f64::NAN;
        assert!(validate_history(&id, &[bar(2, 100.0), broken]).is_err());
    }

    #[test]
    fn rejects_foreign_symbol() {
        let id = SecurityId::from("MSFT");
        assert!(validate_history(&id, &[bar(2, 100.0)]).is_err());
    }
}
