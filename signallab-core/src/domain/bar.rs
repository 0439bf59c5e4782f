//! One completed trading day for one security.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::SecurityId;

/// Daily OHLCV bar for a single security.
///
/// Only `open` and `close` feed the sample windows; the other fields are kept
/// so the sanity check can reject obviously broken rows before they reach a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub symbol: SecurityId,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl DailyBar {
    /// Bar with high/low derived from open and close.
    pub fn from_open_close(
        symbol: impl Into<SecurityId>,
        date: NaiveDate,
        open: f64,
        close: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 0,
        }
    }

    /// Returns true if any price field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic sanity check: finite positive prices, high >= low, high/low bracket open/close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.open.is_finite()
            && self.close.is_finite()
            && self.open > 0.0
            && self.close > 0.0
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}
