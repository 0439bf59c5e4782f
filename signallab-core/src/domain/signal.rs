//! Directional, confidence-weighted signals emitted by the signal model.
//!
//! A signal describes a conviction about one security, never a portfolio
//! decision. The allocator turns a set of active signals into target weights.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::SecurityId;

/// Directional intent of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    Up,
    Down,
    Flat,
}

/// An immutable directional signal for one security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: SecurityId,
    pub generated_on: NaiveDate,
    pub direction: SignalDirection,
    /// Suggested relative weight. Non-positive or missing falls back to `confidence`.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Confidence in [0, 1].
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Last day (inclusive) the signal is active.
    pub expires_on: NaiveDate,
    /// Name of the model that produced the signal.
    #[serde(default)]
    pub source: String,
}

impl Signal {
    /// Long signal scored by the up-class probability.
    pub fn up(
        symbol: SecurityId,
        generated_on: NaiveDate,
        p_up: f64,
        expiry_days: u32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol,
            generated_on,
            direction: SignalDirection::Up,
            weight: Some(p_up),
            confidence: Some(p_up),
            expires_on: generated_on + chrono::Duration::days(i64::from(expiry_days)),
            source: source.into(),
        }
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.generated_on <= day && day <= self.expires_on
    }

    /// Raw sizing score: weight if positive, else confidence if positive, else 1.0.
    pub fn raw_score(&self) -> f64 {
        match (self.weight, self.confidence) {
            (Some(w), _) if w > 0.0 => w,
            (_, Some(c)) if c > 0.0 => c,
            _ => 1.0,
        }
    }
}
