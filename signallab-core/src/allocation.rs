//! Weight allocation: active `Up` signals to clamped, de-leveraged target weights.
//!
//! Scores are normalized to sum to one, clamped per position to
//! `[min_weight, max_weight]` and, if the clamped total exceeds one, scaled
//! down uniformly. The ceiling is applied after the floor, so it wins when the
//! two bounds cross.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::AllocationParams;
use crate::domain::{SecurityId, Signal, SignalDirection};

/// Per-position ceiling policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapPolicy {
    /// Fixed fraction of total portfolio value.
    Fixed { max_weight: f64 },
    /// `max_cash_fraction × cash / total_value`, shrinking as cash is deployed.
    CashFraction { max_cash_fraction: f64 },
}

impl CapPolicy {
    /// Ceiling for the given portfolio state. Never negative.
    pub fn max_weight(&self, portfolio: &PortfolioSnapshot) -> f64 {
        match *self {
            Self::Fixed { max_weight } => max_weight.max(0.0),
            Self::CashFraction { max_cash_fraction } => {
                if portfolio.total_value > 0.0 {
                    (max_cash_fraction * portfolio.cash / portfolio.total_value).max(0.0)
                } else {
                    0.0
                }
            }
        }
    }
}

/// Portfolio values the cap policy needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub total_value: f64,
    pub cash: f64,
}

impl PortfolioSnapshot {
    /// Fully in cash.
    pub fn all_cash(value: f64) -> Self {
        Self {
            total_value: value,
            cash: value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightAllocator {
    min_weight: f64,
    cap: CapPolicy,
}

impl WeightAllocator {
    pub fn new(min_weight: f64, cap: CapPolicy) -> Self {
        Self { min_weight, cap }
    }

    pub fn from_params(params: &AllocationParams) -> Self {
        Self::new(params.min_weight, params.cap)
    }

    pub fn min_weight(&self) -> f64 {
        self.min_weight
    }

    pub fn cap(&self) -> CapPolicy {
        self.cap
    }

    /// Target weights for `signals` under the current portfolio state.
    pub fn target_weights(
        &self,
        signals: &[Signal],
        portfolio: &PortfolioSnapshot,
    ) -> BTreeMap<SecurityId, f64> {
        allocate(signals, self.min_weight, self.cap.max_weight(portfolio))
    }
}

/// Convert signals into per-security weights.
///
/// Only `Up` signals count. When a security has several, the latest
/// `generated_on` wins, and among equal days the one appearing last in
/// `signals`. An empty input yields an empty map.
pub fn allocate(
    signals: &[Signal],
    min_weight: f64,
    max_weight: f64,
) -> BTreeMap<SecurityId, f64> {
    let mut latest: BTreeMap<&SecurityId, &Signal> = BTreeMap::new();
    for signal in signals
        .iter()
        .filter(|s| s.direction == SignalDirection::Up)
    {
        match latest.get(&signal.symbol) {
            Some(kept) if kept.generated_on > signal.generated_on => {}
            _ => {
                latest.insert(&signal.symbol, signal);
            }
        }
    }
    if latest.is_empty() {
        return BTreeMap::new();
    }

    let n = latest.len() as f64;
    let total: f64 = latest.values().map(|s| s.raw_score()).sum();
    let degenerate = !(total.is_finite() && total > 0.0);

    let mut weights: BTreeMap<SecurityId, f64> = latest
        .into_iter()
        .map(|(symbol, signal)| {
            let normalized = if degenerate {
                1.0 / n
            } else {
                signal.raw_score() / total
            };
            (symbol.clone(), normalized.max(min_weight).min(max_weight))
        })
        .collect();

    let clamped_total: f64 = weights.values().sum();
    if clamped_total > 1.0 {
        for w in weights.values_mut() {
            *w /= clamped_total;
        }
    }
    weights
}
