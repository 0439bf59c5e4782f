//! Strategy configuration: sampling windows, model fitting, allocation bounds.
//!
//! Loaded from the `[strategy]` table of a run config (or a standalone TOML
//! file). Every section has defaults matching the reference deployment, so an
//! empty table is a valid config.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocation::CapPolicy;
use crate::classifier::FitStrategy;
use crate::domain::ConfigHash;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("parse strategy TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize strategy config: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Window sizes for one security's sample store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleParams {
    /// Lagged open→close returns per feature row.
    pub num_days_per_sample: usize,
    /// Labelled rows kept for training.
    pub num_samples: usize,
    /// Calendar days between a purchase open and the open that labels it.
    pub holding_period_days: u32,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            num_days_per_sample: 4,
            num_samples: 100,
            holding_period_days: 30,
        }
    }
}

impl SampleParams {
    /// Feature table capacity; a store is ready exactly when it holds this many rows.
    pub fn feature_capacity(&self) -> usize {
        self.num_samples + self.holding_period_days as usize + 2
    }

    pub fn label_capacity(&self) -> usize {
        self.num_samples
    }

    pub fn ledger_capacity(&self) -> usize {
        self.holding_period_days as usize
    }

    /// Bars requested from history when seeding a store.
    pub fn lookback_days(&self) -> usize {
        self.num_days_per_sample + self.num_samples + self.holding_period_days as usize + 1
    }
}

/// Classifier fitting and prediction thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// A security is signalled only when P(up) is strictly above this.
    pub up_threshold: f64,
    /// Cross-validation folds tried first for calibration.
    pub preferred_folds: usize,
    /// Smallest fold count tried before falling back to a plain fit.
    pub min_folds: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            up_threshold: 0.55,
            preferred_folds: 3,
            min_folds: 2,
        }
    }
}

impl ModelParams {
    /// Ordered fitting strategies: calibrated from `preferred_folds` down to
    /// `min_folds`, then the terminal plain fit.
    pub fn fit_strategies(&self) -> Vec<FitStrategy> {
        (self.min_folds..=self.preferred_folds)
            .rev()
            .map(|folds| FitStrategy::Calibrated { folds })
            .chain(std::iter::once(FitStrategy::Plain))
            .collect()
    }
}

/// Per-position weight bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationParams {
    pub min_weight: f64,
    pub cap: CapPolicy,
}

impl Default for AllocationParams {
    fn default() -> Self {
        Self {
            min_weight: 0.03,
            cap: CapPolicy::CashFraction {
                max_cash_fraction: 0.25,
            },
        }
    }
}

/// Complete strategy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub sampling: SampleParams,
    pub model: ModelParams,
    pub allocation: AllocationParams,
    /// Calendar days a signal stays active after emission.
    pub signal_expiry_days: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            sampling: SampleParams::default(),
            model: ModelParams::default(),
            allocation: AllocationParams::default(),
            signal_expiry_days: 30,
        }
    }
}

impl StrategyConfig {
    /// Parse and validate a strategy config from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sampling;
        if s.num_days_per_sample == 0 {
            return Err(invalid("sampling.num_days_per_sample", "must be >= 1"));
        }
        if s.num_samples == 0 {
            return Err(invalid("sampling.num_samples", "must be >= 1"));
        }
        if s.holding_period_days == 0 {
            return Err(invalid("sampling.holding_period_days", "must be >= 1"));
        }

        let m = &self.model;
        if !(0.0..1.0).contains(&m.up_threshold) {
            return Err(invalid(
                "model.up_threshold",
                format!("must be in [0, 1), got {}", m.up_threshold),
            ));
        }
        if m.min_folds < 2 {
            return Err(invalid("model.min_folds", "must be >= 2"));
        }
        if m.preferred_folds < m.min_folds {
            return Err(invalid(
                "model.preferred_folds",
                format!("must be >= min_folds ({})", m.min_folds),
            ));
        }

        let a = &self.allocation;
        if !(0.0..=1.0).contains(&a.min_weight) {
            return Err(invalid(
                "allocation.min_weight",
                format!("must be in [0, 1], got {}", a.min_weight),
            ));
        }
        match a.cap {
            CapPolicy::Fixed { max_weight } if !(max_weight >= 0.0) => {
                return Err(invalid("allocation.cap.max_weight", "must be >= 0"));
            }
            CapPolicy::CashFraction { max_cash_fraction } if !(max_cash_fraction >= 0.0) => {
                return Err(invalid("allocation.cap.max_cash_fraction", "must be >= 0"));
            }
            _ => {}
        }

        if self.signal_expiry_days == 0 {
            return Err(invalid("signal_expiry_days", "must be >= 1"));
        }
        Ok(())
    }

    /// BLAKE3 over the canonical JSON of the full config.
    pub fn fingerprint(&self) -> Result<ConfigHash, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(ConfigHash::from_bytes(&json))
    }
}
