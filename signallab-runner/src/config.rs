//! Run configuration: replay window, data source, portfolio and universe schedule.
//!
//! ```toml
//! [run]
//! start = "2020-01-02"
//! end = "2023-12-29"
//! data_dir = "data"
//! synthetic = false
//! output_dir = "results"
//!
//! [portfolio]
//! initial_cash = 100000.0
//!
//! [strategy.model]
//! up_threshold = 0.55
//!
//! [[universe]]
//! effective = "2020-01-02"
//! symbols = ["SPY", "QQQ"]
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use signallab_core::domain::{ConfigHash, SecurityId};
use signallab_core::StrategyConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("strategy: {0}")]
    Strategy(#[from] signallab_core::ConfigError),
    #[error("invalid run config: {0}")]
    Invalid(String),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Complete configuration of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run: RunSection,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub universe: Vec<UniverseEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    /// First replayed day (inclusive).
    pub start: NaiveDate,
    /// Last replayed day (inclusive).
    pub end: NaiveDate,
    /// Directory holding `{SYMBOL}.csv` files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Generate synthetic bars for symbols without a CSV file.
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Paper portfolio the cash-fraction cap is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub initial_cash: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
        }
    }
}

/// Tradable universe from `effective` until the next entry takes over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub effective: NaiveDate,
    pub symbols: Vec<SecurityId>,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.end < self.run.start {
            return Err(ConfigError::Invalid(format!(
                "end {} is before start {}",
                self.run.end, self.run.start
            )));
        }
        if !(self.portfolio.initial_cash.is_finite() && self.portfolio.initial_cash > 0.0) {
            return Err(ConfigError::Invalid(
                "portfolio.initial_cash must be positive".into(),
            ));
        }
        if self.universe.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[universe]] entry is required".into(),
            ));
        }
        for pair in self.universe.windows(2) {
            if pair[1].effective <= pair[0].effective {
                return Err(ConfigError::Invalid(format!(
                    "universe entries must have increasing effective dates ({} after {})",
                    pair[1].effective, pair[0].effective
                )));
            }
        }
        self.strategy.validate()?;
        Ok(())
    }

    /// Every symbol that appears anywhere in the schedule, sorted.
    pub fn all_symbols(&self) -> Vec<SecurityId> {
        self.universe
            .iter()
            .flat_map(|entry| entry.symbols.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// BLAKE3 over the canonical JSON; identical configs share a fingerprint.
    pub fn fingerprint(&self) -> Result<ConfigHash, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(ConfigHash::from_bytes(&json))
    }

    /// Starter config written by `init-config`.
    pub fn template() -> Self {
        let start = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap_or(NaiveDate::MIN);
        Self {
            run: RunSection {
                start,
                end,
                data_dir: default_data_dir(),
                synthetic: true,
                output_dir: default_output_dir(),
            },
            portfolio: PortfolioConfig::default(),
            strategy: StrategyConfig::default(),
            universe: vec![UniverseEntry {
                effective: start,
                symbols: ["SPY", "QQQ", "IWM", "TLT", "GLD"]
                    .into_iter()
                    .map(SecurityId::from)
                    .collect(),
            }],
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("failed to render TOML: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signallab_core::CapPolicy;

    const SAMPLE: &str = r#"
[run]
start = "2021-01-04"
end = "2021-12-31"
synthetic = true

[portfolio]
initial_cash = 50000.0

[strategy]
signal_expiry_days = 21

[strategy.allocation]
min_weight = 0.05
cap = { type = "FIXED", max_weight = 0.3 }

[[universe]]
effective = "2021-01-04"
symbols = ["SPY", "QQQ"]

[[universe]]
effective = "2021-07-01"
symbols = ["QQQ", "IWM"]
"#;

    #[test]
    fn parses_full_config() {
        let config = RunConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.run.start, NaiveDate::from_ymd_opt(2021, 1, 4).unwrap());
        assert_eq!(config.run.data_dir, PathBuf::from("data"));
        assert!(config.run.synthetic);
        assert_eq!(config.portfolio.initial_cash, 50_000.0);
        assert_eq!(config.strategy.signal_expiry_days, 21);
        assert_eq!(
            config.strategy.allocation.cap,
            CapPolicy::Fixed { max_weight: 0.3 }
        );
        assert_eq!(config.strategy.sampling.num_samples, 100);
        assert_eq!(config.universe.len(), 2);
    }

    #[test]
    fn all_symbols_is_sorted_union() {
        let config = RunConfig::from_toml(SAMPLE).unwrap();
        let symbols = config.all_symbols();
        let names: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["IWM", "QQQ", "SPY"]);
    }

    #[test]
    fn rejects_reversed_dates() {
        let toml = SAMPLE.replace("end = \"2021-12-31\"", "end = \"2020-12-31\"");
        let err = RunConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("before start"));
    }

    #[test]
    fn rejects_unordered_universe() {
        let toml = SAMPLE.replace("2021-07-01", "2020-07-01");
        assert!(matches!(
            RunConfig::from_toml(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_missing_universe() {
        let toml = "[run]\nstart = \"2021-01-04\"\nend = \"2021-12-31\"\n";
        assert!(RunConfig::from_toml(toml).is_err());
    }

    #[test]
    fn strategy_errors_surface() {
        let toml = SAMPLE.replace("signal_expiry_days = 21", "signal_expiry_days = 0");
        assert!(matches!(
            RunConfig::from_toml(&toml),
            Err(ConfigError::Strategy(_))
        ));
    }

    #[test]
    fn template_round_trips_through_toml() {
        let template = RunConfig::template();
        let rendered = template.to_toml().unwrap();
        let parsed = RunConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed, template);
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = RunConfig::from_toml(SAMPLE).unwrap();
        let mut b = a.clone();
        b.strategy.model.up_threshold = 0.6;
        assert_eq!(a.fingerprint().unwrap(), a.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }
}
