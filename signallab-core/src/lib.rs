//! SignalLab Core: per-security sample windows, classifiers, signals and weights.
//!
//! This crate contains the decision core of the strategy:
//! - Domain types (daily bars, security ids, signals)
//! - Rolling feature/label sample store with delayed label assignment
//! - Classifier capability (Gaussian naive Bayes, sigmoid calibration)
//! - Weekly signal model owning one sample store per security
//! - Weight allocator with floor/ceiling clamping and de-leveraging
//!
//! Nothing here performs I/O. History arrives through [`features::HistoryProvider`].

pub mod allocation;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod features;
pub mod signal_model;

pub use allocation::{allocate, CapPolicy, PortfolioSnapshot, WeightAllocator};
pub use config::{ConfigError, StrategyConfig};
pub use signal_model::{SignalModel, TrainingReport};
