//! SignalLab Runner: replay orchestration around `signallab-core`.
//!
//! This crate builds on `signallab-core` to provide:
//! - Run configuration (TOML) with a dated universe schedule
//! - Bar loading from CSV with a deterministic synthetic fallback
//! - In-memory history for sample store warm-up
//! - Weekly replay driver with signal expiry and explicit exits
//! - Artifact export (manifest, rebalance CSV, signal JSON)

pub mod config;
pub mod data_loader;
pub mod export;
pub mod history;
pub mod replay;
pub mod signal_book;

pub use config::{ConfigError, PortfolioConfig, RunConfig, RunSection, UniverseEntry};
pub use data_loader::{load_bars, DataSource, LoadError, LoadOptions, LoadedData};
pub use export::{save_artifacts, ArtifactPaths, ExportError, RunManifest};
pub use history::InMemoryHistory;
pub use replay::{replay_loaded, run_replay, Rebalance, ReplayResult, RunError, TargetWeight};
pub use signal_book::SignalBook;
