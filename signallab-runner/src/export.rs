//! Artifact export: rebalance CSV, signal JSON and the run manifest.
//!
//! All persisted JSON includes a `schema_version` field. Unknown versions
//! are rejected on load.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use signallab_core::domain::{ConfigHash, SecurityId, Signal};

use crate::data_loader::DataSource;
use crate::replay::{Rebalance, ReplayResult, SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to flush csv writer: {0}")]
    Flush(String),
    #[error("csv output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("unsupported schema version {found} (max supported: {max})")]
    Schema { found: u32, max: u32 },
}

/// Summary written next to the detailed artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub config_hash: ConfigHash,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub sources: BTreeMap<SecurityId, DataSource>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub trading_days: usize,
    pub signal_count: usize,
    pub rebalance_count: usize,
    pub initial_value: f64,
    pub final_value: f64,
}

impl RunManifest {
    pub fn from_result(result: &ReplayResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            config_hash: result.config_hash.clone(),
            dataset_hash: result.dataset_hash.clone(),
            has_synthetic: result.has_synthetic,
            sources: result.sources.clone(),
            start: result.start,
            end: result.end,
            trading_days: result.trading_days,
            signal_count: result.signals.len(),
            rebalance_count: result.rebalances.len(),
            initial_value: result.initial_value,
            final_value: result.final_value,
        }
    }
}

/// Paths of the artifacts written for one run.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub run_dir: PathBuf,
    pub manifest: PathBuf,
    pub rebalances_csv: PathBuf,
    pub signals_json: PathBuf,
}

/// One row per target: `date,symbol,weight,p_up`. Exits have weight 0 and an empty `p_up`.
pub fn export_rebalances_csv(rebalances: &[Rebalance]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "symbol", "weight", "p_up"])?;
    for rebalance in rebalances {
        for target in &rebalance.targets {
            wtr.write_record([
                rebalance.date.to_string(),
                target.symbol.to_string(),
                format!("{:.6}", target.weight),
                target.p_up.map(|p| format!("{p:.6}")).unwrap_or_default(),
            ])?;
        }
    }
    let data = wtr
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(data)?)
}

pub fn export_signals_json(signals: &[Signal]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(signals)?)
}

/// Serialize the full result, including every signal and rebalance.
pub fn export_result_json(result: &ReplayResult) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// Deserialize a result, rejecting schema versions newer than this build.
pub fn import_result_json(json: &str) -> Result<ReplayResult, ExportError> {
    let result: ReplayResult = serde_json::from_str(json)?;
    if result.schema_version > SCHEMA_VERSION {
        return Err(ExportError::Schema {
            found: result.schema_version,
            max: SCHEMA_VERSION,
        });
    }
    Ok(result)
}

/// Write the artifact set under `{output_dir}/{config_hash prefix}_{timestamp}/`.
///
/// - `manifest.json`: run summary
/// - `rebalances.csv`: target weights per rebalance
/// - `signals.json`: every emitted signal
pub fn save_artifacts(result: &ReplayResult, output_dir: &Path) -> Result<ArtifactPaths, ExportError> {
    let prefix: String = result.config_hash.0.chars().take(12).collect();
    let dirname = format!(
        "{prefix}_{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir).map_err(|source| ExportError::Io {
        path: run_dir.clone(),
        source,
    })?;

    let manifest = run_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&RunManifest::from_result(result))?;
    write_file(&manifest, &json)?;

    let rebalances_csv = run_dir.join("rebalances.csv");
    write_file(&rebalances_csv, &export_rebalances_csv(&result.rebalances)?)?;

    let signals_json = run_dir.join("signals.json");
    write_file(&signals_json, &export_signals_json(&result.signals)?)?;

    Ok(ArtifactPaths {
        run_dir,
        manifest,
        rebalances_csv,
        signals_json,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    std::fs::write(path, contents).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
