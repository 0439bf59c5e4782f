//! Bar loading for the replay driver.
//!
//! Each symbol is read from `{data_dir}/{SYMBOL}.csv` with the header
//! `date,open,high,low,close,volume`. Files are parsed in parallel; the
//! fallback policy per symbol is:
//! 1. If the CSV exists → use it
//! 2. If not and `synthetic` is set → generate synthetic bars (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! Synthetic data is a developer-only mode. Runs that used it are tagged in
//! their manifest.

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use signallab_core::domain::{DailyBar, SecurityId};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no data file for '{symbol}' at {} (enable synthetic data to generate bars)", .path.display())]
    NoData { symbol: SecurityId, path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("no bars for '{symbol}' between {start} and {end}")]
    Empty {
        symbol: SecurityId,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// Where a symbol's bars came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Csv,
    Synthetic,
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub data_dir: PathBuf,
    /// First day to keep (inclusive). Usually before the replay start so warm-up has history.
    pub start: NaiveDate,
    /// Last day to keep (inclusive).
    pub end: NaiveDate,
    /// Generate synthetic bars for symbols without a CSV file.
    pub synthetic: bool,
}

/// Result of loading bars, including data source provenance.
#[derive(Debug)]
pub struct LoadedData {
    /// Oldest-first bars per symbol, strictly increasing days.
    pub bars: BTreeMap<SecurityId, Vec<DailyBar>>,
    pub sources: BTreeMap<SecurityId, DataSource>,
    /// BLAKE3 over all loaded bars, in symbol order.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

impl LoadedData {
    pub fn bar_count(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Load bars for `symbols`, in parallel, applying the CSV → synthetic → error policy.
pub fn load_bars(symbols: &[SecurityId], opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let loaded: Vec<(SecurityId, Vec<DailyBar>, DataSource)> = symbols
        .par_iter()
        .map(|symbol| load_symbol(symbol, opts))
        .collect::<Result<_, _>>()?;

    let mut bars = BTreeMap::new();
    let mut sources = BTreeMap::new();
    for (symbol, symbol_bars, source) in loaded {
        debug!(%symbol, bars = symbol_bars.len(), ?source, "loaded bars");
        sources.insert(symbol.clone(), source);
        bars.insert(symbol, symbol_bars);
    }
    let has_synthetic = sources.values().any(|s| *s == DataSource::Synthetic);
    let dataset_hash = compute_dataset_hash(&bars);

    Ok(LoadedData {
        bars,
        sources,
        dataset_hash,
        has_synthetic,
    })
}

fn load_symbol(
    symbol: &SecurityId,
    opts: &LoadOptions,
) -> Result<(SecurityId, Vec<DailyBar>, DataSource), LoadError> {
    let path = csv_path(&opts.data_dir, symbol);
    let (bars, source) = if path.is_file() {
        (read_csv(symbol, &path, opts)?, DataSource::Csv)
    } else if opts.synthetic {
        warn!(%symbol, "generating synthetic data, results will be tagged as synthetic");
        (
            generate_synthetic_bars(symbol, opts.start, opts.end),
            DataSource::Synthetic,
        )
    } else {
        return Err(LoadError::NoData {
            symbol: symbol.clone(),
            path,
        });
    };

    if bars.is_empty() {
        return Err(LoadError::Empty {
            symbol: symbol.clone(),
            start: opts.start,
            end: opts.end,
        });
    }
    Ok((symbol.clone(), bars, source))
}

pub fn csv_path(data_dir: &Path, symbol: &SecurityId) -> PathBuf {
    data_dir.join(format!("{}.csv", symbol.as_str()))
}

/// Parse one CSV file, keep rows inside the window, sort, and drop duplicate or broken rows.
fn read_csv(
    symbol: &SecurityId,
    path: &Path,
    opts: &LoadOptions,
) -> Result<Vec<DailyBar>, LoadError> {
    let csv_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut bars = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row.map_err(csv_err)?;
        if row.date < opts.start || row.date > opts.end {
            continue;
        }
        bars.push(DailyBar {
            symbol: symbol.clone(),
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.max(0.0) as u64,
        });
    }

    bars.sort_by_key(|b| b.date);
    let before = bars.len();
    bars.dedup_by_key(|b| b.date);
    let duplicates = before - bars.len();
    if duplicates > 0 {
        warn!(%symbol, duplicates, "dropped rows with repeated dates");
    }

    let before = bars.len();
    bars.retain(DailyBar::is_sane);
    let broken = before - bars.len();
    if broken > 0 {
        warn!(%symbol, broken, "dropped rows failing the price sanity check");
    }
    Ok(bars)
}

/// Deterministic BLAKE3 hash over all bar data in symbol order.
fn compute_dataset_hash(bars: &BTreeMap<SecurityId, Vec<DailyBar>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (symbol, symbol_bars) in bars {
        hasher.update(symbol.as_str().as_bytes());
        for bar in symbol_bars {
            hasher.update(bar.date.to_string().as_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Weekday random walk from 100.0, seeded from the symbol name.
pub fn generate_synthetic_bars(
    symbol: &SecurityId,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyBar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_str().as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);
    // slight per-symbol drift so the classes are not perfectly balanced
    let drift: f64 = rng.gen_range(-0.0005..0.0015);

    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;
    while current <= end {
        if matches!(current.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            current += chrono::Duration::days(1);
            continue;
        }

        let gap: f64 = rng.gen_range(-0.005..0.005);
        let intraday: f64 = drift + rng.gen_range(-0.02..0.02);
        let open = price * (1.0 + gap);
        let close = open * (1.0 + intraday);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        bars.push(DailyBar {
            symbol: symbol.clone(),
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += chrono::Duration::days(1);
    }
    bars
}
