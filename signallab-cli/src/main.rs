//! SignalLab CLI: replay, one-shot allocation and config scaffolding.
//!
//! Commands:
//! - `run`: replay a TOML run config and save artifacts
//! - `allocate`: turn a JSON array of signals into target weights
//! - `init-config`: print or write a starter run config

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use signallab_core::domain::Signal;
use signallab_core::{CapPolicy, PortfolioSnapshot, WeightAllocator};
use signallab_runner::{run_replay, save_artifacts, ReplayResult, RunConfig};

#[derive(Parser)]
#[command(
    name = "signallab",
    about = "SignalLab CLI: weekly classifier signals and weight allocation"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a run config and save manifest, rebalances and signals.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Generate synthetic bars for symbols without a CSV file.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Override the output directory from the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the summary without writing artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Allocate weights for a JSON array of signals (file path or `-` for stdin).
    Allocate {
        /// Signals JSON file, or `-` to read stdin.
        #[arg(long, default_value = "-")]
        signals: String,

        /// Per-position floor.
        #[arg(long, default_value_t = 0.03)]
        min_weight: f64,

        /// Fixed per-position ceiling. Mutually exclusive with --max-cash-fraction.
        #[arg(long)]
        max_weight: Option<f64>,

        /// Cash-derived ceiling: fraction × cash / total value.
        #[arg(long)]
        max_cash_fraction: Option<f64>,

        /// Total portfolio value (cash-derived ceiling only).
        #[arg(long, default_value_t = 100_000.0)]
        total_value: f64,

        /// Available cash (cash-derived ceiling only). Defaults to total value.
        #[arg(long)]
        cash: Option<f64>,
    },
    /// Print a starter run config, or write it to a file.
    InitConfig {
        /// Write to this path instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Run {
            config,
            synthetic,
            output_dir,
            no_save,
        } => run_cmd(&config, synthetic, output_dir, no_save),
        Commands::Allocate {
            signals,
            min_weight,
            max_weight,
            max_cash_fraction,
            total_value,
            cash,
        } => allocate_cmd(
            &signals,
            min_weight,
            max_weight,
            max_cash_fraction,
            total_value,
            cash,
        ),
        Commands::InitConfig { output, force } => init_config_cmd(output.as_deref(), force),
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("signallab_core={level}").parse()?)
            .add_directive(format!("signallab_runner={level}").parse()?)
            .add_directive(format!("signallab={level}").parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_cmd(
    config_path: &Path,
    synthetic: bool,
    output_dir: Option<PathBuf>,
    no_save: bool,
) -> Result<()> {
    let mut config = RunConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if synthetic {
        config.run.synthetic = true;
    }
    if let Some(dir) = output_dir {
        config.run.output_dir = dir;
    }

    info!(config = %config_path.display(), "starting replay");
    let result = run_replay(&config)?;
    print_summary(&result);

    if !no_save {
        let paths = save_artifacts(&result, &config.run.output_dir)?;
        println!("Artifacts saved to: {}", paths.run_dir.display());
    }
    Ok(())
}

fn print_summary(result: &ReplayResult) {
    let ret = if result.initial_value > 0.0 {
        (result.final_value / result.initial_value - 1.0) * 100.0
    } else {
        0.0
    };
    println!();
    println!("Period:        {} to {}", result.start, result.end);
    println!("Trading days:  {}", result.trading_days);
    println!("Symbols:       {}", result.sources.len());
    println!("Signals:       {}", result.signals.len());
    println!("Rebalances:    {}", result.rebalances.len());
    println!(
        "Paper value:   {:.2} -> {:.2} ({ret:+.2}%)",
        result.initial_value, result.final_value
    );
    println!("Config hash:   {}", result.config_hash);
    if result.has_synthetic {
        println!("WARNING: synthetic data was used; results are not meaningful");
    }

    if let Some(last) = result.rebalances.last() {
        println!();
        println!("Last rebalance ({}):", last.date);
        println!("{:<8} {:>8} {:>8}", "Symbol", "Weight", "P(up)");
        println!("{}", "-".repeat(26));
        for target in &last.targets {
            let p_up = target
                .p_up
                .map(|p| format!("{p:.3}"))
                .unwrap_or_else(|| "exit".into());
            println!("{:<8} {:>8.4} {:>8}", target.symbol.as_str(), target.weight, p_up);
        }
    }
}

fn allocate_cmd(
    source: &str,
    min_weight: f64,
    max_weight: Option<f64>,
    max_cash_fraction: Option<f64>,
    total_value: f64,
    cash: Option<f64>,
) -> Result<()> {
    let cap = match (max_weight, max_cash_fraction) {
        (Some(_), Some(_)) => bail!("--max-weight and --max-cash-fraction are mutually exclusive"),
        (Some(max_weight), None) => CapPolicy::Fixed { max_weight },
        (None, Some(max_cash_fraction)) => CapPolicy::CashFraction { max_cash_fraction },
        (None, None) => bail!("one of --max-weight or --max-cash-fraction is required"),
    };
    if !(0.0..=1.0).contains(&min_weight) {
        bail!("--min-weight must be in [0, 1], got {min_weight}");
    }

    let json = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading signals from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))?
    };
    let signals: Vec<Signal> = serde_json::from_str(&json).context("parsing signals JSON")?;

    let portfolio = PortfolioSnapshot {
        total_value,
        cash: cash.unwrap_or(total_value),
    };
    let allocator = WeightAllocator::new(min_weight, cap);
    info!(
        signals = signals.len(),
        max_weight = cap.max_weight(&portfolio),
        "allocating"
    );
    let weights = allocator.target_weights(&signals, &portfolio);
    println!("{}", serde_json::to_string_pretty(&weights)?);
    Ok(())
}

fn init_config_cmd(output: Option<&Path>, force: bool) -> Result<()> {
    let toml = RunConfig::template().to_toml()?;
    match output {
        None => print!("{toml}"),
        Some(path) => {
            if path.exists() && !force {
                bail!("{} already exists (pass --force to overwrite)", path.display());
            }
            std::fs::write(path, &toml)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote starter config to {}", path.display());
        }
    }
    Ok(())
}
