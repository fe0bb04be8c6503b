//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the cyclescope pattern scanner.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::market_data::JsonFileMarketData;
use crate::application::{BatchReport, DetectionOrchestrator, Revalidation};
use crate::config::{load_config, Config};
use crate::detectors::{CalendarEffectsDetector, PatternDetector, SeasonalCycleDetector};
use crate::domain::{Pattern, PatternRecord};
use crate::ports::MarketDataSource;

/// Cyclescope - calendar anomaly and seasonal cycle scanner
#[derive(Parser, Debug)]
#[command(
    name = "cyclescope",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Calendar anomaly and seasonal cycle detection for daily market data",
    long_about = "Cyclescope scans daily OHLCV history for calendar effects and seasonal \
                  cycles, keeping only patterns that survive significance testing, \
                  walk-forward validation and multiple-testing correction."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan tickers for patterns
    Detect(DetectCmd),

    /// Recompute metrics for stored patterns against current data
    Revalidate(RevalidateCmd),

    /// Load and validate the configuration file
    CheckConfig(CheckConfigCmd),
}

/// Which detectors to run
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorChoice {
    Calendar,
    Seasonal,
    All,
}

/// Output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Scan tickers
#[derive(Parser, Debug)]
pub struct DetectCmd {
    /// Tickers to scan
    #[arg(value_name = "TICKER", required = true, num_args = 1..)]
    pub tickers: Vec<String>,

    /// First date of history (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last date of history (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: Option<NaiveDate>,

    /// Reference date for recency checks (defaults to today)
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<NaiveDate>,

    /// Detector to run
    #[arg(short, long, value_enum, default_value = "all")]
    pub detector: DetectorChoice,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Override the data directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<String>,

    /// Write detected patterns as storage records to FILE
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Revalidate stored patterns
#[derive(Parser, Debug)]
pub struct RevalidateCmd {
    /// JSON file with one pattern record or an array of them
    #[arg(value_name = "PATTERN_JSON")]
    pub pattern: PathBuf,

    /// First date of history (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last date of history (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: Option<NaiveDate>,

    /// Reference date for recency checks (defaults to today)
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<NaiveDate>,

    /// Override the data directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    /// Print the effective configuration as TOML
    #[arg(long)]
    pub show: bool,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = resolve_config(app.config.as_deref())?;
    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Detect(cmd) => detect_command(cmd, config).await,
        Command::Revalidate(cmd) => revalidate_command(cmd, config).await,
        Command::CheckConfig(cmd) => check_config_command(cmd, app.config.as_deref(), &config),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, configured: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn market_data(config: &Config, data_dir: Option<&str>) -> Arc<dyn MarketDataSource> {
    let source = match data_dir {
        Some(dir) => JsonFileMarketData::new(dir),
        None => JsonFileMarketData::new(config.data.get_data_dir()),
    };
    tracing::info!("Data directory: {}", source.data_dir().display());
    Arc::new(source)
}

/// Build the detectors selected by `choice` from configuration
pub fn build_detectors(
    config: &Config,
    source: Arc<dyn MarketDataSource>,
    choice: DetectorChoice,
    as_of: Option<NaiveDate>,
) -> Vec<Arc<dyn PatternDetector>> {
    let mut detectors: Vec<Arc<dyn PatternDetector>> = Vec::new();

    if matches!(choice, DetectorChoice::Calendar | DetectorChoice::All) {
        let mut calendar = CalendarEffectsDetector::new(Arc::clone(&source))
            .with_thresholds(config.thresholds.clone())
            .with_config(config.calendar.clone())
            .with_walk_forward(config.walk_forward.clone());
        if let Some(date) = as_of {
            calendar = calendar.with_as_of(date);
        }
        detectors.push(Arc::new(calendar));
    }

    if matches!(choice, DetectorChoice::Seasonal | DetectorChoice::All) {
        let mut seasonal = SeasonalCycleDetector::new(Arc::clone(&source))
            .with_thresholds(config.thresholds.clone())
            .with_config(config.seasonal.clone())
            .with_walk_forward(config.walk_forward.clone());
        if let Some(date) = as_of {
            seasonal = seasonal.with_as_of(date);
        }
        detectors.push(Arc::new(seasonal));
    }

    detectors
}

/// Handle detect command
async fn detect_command(cmd: DetectCmd, config: Config) -> Result<()> {
    if let (Some(start), Some(end)) = (cmd.start, cmd.end) {
        if start > end {
            bail!("--start {} is after --end {}", start, end);
        }
    }

    let tickers: Vec<String> = cmd.tickers.iter().map(|t| t.trim().to_uppercase()).collect();
    tracing::info!("Scanning {} ticker(s): {}", tickers.len(), tickers.join(", "));

    let source = market_data(&config, cmd.data_dir.as_deref());
    let detectors = build_detectors(&config, source, cmd.detector, cmd.as_of);
    let orchestrator =
        DetectionOrchestrator::new(detectors).with_max_concurrency(config.data.max_concurrency);

    let report = orchestrator
        .run(&tickers, cmd.start, cmd.end)
        .await
        .context("Detection batch failed")?;

    if let Some(ref path) = cmd.output {
        write_records(path, &report)?;
        tracing::info!("Wrote {} pattern record(s) to {}", report.total_patterns(), path.display());
    }

    match cmd.format {
        OutputFormat::Json => {
            let records: Vec<PatternRecord> = report.ranked().into_iter().map(PatternRecord::from).collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Text => print_report(&report),
    }

    Ok(())
}

fn write_records(path: &Path, report: &BatchReport) -> Result<()> {
    let records: Vec<PatternRecord> = report.ranked().into_iter().map(PatternRecord::from).collect();
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_report(report: &BatchReport) {
    for (ticker, patterns) in &report.patterns {
        println!("{}", ticker);
        if patterns.is_empty() {
            println!("  (no validated patterns)");
        }
        for pattern in patterns {
            print_pattern(pattern);
        }
        println!();
    }

    for failure in &report.failures {
        println!("! {} [{}]: {}", failure.ticker, failure.detector, failure.error);
    }

    println!(
        "{} pattern(s) across {} ticker(s), {} failure(s)",
        report.total_patterns(),
        report.patterns.len(),
        report.failures.len()
    );
}

fn print_pattern(pattern: &Pattern) {
    println!(
        "  {:<28} reliability {:>5.1}  confidence {:>5.1}  occurrences {:>3}",
        pattern.name,
        pattern.reliability_score,
        pattern.confidence,
        pattern.occurrence_count()
    );
    if let Some(m) = &pattern.validation_metrics {
        println!(
            "    p={:.4}  d={:+.2}  WFE={:.2}  consistency={:.2}  years={:.1}",
            m.p_value, m.effect_size, m.walk_forward_efficiency, m.consistency_score, m.years_of_data
        );
    }
    if let Some(next) = pattern.next_occurrence {
        println!("    next: {}", next);
    }
}

/// Read one record or an array of records
fn read_patterns(path: &Path) -> Result<Vec<Pattern>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let records: Vec<PatternRecord> = match serde_json::from_str::<Vec<PatternRecord>>(&content) {
        Ok(records) => records,
        Err(_) => vec![PatternRecord::from_json(&content)
            .with_context(|| format!("{} is not a pattern record", path.display()))?],
    };

    records
        .iter()
        .map(|r| Pattern::try_from(r).with_context(|| format!("Invalid record {}", r.pattern_id)))
        .collect()
}

/// Handle revalidate command
async fn revalidate_command(cmd: RevalidateCmd, config: Config) -> Result<()> {
    let patterns = read_patterns(&cmd.pattern)?;
    if patterns.is_empty() {
        bail!("No patterns in {}", cmd.pattern.display());
    }

    let source = market_data(&config, cmd.data_dir.as_deref());
    let detectors = build_detectors(&config, Arc::clone(&source), DetectorChoice::All, cmd.as_of);
    let orchestrator = DetectionOrchestrator::new(detectors);

    let mut results: Vec<Revalidation> = Vec::with_capacity(patterns.len());
    for pattern in &patterns {
        match orchestrator.revalidate(pattern, source.as_ref(), cmd.start, cmd.end).await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::warn!("Revalidation of {} failed: {}", pattern.id, e);
                eprintln!("! {}: {}", pattern.id, e);
            }
        }
    }

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Text => {
            for result in &results {
                let Some(stored) = patterns.iter().find(|p| p.id == result.pattern_id) else {
                    continue;
                };
                println!(
                    "{}\n  reliability {:.1} -> {:.1}  confidence {:.1} -> {:.1}  {}",
                    result.pattern_id,
                    stored.reliability_score,
                    result.reliability_score,
                    stored.confidence,
                    result.confidence,
                    if result.meets_criteria { "PASS" } else { "FAIL" }
                );
                let m = &result.metrics;
                println!(
                    "  p={:.4}  d={:+.2}  WFE={:.2}  occurrences={}",
                    m.p_value, m.effect_size, m.walk_forward_efficiency, m.sample_size
                );
            }
        }
    }

    Ok(())
}

/// Handle check-config command
fn check_config_command(cmd: CheckConfigCmd, path: Option<&Path>, config: &Config) -> Result<()> {
    match path {
        Some(path) => println!("✓ {} is valid", path.display()),
        None => println!("✓ No config file given, defaults are valid"),
    }
    println!("  Data directory: {}", config.data.get_data_dir());
    println!(
        "  Thresholds: occurrences >= {}, years >= {}, p <= {}, WFE >= {}",
        config.thresholds.min_occurrences,
        config.thresholds.min_years,
        config.thresholds.min_p_value,
        config.thresholds.min_wfe
    );
    println!(
        "  Calendar effects: {}",
        config
            .calendar
            .effects
            .iter()
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  Seasonal periods: {}",
        config
            .seasonal
            .periods
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if cmd.show {
        println!("\n{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
