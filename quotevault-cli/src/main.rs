//! QuoteVault CLI — refresh and artifact management commands.
//!
//! Commands:
//! - `fetch` — refresh one or more series from CSV files, serving cache when fresh
//! - `status` — versions, last commit, and freshness per artifact
//! - `versions` — committed versions of one artifact
//! - `params` / `notes` — edit artifact metadata
//! - `rename` / `delete` — manage artifacts (delete removes every blob)
//! - `reconcile` — finish writes interrupted between staging and commit
//! - `calendar` — upcoming trading sessions
//! - `fresh` — freshness verdict for one artifact

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use quotevault_core::calendar::TradingCalendar;
use quotevault_core::freshness::FreshnessOracle;
use quotevault_core::store::{ArtifactStore, StoreError};
use quotevault_runner::{
    refresh_many, BatchOptions, BatchProgress, CsvSource, DataSource, Interval, Origin,
    RefreshError, RefreshWorkflow, SeriesKey, VaultConfig,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "quotevault.toml";
const MAX_CALENDAR_DAYS: i64 = 3660;

#[derive(Parser)]
#[command(
    name = "quotevault",
    version,
    about = "QuoteVault CLI — versioned market-data cache with calendar-aware refresh"
)]
struct Cli {
    /// Config file. Defaults to ./quotevault.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store root, overriding config and environment.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh series from CSV files, reusing the cached copy when fresh.
    Fetch {
        /// Symbols to refresh (e.g., SPY QQQ AAPL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Series interval: daily or intraday.
        #[arg(long, default_value = "daily")]
        interval: Interval,

        /// CSV file, or directory of {SYMBOL}.csv files.
        #[arg(long)]
        csv: PathBuf,

        /// Refresh even if the cached copy is fresh.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Worker threads for multi-symbol refresh (0 = all cores).
        #[arg(long, default_value_t = 0)]
        threads: usize,
    },
    /// Show versions, last commit, and freshness. All artifacts when none given.
    Status { names: Vec<String> },
    /// List committed versions of an artifact.
    Versions { name: String },
    /// Edit artifact parameters.
    Params {
        name: String,
        #[command(subcommand)]
        action: ParamsAction,
    },
    /// Edit artifact notes.
    Notes {
        name: String,
        #[command(subcommand)]
        action: NotesAction,
    },
    /// Rename an artifact.
    Rename { old: String, new: String },
    /// Delete an artifact and every blob it references.
    Delete { name: String },
    /// Commit writes left staged by an interrupted refresh.
    Reconcile,
    /// Show upcoming trading sessions.
    Calendar {
        /// Days ahead to show.
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Print the freshness verdict for an artifact (exit 1 when stale).
    Fresh { name: String },
}

#[derive(Subcommand)]
enum ParamsAction {
    /// Print parameters as JSON.
    Show,
    /// Set parameters: key=value (value parsed as JSON, else taken as a string).
    Set {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// Remove parameters by key.
    Unset {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Subcommand)]
enum NotesAction {
    /// Append a note (an empty note just creates the title).
    Add {
        title: String,
        #[arg(default_value = "")]
        text: String,
    },
    /// Print notes, all titles when none given.
    List { title: Option<String> },
    /// Delete one note by index, or the whole title.
    Delete { title: String, index: Option<usize> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.root.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.verbose, &config.log_level);
    tracing::debug!(root = %config.root.display(), "quotevault starting");

    match run(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `-v` wins, then `RUST_LOG`, then the configured level.
fn init_tracing(verbose: u8, configured: &str) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<VaultConfig> {
    let mut config = match path {
        Some(path) => VaultConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            VaultConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => VaultConfig::default(),
    };
    config.apply_env();
    if let Some(root) = root {
        config.root = root;
    }
    Ok(config)
}

fn workflow(config: &VaultConfig) -> Result<RefreshWorkflow> {
    let store = config.open_store()?;
    let calendar = config.build_calendar()?;
    Ok(RefreshWorkflow::new(store, FreshnessOracle::new(calendar)))
}

fn run(command: Commands, config: &VaultConfig) -> Result<ExitCode> {
    match command {
        Commands::Fetch {
            symbols,
            interval,
            csv,
            force,
            threads,
        } => run_fetch(config, &symbols, interval, &csv, force, threads),
        Commands::Status { names } => run_status(config, names),
        Commands::Versions { name } => run_versions(config, &name),
        Commands::Params { name, action } => run_params(config, &name, action),
        Commands::Notes { name, action } => run_notes(config, &name, action),
        Commands::Rename { old, new } => {
            let store = config.open_store()?;
            let mut artifact = store.get(&old)?;
            store.rename(&mut artifact, &new)?;
            println!("Renamed {old} -> {new}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Delete { name } => {
            let store = config.open_store()?;
            let artifact = store.get(&name)?;
            let blobs = artifact.blob_refs().len();
            store.delete(artifact)?;
            println!("Deleted {name} ({blobs} blob(s) removed)");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reconcile => run_reconcile(config),
        Commands::Calendar { days } => run_calendar(config, days),
        Commands::Fresh { name } => run_fresh(config, &name),
    }
}

// ── fetch ────────────────────────────────────────────────────────────

struct StderrProgress;

impl BatchProgress for StderrProgress {
    fn on_complete(&self, key: &SeriesKey, result: &Result<Origin, RefreshError>) {
        match result {
            Ok(Origin::Cache) => eprintln!("{key}: cached copy is fresh"),
            Ok(Origin::Source) => eprintln!("{key}: refreshed"),
            Err(e) => eprintln!("{key}: {e}"),
        }
    }
}

fn run_fetch(
    config: &VaultConfig,
    symbols: &[String],
    interval: Interval,
    csv: &Path,
    force: bool,
    threads: usize,
) -> Result<ExitCode> {
    if !csv.exists() {
        bail!("CSV path {} does not exist", csv.display());
    }
    let source: Arc<dyn DataSource> = if csv.is_dir() {
        Arc::new(CsvSource::directory(csv))
    } else {
        Arc::new(CsvSource::file(csv))
    };
    let wf = workflow(config)?;
    let keys: Vec<SeriesKey> = symbols.iter().map(|s| SeriesKey::new(s, interval)).collect();

    let summary = refresh_many(
        &wf,
        &keys,
        |_| source.clone(),
        BatchOptions {
            force_refresh: force,
            max_threads: threads,
        },
        &StderrProgress,
    );
    println!(
        "{} series: {} succeeded ({} from cache), {} failed",
        summary.total, summary.succeeded, summary.from_cache, summary.failed
    );
    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ── status / versions / fresh ────────────────────────────────────────

fn run_status(config: &VaultConfig, names: Vec<String>) -> Result<ExitCode> {
    let wf = workflow(config)?;
    let names = if names.is_empty() {
        wf.store().list()?
    } else {
        names
    };
    if names.is_empty() {
        println!("Store at {} is empty", config.root.display());
        return Ok(ExitCode::SUCCESS);
    }

    let now = Utc::now();
    println!("{:<24} {:<20} {:<28} {}", "ARTIFACT", "VERSIONS", "LAST COMMIT", "FRESHNESS");
    for name in names {
        let status = wf.status_at(&name, now)?;
        let last = status
            .last_commit
            .map(|t| config.display_time(t))
            .unwrap_or_else(|| "-".into());
        let mut freshness = status.freshness.to_string();
        if !status.pending_staging.is_empty() {
            freshness.push_str(&format!(" (pending: {})", status.pending_staging.join(",")));
        }
        println!(
            "{:<24} {:<20} {:<28} {}",
            status.name,
            status.versions.join(","),
            last,
            freshness
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_versions(config: &VaultConfig, name: &str) -> Result<ExitCode> {
    let store = config.open_store()?;
    let artifact = store.get(name)?;
    let labels = artifact.all_versions();
    if labels.is_empty() {
        println!("{name} has no committed versions");
    }
    for label in labels {
        let marker = if label == artifact.default_version() { "*" } else { " " };
        let committed = store
            .last_commit_timestamp(&artifact, Some(label))?
            .map(|t| config.display_time(t))
            .unwrap_or_else(|| "missing blob".into());
        println!("{marker} {label:<16} {committed}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_fresh(config: &VaultConfig, name: &str) -> Result<ExitCode> {
    let wf = workflow(config)?;
    let status = wf.status_at(name, Utc::now())?;
    println!("{name}: {}", status.freshness);
    Ok(if status.freshness.is_fresh() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

// ── params / notes ───────────────────────────────────────────────────

fn parse_pair(pair: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("expected key=value, got '{pair}'");
    };
    if key.is_empty() {
        bail!("empty key in '{pair}'");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::from(raw));
    Ok((key.to_string(), value))
}

fn run_params(config: &VaultConfig, name: &str, action: ParamsAction) -> Result<ExitCode> {
    let store = config.open_store()?;
    let mut artifact = store.get(name)?;
    match action {
        ParamsAction::Show => {
            println!("{}", serde_json::to_string_pretty(artifact.parameters())?);
        }
        ParamsAction::Set { pairs } => {
            let parsed = pairs
                .iter()
                .map(|p| parse_pair(p))
                .collect::<Result<Vec<_>>>()?;
            store.add_params(&mut artifact, parsed)?;
            println!("{}", serde_json::to_string_pretty(artifact.parameters())?);
        }
        ParamsAction::Unset { keys } => {
            store.remove_params(&mut artifact, &keys)?;
            println!("{}", serde_json::to_string_pretty(artifact.parameters())?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_notes(config: &VaultConfig, name: &str, action: NotesAction) -> Result<ExitCode> {
    let store = config.open_store()?;
    let mut artifact = store.get(name)?;
    match action {
        NotesAction::Add { title, text } => store.add_note(&mut artifact, &title, &text)?,
        NotesAction::List { title } => {
            if artifact.notes().is_empty() {
                println!("{name} has no notes");
            } else {
                println!("{}", store.read_notes(&artifact, title.as_deref()));
            }
        }
        NotesAction::Delete { title, index } => {
            match store.delete_note(&mut artifact, &title, index) {
                Err(StoreError::NoSuchNote { index, .. }) => {
                    bail!("{name} has no note {index} under '{title}'")
                }
                other => other?,
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ── reconcile / calendar ─────────────────────────────────────────────

fn run_reconcile(config: &VaultConfig) -> Result<ExitCode> {
    let store: ArtifactStore = config.open_store()?;
    let pending = store.pending_staging()?;
    if pending.is_empty() {
        println!("No interrupted writes");
        return Ok(ExitCode::SUCCESS);
    }
    for name in pending {
        let mut artifact = store.get(&name)?;
        let labels: Vec<String> = artifact
            .staged_versions()
            .into_iter()
            .map(String::from)
            .collect();
        store
            .reconcile(&mut artifact)
            .with_context(|| format!("reconciling {name}"))?;
        println!("{name}: committed {}", labels.join(","));
    }
    Ok(ExitCode::SUCCESS)
}

/// End of a `--days` lookahead window starting at `now`.
fn calendar_window_end(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    if !(1..=MAX_CALENDAR_DAYS).contains(&days) {
        bail!("--days must be between 1 and {MAX_CALENDAR_DAYS}, got {days}");
    }
    match now.checked_add_signed(Duration::days(days)) {
        Some(end) => Ok(end),
        None => bail!("--days {days} overflows the calendar range"),
    }
}

fn run_calendar(config: &VaultConfig, days: i64) -> Result<ExitCode> {
    let now = Utc::now();
    let end = calendar_window_end(now, days)?;
    let calendar: Arc<dyn TradingCalendar> = config.build_calendar()?;
    let sessions = calendar.schedule(now, end)?;
    println!(
        "{} — market is {}",
        calendar.name(),
        if calendar.is_open_at(now)? { "open" } else { "closed" }
    );
    for session in sessions {
        println!(
            "{}  →  {}",
            config.display_time(session.open),
            config.display_time(session.close)
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn calendar_window_rejects_out_of_range_days() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        assert_eq!(
            calendar_window_end(now, 7).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap()
        );
        assert!(calendar_window_end(now, 0).is_err());
        assert!(calendar_window_end(now, -3).is_err());
        assert!(calendar_window_end(now, MAX_CALENDAR_DAYS + 1).is_err());
        assert!(calendar_window_end(now, i64::MAX).is_err());
    }

    #[test]
    fn parse_pair_prefers_json_values() {
        assert_eq!(
            parse_pair("lookback=20").unwrap(),
            ("lookback".to_string(), serde_json::json!(20))
        );
        assert_eq!(
            parse_pair("symbol=AAA").unwrap(),
            ("symbol".to_string(), serde_json::json!("AAA"))
        );
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }
}
