//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use jobpulse_connectors::ConnectorRegistry;
use jobpulse_core::{
    ConnectorSummary, KeywordSet, Pipeline, ProgressReporter, RunParams, RunSummary, check_max_age,
};
use jobpulse_shared::{
    AppConfig, Job, config_file_path, expand_home, init_config, load_config, load_config_from,
};
use jobpulse_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// JobPulse: fresh job postings, ranked by your keywords.
#[derive(Parser)]
#[command(
    name = "jobpulse",
    version,
    about = "Aggregate job postings from feeds and job boards into one ranked list.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.jobpulse/jobpulse.toml.
    #[arg(long, global = true, env = "JOBPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Options shared by `run` and `query`.
#[derive(Args)]
pub(crate) struct WindowArgs {
    /// Freshness window in hours (defaults to `max_age_hours` from config).
    #[arg(long)]
    pub max_age_hours: Option<u32>,

    /// Keyword to tag and rank by. Repeat for several; replaces the configured list.
    #[arg(short = 'k', long = "keyword")]
    pub keywords: Vec<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch all sources, store fresh postings and export them.
    Run {
        #[command(flatten)]
        window: WindowArgs,

        /// Fetch and rank only; skip the database and the CSV.
        #[arg(long)]
        dry_run: bool,

        /// CSV output path (defaults to `output_csv` from config).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Rank stored postings without fetching.
    Query {
        #[command(flatten)]
        window: WindowArgs,

        /// Write the result as CSV instead of printing it.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print at most this many rows.
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show recent pipeline runs.
    Runs {
        /// Number of runs to show.
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jobpulse=info",
        1 => "jobpulse=debug",
        _ => "jobpulse=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            window,
            dry_run,
            out,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_run(&config, &window, dry_run, out).await
        }
        Command::Query { window, out, limit } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_query(&config, &window, out.as_deref(), limit).await
        }
        Command::Runs { limit } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_runs(&config, limit).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Merge CLI overrides over configured defaults.
fn run_params(config: &AppConfig, window: &WindowArgs, dry_run: bool) -> RunParams {
    let mut params = RunParams::from_config(config);
    if let Some(hours) = window.max_age_hours {
        params.max_age_hours = hours;
    }
    if !window.keywords.is_empty() {
        params.keywords = window.keywords.clone();
    }
    params.dry_run = dry_run;
    params
}

fn database_path(config: &AppConfig) -> Result<PathBuf> {
    Ok(expand_home(&config.defaults.database_path)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: &AppConfig,
    window: &WindowArgs,
    dry_run: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let params = run_params(config, window, dry_run);
    let registry = ConnectorRegistry::from_config(&config.sources);
    if registry.is_empty() {
        warn!("no sources configured; add feeds, greenhouse_boards or lever_companies to the config");
    }

    info!(
        connectors = registry.len(),
        max_age_hours = params.max_age_hours,
        keywords = params.keywords.len(),
        dry_run,
        "starting run"
    );

    let pipeline = Pipeline::new(config, registry);
    let reporter = CliProgress::new();
    let mut outcome = pipeline.collect(&params, Utc::now(), &reporter).await?;

    if dry_run {
        reporter.done(&outcome.summary);
        print_summary(&outcome.summary, None);
        print_jobs(&outcome.jobs, 20);
        return Ok(());
    }

    reporter.phase("Storing postings");
    let db_path = database_path(config)?;
    let stored = match Storage::open(&db_path).await {
        Ok(storage) => pipeline.persist(&mut outcome, &storage).await.map(|_| ()),
        Err(e) => Err(e),
    };

    // Scored results are exported even when the store write failed.
    reporter.phase("Writing CSV");
    let csv_path = out.unwrap_or_else(|| PathBuf::from(&config.defaults.output_csv));
    jobpulse_export::write_csv(&csv_path, &outcome.jobs)?;
    reporter.done(&outcome.summary);

    print_summary(&outcome.summary, Some(&csv_path));

    stored.map_err(|e| eyre!("results exported but not stored in {}: {e}", db_path.display()))
}

async fn cmd_query(
    config: &AppConfig,
    window: &WindowArgs,
    out: Option<&Path>,
    limit: usize,
) -> Result<()> {
    let params = run_params(config, window, false);
    check_max_age(params.max_age_hours)?;
    let keywords = KeywordSet::parse(&params.keywords)?;
    config.scoring.validate()?;

    let storage = Storage::open_readonly(&database_path(config)?).await?;
    let jobs = storage
        .query_fresh(params.max_age_hours, &keywords, &config.scoring, Utc::now())
        .await?;

    info!(matched = jobs.len(), "query complete");

    match out {
        Some(path) => {
            jobpulse_export::write_csv(path, &jobs)?;
            println!("  Wrote {} jobs to {}", jobs.len(), path.display());
        }
        None => print_jobs(&jobs, limit),
    }
    Ok(())
}

async fn cmd_runs(config: &AppConfig, limit: usize) -> Result<()> {
    let storage = Storage::open_readonly(&database_path(config)?).await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    for run in runs {
        let status = match (&run.finished_at, &run.summary) {
            (Some(_), Some(summary)) => format!(
                "fetched {:>4}  admitted {:>4}  failed sources {}",
                summary.fetched,
                summary.admitted,
                summary.failed_connectors().count()
            ),
            _ => "unfinished".to_string(),
        };
        println!("  {}  {status}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let source = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_summary(summary: &RunSummary, csv_path: Option<&Path>) {
    println!();
    println!("  Fetched:   {} records from {} sources", summary.fetched, summary.connectors.len());
    for failed in summary.failed_connectors() {
        println!(
            "  Failed:    {} ({}): {}",
            failed.connector,
            failed.failure_kind.as_deref().unwrap_or("error"),
            failed.error.as_deref().unwrap_or("")
        );
    }
    println!("  Admitted:  {}", summary.admitted);

    let d = &summary.dropped;
    println!(
        "  Dropped:   {} (stale {}, undated {}, duplicate {}, no title {}, no company {}, unparsable {})",
        d.total(),
        d.stale,
        d.no_posted_at,
        d.duplicate,
        d.missing_title,
        d.missing_company,
        d.unparsable
    );
    if let Some(stored) = summary.stored {
        println!("  Stored:    {} new, {} updated", stored.inserted, stored.updated);
    }
    if let Some(path) = csv_path {
        println!("  CSV:       {}", path.display());
    }
    println!();
}

fn print_jobs(jobs: &[Job], limit: usize) {
    for job in jobs.iter().take(limit) {
        let posted = job
            .posted_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let remote = if job.remote { " [remote]" } else { "" };
        println!(
            "  {:>3}  {posted:16}  {} @ {}{remote}",
            job.score, job.title, job.company
        );
    }
    if jobs.len() > limit {
        println!("  ... {} more", jobs.len() - limit);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn connector_done(&self, summary: &ConnectorSummary) {
        match &summary.error {
            None => self
                .spinner
                .set_message(format!("{}: {} records", summary.connector, summary.fetched)),
            Some(error) => self
                .spinner
                .println(format!("  ! {} failed: {error}", summary.connector)),
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
