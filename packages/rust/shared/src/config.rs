//! Application configuration for JobPulse.
//!
//! User config lives at `~/.jobpulse/jobpulse.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JobPulseError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jobpulse.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jobpulse";

/// Largest accepted freshness window (one year).
pub const MAX_AGE_HOURS_LIMIT: u32 = 24 * 365;

/// Descriptive client identifier sent on every outbound request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "JobPulse/",
    env!("CARGO_PKG_VERSION"),
    " (job listing aggregator)"
);

// ---------------------------------------------------------------------------
// Config structs (matching jobpulse.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Configured source endpoints.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Keyword scoring weights.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Store settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Freshness window in hours.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u32,

    /// Keywords used for tagging and ranking.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Maximum connectors fetching at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-connector fetch timeout.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// SQLite database path.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Default CSV output path.
    #[serde(default = "default_output_csv")]
    pub output_csv: String,

    /// Client identifier for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            keywords: Vec::new(),
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            database_path: default_database_path(),
            output_csv: default_output_csv(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_age_hours() -> u32 {
    24
}
fn default_concurrency() -> u32 {
    4
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_database_path() -> String {
    "~/.jobpulse/jobpulse.db".into()
}
fn default_output_csv() -> String {
    "jobs.csv".into()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// RSS / Atom feed URLs.
    #[serde(default)]
    pub feeds: Vec<String>,

    /// Greenhouse board tokens.
    #[serde(default)]
    pub greenhouse_boards: Vec<String>,

    /// Lever company slugs.
    #[serde(default)]
    pub lever_companies: Vec<String>,

    /// Greenhouse API base URL.
    #[serde(default = "default_greenhouse_base")]
    pub greenhouse_api_base: String,

    /// Lever API base URL.
    #[serde(default = "default_lever_base")]
    pub lever_api_base: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            greenhouse_boards: Vec::new(),
            lever_companies: Vec::new(),
            greenhouse_api_base: default_greenhouse_base(),
            lever_api_base: default_lever_base(),
        }
    }
}

fn default_greenhouse_base() -> String {
    "https://boards-api.greenhouse.io".into()
}
fn default_lever_base() -> String {
    "https://api.lever.co".into()
}

/// `[scoring]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of a keyword found in the title.
    #[serde(default = "default_title_weight")]
    pub title_weight: u32,

    /// Weight of a keyword found in the company name.
    #[serde(default = "default_company_weight")]
    pub company_weight: u32,

    /// Weight of a keyword found in the location.
    #[serde(default = "default_location_weight")]
    pub location_weight: u32,

    /// Weight of a keyword found only in the description.
    #[serde(default = "default_description_weight")]
    pub description_weight: u32,

    /// Whether descriptions are searched at all.
    #[serde(default)]
    pub match_description: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            title_weight: default_title_weight(),
            company_weight: default_company_weight(),
            location_weight: default_location_weight(),
            description_weight: default_description_weight(),
            match_description: false,
        }
    }
}

fn default_title_weight() -> u32 {
    5
}
fn default_company_weight() -> u32 {
    3
}
fn default_location_weight() -> u32 {
    2
}
fn default_description_weight() -> u32 {
    1
}

impl ScoringConfig {
    /// Weights must strictly decrease from title to description.
    pub fn validate(&self) -> Result<()> {
        if !(self.title_weight > self.company_weight
            && self.company_weight > self.location_weight
            && self.location_weight > self.description_weight)
        {
            return Err(JobPulseError::config(format!(
                "scoring weights must satisfy title > company > location > description \
                 (got {}/{}/{}/{})",
                self.title_weight,
                self.company_weight,
                self.location_weight,
                self.description_weight
            )));
        }
        Ok(())
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Extra attempts for a retryable store write.
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_retries: default_write_retries(),
        }
    }
}

fn default_write_retries() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration handed to the connector runner.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum concurrent connector fetches.
    pub concurrency: u32,
    /// Timeout for a single connector, including body download.
    pub timeout_secs: u64,
    /// Client identifier for outbound requests.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.concurrency,
            timeout_secs: config.defaults.fetch_timeout_secs,
            user_agent: config.defaults.user_agent.clone(),
        }
    }
}

impl FetchConfig {
    /// Reject settings that would stall or disable the fetch stage.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(JobPulseError::config("concurrency must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(JobPulseError::config("fetch_timeout_secs must be at least 1"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(JobPulseError::config("user_agent must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jobpulse/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| JobPulseError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jobpulse/jobpulse.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JobPulseError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        JobPulseError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JobPulseError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JobPulseError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JobPulseError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| JobPulseError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
