//! Shared types, error model, and configuration for JobPulse.
//!
//! This crate is the foundation depended on by all other JobPulse crates.
//! It provides:
//! - [`JobPulseError`], the unified error type
//! - Domain types ([`Job`], [`Source`], [`RawRecord`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_USER_AGENT, DefaultsConfig, FetchConfig, MAX_AGE_HOURS_LIMIT,
    ScoringConfig, SourcesConfig, StorageConfig, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from,
};
pub use error::{JobPulseError, Result};
pub use types::{Job, RawRecord, Source};
