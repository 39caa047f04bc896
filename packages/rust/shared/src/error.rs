//! Error types for JobPulse.
//!
//! Library crates use [`JobPulseError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all JobPulse operations.
#[derive(Debug, thiserror::Error)]
pub enum JobPulseError {
    /// Configuration loading or validation error. Fatal before any fetch.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error inside a source connector.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed response body or payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid field, unsupported value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Rendering the ranked result set failed.
    #[error("export error: {0}")]
    Export(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JobPulseError>;

impl JobPulseError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller may retry the failed operation unchanged.
    ///
    /// Storage and filesystem failures (locks, full disks) are transient;
    /// everything else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io { .. })
    }
}
