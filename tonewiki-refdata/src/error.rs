//! Error types for tonewiki-refdata
//!
//! Only [`RefDataError::Configuration`] is fatal, and only at
//! `RefreshCoordinator::initialize`. Every other variant is recoverable and is
//! absorbed by the cache/fallback chain before it can reach a `get_*` caller.

use std::path::PathBuf;
use thiserror::Error;

/// Reference-data subsystem error
#[derive(Debug, Error)]
pub enum RefDataError {
    /// Invalid configuration (fatal at initialize)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure or non-success HTTP status
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        /// HTTP status, if the server answered at all
        status: Option<u16>,
    },

    /// Request or refresh cycle exceeded its time bound
    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    /// Source failed recently; not retried before `retry_at`
    #[error("Skipping {url} until {retry_at} after a recent failure")]
    CoolingDown {
        url: String,
        retry_at: chrono::DateTime<chrono::Utc>,
    },

    /// Content could not be turned into any catalog entry
    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    /// On-disk cache entry is unreadable or fails its checksum
    #[error("Cache corruption at {}: {message}", path.display())]
    CacheCorruption { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// tonewiki-common error
    #[error("Common error: {0}")]
    Common(#[from] tonewiki_common::Error),
}

impl RefDataError {
    /// Whether a retry may succeed
    ///
    /// Connection failures, timeouts, HTTP 429 and 5xx are transient. Other
    /// HTTP statuses (404, 403, ...) are answered the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            RefDataError::Timeout { .. } => true,
            RefDataError::Network { status: None, .. } => true,
            RefDataError::Network {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Short label used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            RefDataError::Configuration(_) => "configuration",
            RefDataError::Network { .. } => "network",
            RefDataError::Timeout { .. } => "timeout",
            RefDataError::CoolingDown { .. } => "cooling_down",
            RefDataError::Parse { .. } => "parse",
            RefDataError::CacheCorruption { .. } => "cache_corruption",
            RefDataError::Io(_) => "io",
            RefDataError::Common(_) => "common",
        }
    }
}

/// Result type for reference-data operations
pub type RefDataResult<T> = Result<T, RefDataError>;
