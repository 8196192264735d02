//! Configuration for the reference-data subsystem
//!
//! Loaded from `tonewiki-refdata.toml` (see [`RefDataConfig::load`]). Every
//! field has a built-in default, so a missing file still yields a usable
//! configuration backed by the fallback tables.

use crate::error::{RefDataError, RefDataResult};
use crate::models::DataType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tonewiki_common::config::{resolve_config_file, resolve_storage_root, LoggingConfig};

/// Config file name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "tonewiki-refdata.toml";
/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TONEWIKI_REFDATA_CONFIG";
/// Environment variable overriding `local_storage_path`
pub const STORAGE_ENV_VAR: &str = "TONEWIKI_STORAGE_PATH";
/// Longest accepted refresh interval (one year)
pub const MAX_REFRESH_INTERVAL_HOURS: f64 = 24.0 * 365.0;

/// Source URLs per data type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceUrls {
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub meta_tag: Vec<String>,
    #[serde(default)]
    pub technique: Vec<String>,
}

impl SourceUrls {
    pub fn for_type(&self, data_type: DataType) -> &[String] {
        match data_type {
            DataType::Genre => &self.genre,
            DataType::MetaTag => &self.meta_tag,
            DataType::Technique => &self.technique,
        }
    }
}

/// Reference-data configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefDataConfig {
    /// Master switch for wiki integration
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root for raw cache files and catalog snapshots
    #[serde(default = "default_storage_path")]
    pub local_storage_path: PathBuf,

    /// Maximum cache age before a source is re-fetched
    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: f64,

    /// Serve the built-in tables when no wiki data is available
    #[serde(default = "default_true")]
    pub fallback_to_hardcoded: bool,

    /// Maximum in-flight HTTP requests
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Bound on one whole refresh cycle for a data type
    #[serde(default = "default_refresh_timeout_seconds")]
    pub refresh_timeout_seconds: u64,

    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// After a failed fetch, reads serve cached data without retrying the
    /// source for this long (0 disables the cooldown)
    #[serde(default = "default_failure_cooldown_seconds")]
    pub failure_cooldown_seconds: u64,

    /// Outbound request quota (0 disables rate limiting)
    #[serde(default)]
    pub requests_per_second: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub sources: SourceUrls,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

fn default_storage_path() -> PathBuf {
    tonewiki_common::config::default_storage_root("refdata")
}

fn default_refresh_interval_hours() -> f64 {
    24.0
}

fn default_concurrency_limit() -> usize {
    5
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_refresh_timeout_seconds() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_failure_cooldown_seconds() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("tonewiki-refdata/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RefDataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_storage_path: default_storage_path(),
            refresh_interval_hours: default_refresh_interval_hours(),
            fallback_to_hardcoded: true,
            concurrency_limit: default_concurrency_limit(),
            request_timeout_seconds: default_request_timeout_seconds(),
            refresh_timeout_seconds: default_refresh_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            failure_cooldown_seconds: default_failure_cooldown_seconds(),
            requests_per_second: 0,
            user_agent: default_user_agent(),
            sources: SourceUrls::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RefDataConfig {
    /// Load configuration
    ///
    /// **Priority:** explicit path → `TONEWIKI_REFDATA_CONFIG` → platform config dir.
    /// `TONEWIKI_STORAGE_PATH` overrides the storage path from the file.
    pub fn load(cli_path: Option<&Path>) -> RefDataResult<Self> {
        let path = resolve_config_file(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let mut config: RefDataConfig = tonewiki_common::config::load_toml(path.as_deref())
            .map_err(|e| RefDataError::Configuration(e.to_string()))?;

        config.local_storage_path = resolve_storage_root(
            None,
            STORAGE_ENV_VAR,
            Some(config.local_storage_path.as_path()),
            "refdata",
        );

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> RefDataResult<Self> {
        toml::from_str(content)
            .map_err(|e| RefDataError::Configuration(format!("Parse TOML failed: {}", e)))
    }

    /// Check every setting that can be checked without touching disk or network
    pub fn validate(&self) -> RefDataResult<()> {
        if !self.refresh_interval_hours.is_finite() || self.refresh_interval_hours <= 0.0 {
            return Err(RefDataError::Configuration(format!(
                "refresh_interval_hours must be a positive number, got {}",
                self.refresh_interval_hours
            )));
        }

        if self.refresh_interval_hours > MAX_REFRESH_INTERVAL_HOURS {
            return Err(RefDataError::Configuration(format!(
                "refresh_interval_hours must be at most {}, got {}",
                MAX_REFRESH_INTERVAL_HOURS, self.refresh_interval_hours
            )));
        }

        if self.concurrency_limit == 0 {
            return Err(RefDataError::Configuration(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }

        if self.request_timeout_seconds == 0 || self.refresh_timeout_seconds == 0 {
            return Err(RefDataError::Configuration(
                "request_timeout_seconds and refresh_timeout_seconds must be at least 1".to_string(),
            ));
        }

        if !self.enabled && !self.fallback_to_hardcoded {
            return Err(RefDataError::Configuration(
                "Wiki integration and hardcoded fallback are both disabled; no data source remains"
                    .to_string(),
            ));
        }

        if self.local_storage_path.as_os_str().is_empty() {
            return Err(RefDataError::Configuration(
                "local_storage_path must not be empty".to_string(),
            ));
        }

        for data_type in DataType::ALL {
            for url in self.sources.for_type(data_type) {
                validate_url(url)?;
            }
        }

        Ok(())
    }

    pub fn source_urls(&self, data_type: DataType) -> &[String] {
        self.sources.for_type(data_type)
    }

    /// Maximum cache age
    pub fn max_age(&self) -> chrono::Duration {
        tonewiki_common::time::hours_to_duration(self.refresh_interval_hours)
    }

    /// Background refresh period, clamped to `[1s, MAX_REFRESH_INTERVAL_HOURS]`
    pub fn refresh_interval(&self) -> Duration {
        let max = Duration::from_secs((MAX_REFRESH_INTERVAL_HOURS * 3600.0) as u64);
        Duration::try_from_secs_f64(self.refresh_interval_hours * 3600.0)
            .map_or(max, |interval| interval.clamp(Duration::from_secs(1), max))
    }

    pub fn failure_cooldown(&self) -> chrono::Duration {
        let max_seconds = (i64::MAX / 1000) as u64;
        chrono::Duration::seconds(self.failure_cooldown_seconds.min(max_seconds) as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_seconds)
    }
}

/// Validate a source URL without any network access
///
/// Only http(s) URLs with a host are accepted.
pub fn validate_url(raw: &str) -> RefDataResult<url::Url> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| RefDataError::Configuration(format!("Invalid URL '{}': {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RefDataError::Configuration(format!(
                "Unsupported URL scheme '{}' in '{}'",
                other, raw
            )))
        }
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(RefDataError::Configuration(format!(
            "URL '{}' has no host",
            raw
        ))),
    }
}
