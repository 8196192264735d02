//! Configuration file discovery, TOML loading and storage root resolution
//!
//! Resolution priority for both the config file and the storage root:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file (storage root only)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name used under the platform config/data directories
pub const APP_DIR_NAME: &str = "tonewiki";

/// Logging configuration shared by every tonewiki binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate a config file by name
///
/// Returns the first existing candidate: explicit CLI path, then the path in
/// `env_var_name`, then `<config_dir>/tonewiki/<file_name>`, then (Linux only)
/// `/etc/tonewiki/<file_name>`. An explicit CLI or env path is returned even if
/// it does not exist so the caller can report it.
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join(file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the local storage root
///
/// `toml_value` is whatever the loaded TOML file specified, if anything.
pub fn resolve_storage_root(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
    subdir: &str,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_storage_root(subdir)
}

/// Get OS-dependent default storage folder
pub fn default_storage_root(subdir: &str) -> PathBuf {
    let base = if cfg!(target_os = "linux") {
        // ~/.local/share/tonewiki (or /var/lib/tonewiki for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/var/lib").join(APP_DIR_NAME))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/tonewiki
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support").join(APP_DIR_NAME))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\tonewiki
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData").join(APP_DIR_NAME))
    } else {
        PathBuf::from("./tonewiki_data")
    };

    base.join(subdir)
}

/// Load a TOML file into `T`
///
/// A missing file is not an error: defaults are returned and a warning logged.
/// A file that exists but cannot be read or parsed is a configuration error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using built-in defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(parsed)
}
