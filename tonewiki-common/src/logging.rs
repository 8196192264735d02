//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the configured level applies. When a
/// log file is configured, output is appended to it instead of stderr.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", logging.level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    result.map_err(|e| Error::Internal(format!("Tracing already initialized: {}", e)))
}
