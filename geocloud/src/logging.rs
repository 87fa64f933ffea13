//! Logging setup.
//!
//! Installs a `tracing` subscriber writing human-readable lines to stderr and,
//! optionally, to a log file. `RUST_LOG` overrides the configured level.

use std::path::{Path, PathBuf};

use thiserror::Error;
use time::macros::format_description;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub use tracing_appender::non_blocking::WorkerGuard;

/// Default filter when neither the config nor `RUST_LOG` set one.
pub const DEFAULT_LEVEL: &str = "info";

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `geocloud=debug`.
    pub level: String,
    /// Also write logs to this file (no ANSI colors).
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{level}': {reason}")]
    InvalidFilter { level: String, reason: String },

    #[error("cannot open log file {}: {reason}", .path.display())]
    LogFile { path: PathBuf, reason: String },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Installs the global subscriber.
///
/// When a log file is configured the returned guard must be kept alive for
/// the rest of the program; dropping it flushes and stops the file writer.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter(&config.level)?;
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let appender = file_appender(path)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guard)
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        level: level.to_string(),
        reason: e.to_string(),
    })
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let err = |reason: String| LoggingError::LogFile {
        path: path.to_path_buf(),
        reason,
    };

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| err("path has no file name".to_string()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| err(e.to_string()))
}
