//! Shared command setup: config file loading and logging.

use std::path::Path;

use geocloud::config::{ConfigFile, RunConfig};
use geocloud::logging::{self, LogConfig, WorkerGuard};
use tracing::info;

use crate::error::CliError;

/// Loaded configuration plus the logging guard for one command.
pub struct CliRunner {
    config: RunConfig,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Loads `config_path` (or the default config file, if present) and
    /// initializes logging.
    pub fn new(config_path: Option<&Path>, log: LogConfig) -> Result<Self, CliError> {
        let guard = logging::init(&log).map_err(|e| CliError::Logging(e.to_string()))?;

        let file = match config_path {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::load_default()?,
        };

        Ok(Self {
            config: RunConfig::default().merge_file(&file),
            _log_guard: guard,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = geocloud::VERSION,
            command,
            input_root = %self.config.input_root.display(),
            output_root = %self.config.output_root.display(),
            "GeoCloud starting"
        );
    }
}
