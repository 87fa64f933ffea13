//! CLI error types.

use std::fmt;

use geocloud::error::ConfigurationError;

/// Exit status for configuration and startup failures.
pub const EXIT_STARTUP: i32 = 2;

/// Errors that stop a command before or outside a run.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration, catalog, or flag value.
    Config(ConfigurationError),

    /// Logging could not be set up.
    Logging(String),

    /// The conversion tool is not installed or not runnable.
    Tool(String),

    /// Failed to create the Tokio runtime.
    Runtime(String),

    /// Writing output (summary file, stdout) failed.
    Output(String),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        EXIT_STARTUP
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Logging(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Tool(msg) => write!(f, "Conversion tool unavailable: {}", msg),
            CliError::Runtime(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for CliError {
    fn from(e: ConfigurationError) -> Self {
        CliError::Config(e)
    }
}
