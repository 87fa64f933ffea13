//! Error taxonomy for catalog validation, file resolution and conversion.
//!
//! Only [`ConfigurationError`] is fatal: it is raised before any work is
//! dispatched. Resolution and conversion errors are always recovered into a
//! per-job [`JobError`] and reported in the run summary.
//!
//! I/O causes are stored behind an `Arc` so errors can be cloned into the
//! event stream while keeping the underlying `io::Error` as their source.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// A malformed layer catalog or run configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The catalog contains no layers.
    #[error("catalog contains no layers")]
    EmptyCatalog,

    /// A layer has an empty name.
    #[error("layer #{index} has an empty name")]
    EmptyLayerName { index: usize },

    /// Two layers share the same name.
    #[error("duplicate layer name '{0}'")]
    DuplicateLayer(String),

    /// A flat multi-file layer declares no sub-identifiers.
    #[error("layer '{0}' uses a flat multi-file layout but declares no sub-identifiers")]
    MissingSubIdentifiers(String),

    /// A sub-identifier is empty.
    #[error("layer '{0}' declares an empty sub-identifier")]
    EmptySubIdentifier(String),

    /// A sub-identifier is declared twice.
    #[error("layer '{layer}' declares sub-identifier '{sub_id}' more than once")]
    DuplicateSubIdentifier { layer: String, sub_id: String },

    /// Explicit source ids do not pair up with sub-identifiers.
    #[error("layer '{layer}' declares {source_ids} source ids for {sub_ids} sub-identifiers")]
    SourceIdMismatch {
        layer: String,
        source_ids: usize,
        sub_ids: usize,
    },

    /// A catalog file could not be read or parsed.
    #[error("invalid catalog file {}: {reason}", .path.display())]
    CatalogFile { path: PathBuf, reason: String },

    /// A configuration file could not be read or parsed.
    #[error("invalid configuration file {}: {reason}", .path.display())]
    ConfigFile { path: PathBuf, reason: String },

    /// A configuration value is out of range or unparsable.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Failure to turn a layer descriptor into concrete input files.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// The layer's source file or directory does not exist.
    #[error("source path does not exist: {}", .path.display())]
    MissingSource { path: PathBuf },

    /// A file matched none of the layer's sub-identifiers.
    #[error("{} matches none of the sub-identifiers [{}]", .path.display(), .sub_ids.join(", "))]
    UnmatchedFile { path: PathBuf, sub_ids: Vec<String> },

    /// Another job already claimed this output path.
    #[error("output {} is already produced by layer '{owner}'", .path.display())]
    DuplicateOutput { path: PathBuf, owner: String },

    /// Listing a source directory failed.
    #[error("failed to list {}: {source}", .path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl ResolutionError {
    /// Wraps an I/O error raised while listing `path`.
    pub fn listing(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Listing {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true for files skipped because no sub-identifier matched.
    pub fn is_unmatched(&self) -> bool {
        matches!(self, Self::UnmatchedFile { .. })
    }
}

/// Failure of one external conversion process.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// The tool could not be started.
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// The tool exited unsuccessfully.
    #[error("'{program}' exited with {}: {stderr}", describe_exit(.code))]
    ToolFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tool exited cleanly but did not produce its output.
    #[error("'{program}' reported success but {} was not written", .path.display())]
    MissingOutput { program: String, path: PathBuf },

    /// The output directory could not be created.
    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl ConversionError {
    /// Wraps a process launch failure.
    pub fn launch(program: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source: Arc::new(source),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Why a single job did not succeed.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// The job was rejected during resolution.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The external tool failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The run was cancelled before the job acquired a worker.
    #[error("cancelled before start")]
    Cancelled,

    /// The worker running the job panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Short machine-readable category for summaries.
    pub fn category(&self) -> &'static str {
        match self {
            JobError::Resolution(ResolutionError::UnmatchedFile { .. }) => "unmatched_file",
            JobError::Resolution(ResolutionError::MissingSource { .. }) => "missing_source",
            JobError::Resolution(ResolutionError::DuplicateOutput { .. }) => "duplicate_output",
            JobError::Resolution(ResolutionError::Listing { .. }) => "listing",
            JobError::Conversion(_) => "conversion",
            JobError::Cancelled => "cancelled",
            JobError::Panicked(_) => "panicked",
        }
    }
}
