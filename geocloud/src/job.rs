//! Conversion jobs and their outcomes.
//!
//! A [`ConversionJob`] converts exactly one input file. Jobs are derived from
//! layer descriptors by the resolver and discarded at the end of the run.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::JobError;
use crate::layer::LayerKind;

/// One input file to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Owning layer name.
    pub layer: String,

    /// Absolute path of the source file.
    pub input_path: PathBuf,

    /// Absolute path of the file the tool writes.
    pub output_path: PathBuf,

    /// Inherited from the owning layer.
    pub kind: LayerKind,

    /// Identity suffix appended to the layer name, if any.
    pub sub_id: Option<String>,
}

impl ConversionJob {
    /// Builds a job whose output is `{output_root}/{layer}[_{sub_id}].{ext}`.
    pub fn new(
        layer: impl Into<String>,
        input_path: impl Into<PathBuf>,
        output_root: &Path,
        kind: LayerKind,
        sub_id: Option<String>,
    ) -> Self {
        let layer = layer.into();
        let output_path = output_root.join(output_file_name(&layer, sub_id.as_deref(), kind));
        Self {
            layer,
            input_path: input_path.into(),
            output_path,
            kind,
            sub_id,
        }
    }

    /// `{layer}` or `{layer}_{sub_id}`.
    pub fn identity(&self) -> String {
        match &self.sub_id {
            Some(sub_id) => format!("{}_{}", self.layer, sub_id),
            None => self.layer.clone(),
        }
    }
}

impl fmt::Display for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} -> {})",
            self.identity(),
            self.input_path.display(),
            self.output_path.display()
        )
    }
}

/// Output file name for a layer and optional sub-identifier.
pub fn output_file_name(layer: &str, sub_id: Option<&str>, kind: LayerKind) -> String {
    match sub_id {
        Some(sub_id) => format!("{}_{}.{}", layer, sub_id, kind.output_extension()),
        None => format!("{}.{}", layer, kind.output_extension()),
    }
}

/// Outcome of running one job. Never left unresolved.
#[derive(Debug, Clone)]
pub enum JobResult {
    Success,
    Failure(JobError),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The failure cause, if any.
    pub fn error(&self) -> Option<&JobError> {
        match self {
            Self::Success => None,
            Self::Failure(e) => Some(e),
        }
    }
}

impl<E: Into<JobError>> From<Result<(), E>> for JobResult {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => JobResult::Success,
            Err(e) => JobResult::Failure(e.into()),
        }
    }
}

/// A job paired with its result, for deterministic reporting.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: ConversionJob,
    pub result: JobResult,
}
