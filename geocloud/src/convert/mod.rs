//! Conversion dispatch: one external tool invocation per job.
//!
//! The [`GdalConverter`] picks the command template for the job's
//! [`LayerKind`], runs it through a [`CommandRunner`] and maps the outcome to
//! a [`JobResult`]. Success requires both a zero exit status and the output
//! file on disk. Nothing is retried here.

mod command;

pub use command::{
    check_tool_available, raster_command, vector_command, CommandOutput, CommandRunner,
    CommandSpec, ProcessRunner, RASTER_CREATION_OPTIONS, TARGET_CRS,
};

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::ConversionError;
use crate::job::{ConversionJob, JobResult};
use crate::layer::LayerKind;

/// Default conversion tool.
pub const DEFAULT_TOOL: &str = "gdal";

/// Converts one job synchronously.
pub trait Converter: Send + Sync + 'static {
    /// Runs the conversion. Must not panic on tool failure.
    fn convert(&self, job: &ConversionJob) -> JobResult;
}

/// Converter that shells out to GDAL.
#[derive(Clone)]
pub struct GdalConverter {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl GdalConverter {
    /// Uses the real process runner.
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, Arc::new(ProcessRunner))
    }

    pub fn with_runner(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The command that would run for `job`.
    pub fn command_for(&self, job: &ConversionJob) -> CommandSpec {
        match job.kind {
            LayerKind::Raster => raster_command(&self.program, &job.input_path, &job.output_path),
            LayerKind::Vector => vector_command(&self.program, &job.input_path, &job.output_path),
        }
    }

    fn try_convert(&self, job: &ConversionJob) -> Result<(), ConversionError> {
        if let Some(parent) = job.output_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConversionError::OutputDirectory {
                path: parent.to_path_buf(),
                source: Arc::new(e),
            })?;
        }

        let spec = self.command_for(job);
        debug!(command = %spec, "Launching conversion");

        let output = self
            .runner
            .run(&spec)
            .map_err(|e| ConversionError::launch(&self.program, e))?;

        if !output.success() {
            return Err(ConversionError::ToolFailed {
                program: self.program.clone(),
                code: output.code,
                stderr: output.stderr,
            });
        }

        if !job.output_path.is_file() {
            return Err(ConversionError::MissingOutput {
                program: self.program.clone(),
                path: job.output_path.clone(),
            });
        }

        Ok(())
    }
}

impl Default for GdalConverter {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl std::fmt::Debug for GdalConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GdalConverter")
            .field("program", &self.program)
            .finish()
    }
}

impl Converter for GdalConverter {
    fn convert(&self, job: &ConversionJob) -> JobResult {
        let started = Instant::now();
        info!(
            layer = %job.layer,
            output = %job.output_path.display(),
            kind = %job.kind,
            "Running conversion"
        );
        let result = self.try_convert(job);
        debug!(
            output = %job.output_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Conversion finished"
        );
        result.into()
    }
}
