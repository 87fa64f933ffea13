//! Structured run events and the reporter that collects them.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::summary::RunSummary;
use crate::error::{JobError, ResolutionError};
use crate::job::{ConversionJob, JobResult};

/// Something that happened during a run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A layer was expanded into jobs.
    LayerResolved {
        layer: String,
        jobs: usize,
        errors: usize,
    },

    /// A file or source of a layer could not become a job.
    ResolutionFailed {
        layer: String,
        error: ResolutionError,
    },

    /// A job acquired a worker and launched its conversion.
    JobStarted { job: ConversionJob },

    /// A job reached its final result.
    JobFinished {
        job: ConversionJob,
        result: JobResult,
        elapsed: Duration,
    },

    /// Cancellation was requested.
    Cancelled,
}

/// Receives run events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: RunEvent);
}

/// Collects events, mirrors them to `tracing`, and builds the run summary.
#[derive(Debug)]
pub struct Reporter {
    events: Mutex<Vec<RunEvent>>,
    started: Instant,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Time since the reporter was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Builds the summary from the recorded events.
    pub fn summary(&self, layers: usize) -> RunSummary {
        let events = self.events.lock();
        RunSummary::from_events(layers, events.iter(), self.elapsed())
    }

    fn log(event: &RunEvent) {
        match event {
            RunEvent::LayerResolved {
                layer,
                jobs,
                errors,
            } => info!(layer = %layer, jobs, errors, "Layer resolved"),
            RunEvent::ResolutionFailed { layer, error } => {
                warn!(layer = %layer, reason = %error, "Resolution error")
            }
            RunEvent::JobStarted { job } => debug!(
                layer = %job.layer,
                input = %job.input_path.display(),
                output = %job.output_path.display(),
                "Job started"
            ),
            RunEvent::JobFinished {
                job,
                result,
                elapsed,
            } => match result {
                JobResult::Success => info!(
                    layer = %job.layer,
                    output = %job.output_path.display(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Job succeeded"
                ),
                JobResult::Failure(JobError::Cancelled) => debug!(
                    layer = %job.layer,
                    output = %job.output_path.display(),
                    "Job cancelled"
                ),
                JobResult::Failure(e) => error!(
                    layer = %job.layer,
                    input = %job.input_path.display(),
                    output = %job.output_path.display(),
                    reason = %e,
                    "Job failed"
                ),
            },
            RunEvent::Cancelled => warn!("Run cancelled; no new jobs will start"),
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for Reporter {
    fn record(&self, event: RunEvent) {
        Self::log(&event);
        self.events.lock().push(event);
    }
}
