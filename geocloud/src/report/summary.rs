//! Run summary built from the event stream.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::events::RunEvent;
use crate::error::{JobError, ResolutionError};
use crate::job::JobResult;

/// Per-layer job counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayerCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped_unmatched: usize,
    pub resolution_errors: usize,
}

/// One failure, with its structured cause.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub layer: String,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub category: &'static str,
    pub reason: String,
    #[serde(skip)]
    pub error: JobError,
}

impl FailureRecord {
    fn from_resolution(layer: &str, error: &ResolutionError) -> Self {
        let (input, output) = match error {
            ResolutionError::MissingSource { path }
            | ResolutionError::UnmatchedFile { path, .. }
            | ResolutionError::Listing { path, .. } => (Some(path.clone()), None),
            ResolutionError::DuplicateOutput { path, .. } => (None, Some(path.clone())),
        };
        let error = JobError::from(error.clone());
        Self {
            layer: layer.to_string(),
            input,
            output,
            category: error.category(),
            reason: error.to_string(),
            error,
        }
    }
}

/// Final outcome of a run. Serializable for machine consumption.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub layers: usize,
    pub total_jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped_unmatched: usize,
    pub resolution_errors: usize,
    pub elapsed_secs: f64,
    pub per_layer: BTreeMap<String, LayerCounts>,
    /// Sorted by layer, then output, then input.
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    /// Aggregates `events` into a summary.
    pub fn from_events<'a>(
        layers: usize,
        events: impl IntoIterator<Item = &'a RunEvent>,
        elapsed: Duration,
    ) -> Self {
        let mut summary = RunSummary {
            layers,
            elapsed_secs: elapsed.as_secs_f64(),
            ..Default::default()
        };

        for event in events {
            match event {
                RunEvent::ResolutionFailed { layer, error } => {
                    let counts = summary.per_layer.entry(layer.clone()).or_default();
                    if error.is_unmatched() {
                        summary.skipped_unmatched += 1;
                        counts.skipped_unmatched += 1;
                    } else {
                        summary.resolution_errors += 1;
                        counts.resolution_errors += 1;
                    }
                    summary
                        .failures
                        .push(FailureRecord::from_resolution(layer, error));
                }
                RunEvent::JobFinished { job, result, .. } => {
                    summary.total_jobs += 1;
                    let counts = summary.per_layer.entry(job.layer.clone()).or_default();
                    match result {
                        JobResult::Success => {
                            summary.succeeded += 1;
                            counts.succeeded += 1;
                        }
                        JobResult::Failure(error) => {
                            if matches!(error, JobError::Cancelled) {
                                summary.cancelled += 1;
                                counts.cancelled += 1;
                            } else {
                                summary.failed += 1;
                                counts.failed += 1;
                            }
                            summary.failures.push(FailureRecord {
                                layer: job.layer.clone(),
                                input: Some(job.input_path.clone()),
                                output: Some(job.output_path.clone()),
                                category: error.category(),
                                reason: error.to_string(),
                                error: error.clone(),
                            });
                        }
                    }
                }
                RunEvent::LayerResolved { layer, .. } => {
                    summary.per_layer.entry(layer.clone()).or_default();
                }
                RunEvent::JobStarted { .. } | RunEvent::Cancelled => {}
            }
        }

        summary.failures.sort_by(|a, b| {
            (&a.layer, &a.output, &a.input).cmp(&(&b.layer, &b.output, &b.input))
        });
        summary
    }

    /// True when every job succeeded and nothing was skipped or rejected.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
            && self.cancelled == 0
            && self.skipped_unmatched == 0
            && self.resolution_errors == 0
    }

    /// True when at least one job was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }

    /// Serializes the summary as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::job::ConversionJob;
    use crate::layer::LayerKind;
    use std::path::Path;

    fn finished(layer: &str, sub: &str, result: JobResult) -> RunEvent {
        RunEvent::JobFinished {
            job: ConversionJob::new(
                layer,
                format!("/in/{}_{}.shp", layer, sub),
                Path::new("/out"),
                LayerKind::Vector,
                Some(sub.to_string()),
            ),
            result,
            elapsed: Duration::from_millis(1),
        }
    }

    fn tool_failed() -> JobResult {
        JobResult::Failure(JobError::Conversion(ConversionError::ToolFailed {
            program: "gdal".into(),
            code: Some(1),
            stderr: "bad geometry".into(),
        }))
    }

    #[test]
    fn test_counts() {
        let events = vec![
            RunEvent::LayerResolved {
                layer: "roads".into(),
                jobs: 3,
                errors: 1,
            },
            finished("roads", "50k", tool_failed()),
            finished("roads", "25k", JobResult::Success),
            finished("roads", "250k", JobResult::Failure(JobError::Cancelled)),
            RunEvent::ResolutionFailed {
                layer: "roads".into(),
                error: ResolutionError::UnmatchedFile {
                    path: "/in/roads/x.shp".into(),
                    sub_ids: vec!["25k".into()],
                },
            },
            RunEvent::ResolutionFailed {
                layer: "dem".into(),
                error: ResolutionError::MissingSource {
                    path: "/in/dem.tif".into(),
                },
            },
        ];

        let summary = RunSummary::from_events(2, &events, Duration::from_secs(2));

        assert_eq!(summary.layers, 2);
        assert_eq!(summary.total_jobs, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.skipped_unmatched, 1);
        assert_eq!(summary.resolution_errors, 1);
        assert_eq!(summary.failures.len(), 4);
        assert!(!summary.is_clean());
        assert!(summary.was_cancelled());

        let roads = &summary.per_layer["roads"];
        assert_eq!(roads.succeeded, 1);
        assert_eq!(roads.skipped_unmatched, 1);

        // sorted by layer first
        assert_eq!(summary.failures[0].layer, "dem");
        assert_eq!(summary.failures[0].category, "missing_source");
    }

    #[test]
    fn test_failure_keeps_structured_cause() {
        let events = vec![finished("roads", "25k", tool_failed())];
        let summary = RunSummary::from_events(1, &events, Duration::ZERO);

        match &summary.failures[0].error {
            JobError::Conversion(ConversionError::ToolFailed { code, .. }) => {
                assert_eq!(*code, Some(1))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_clean_summary_and_json() {
        let events = vec![finished("roads", "25k", JobResult::Success)];
        let summary = RunSummary::from_events(1, &events, Duration::from_millis(1500));
        assert!(summary.is_clean());

        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failures"].as_array().unwrap().len(), 0);
        assert_eq!(json["per_layer"]["roads"]["succeeded"], 1);
    }

    #[test]
    fn test_json_failure_has_no_error_field() {
        let events = vec![finished("roads", "25k", tool_failed())];
        let summary = RunSummary::from_events(1, &events, Duration::ZERO);
        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();

        let failure = &json["failures"][0];
        assert_eq!(failure["category"], "conversion");
        assert_eq!(failure["output"], "/out/roads_25k.fgb");
        assert!(failure.get("error").is_none());
    }
}
