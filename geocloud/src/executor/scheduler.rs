//! Bounded job scheduler.
//!
//! [`JobScheduler::run`] spawns every job up front. Each job waits for a
//! [`ProcessLimiter`] permit, then runs its conversion on the blocking pool.
//! Whatever happens to one job (tool failure, panic, cancellation) becomes
//! that job's [`JobResult`]; siblings are unaffected.
//!
//! The scheduler is cheap to clone and safe to call concurrently: all clones
//! share the same limiter, so the total number of external processes stays
//! within one budget no matter how many `run` calls are in progress.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::limiter::ProcessLimiter;
use crate::convert::Converter;
use crate::error::JobError;
use crate::job::{ConversionJob, JobOutcome, JobResult};
use crate::report::{EventSink, RunEvent};

/// Runs conversion jobs under a shared concurrency budget.
#[derive(Clone)]
pub struct JobScheduler {
    limiter: Arc<ProcessLimiter>,
    converter: Arc<dyn Converter>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl JobScheduler {
    pub fn new(
        limiter: Arc<ProcessLimiter>,
        converter: Arc<dyn Converter>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            limiter,
            converter,
            sink,
            cancel,
        }
    }

    /// Runs `jobs` and returns one outcome per job, in submission order.
    ///
    /// Must be called from within a multi-threaded Tokio runtime.
    pub async fn run(&self, jobs: Vec<ConversionJob>) -> Vec<JobOutcome> {
        debug!(
            jobs = jobs.len(),
            permits = self.limiter.permits(),
            "Scheduling batch"
        );

        let handles: Vec<_> = jobs
            .iter()
            .cloned()
            .map(|job| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.run_one(job).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (job, handle) in jobs.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // run_one itself never panics; this covers runtime shutdown
                    let result = JobResult::Failure(JobError::Panicked(e.to_string()));
                    self.finish(job.clone(), result.clone(), Instant::now());
                    JobOutcome { job, result }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_one(&self, job: ConversionJob) -> JobOutcome {
        let queued = Instant::now();

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.limiter.acquire() => permit,
        };

        let permit = match permit {
            Some(permit) if !self.cancel.is_cancelled() => permit,
            _ => {
                let result = JobResult::Failure(JobError::Cancelled);
                self.finish(job.clone(), result.clone(), queued);
                return JobOutcome { job, result };
            }
        };

        self.sink.record(RunEvent::JobStarted { job: job.clone() });
        let started = Instant::now();

        let converter = Arc::clone(&self.converter);
        let blocking_job = job.clone();
        let result = match tokio::task::spawn_blocking(move || converter.convert(&blocking_job))
            .await
        {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                JobResult::Failure(JobError::Panicked(panic_message(e.into_panic())))
            }
            Err(e) => JobResult::Failure(JobError::Panicked(e.to_string())),
        };
        drop(permit);

        self.finish(job.clone(), result.clone(), started);
        JobOutcome { job, result }
    }

    fn finish(&self, job: ConversionJob, result: JobResult, since: Instant) {
        self.sink.record(RunEvent::JobFinished {
            job,
            result,
            elapsed: since.elapsed(),
        });
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("limiter", &self.limiter)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::layer::LayerKind;
    use crate::report::Reporter;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn jobs(n: usize) -> Vec<ConversionJob> {
        (0..n)
            .map(|i| {
                ConversionJob::new(
                    "layer",
                    format!("/in/file_{}.shp", i),
                    Path::new("/out"),
                    LayerKind::Vector,
                    Some(format!("{}", i)),
                )
            })
            .collect()
    }

    /// Fails (or panics) for one chosen job, succeeds for the rest.
    struct FailOne {
        bad: String,
        panic: bool,
        delay: Duration,
    }

    impl Converter for FailOne {
        fn convert(&self, job: &ConversionJob) -> JobResult {
            std::thread::sleep(self.delay);
            if job.sub_id.as_deref() == Some(self.bad.as_str()) {
                if self.panic {
                    panic!("converter exploded");
                }
                return JobResult::Failure(JobError::Conversion(ConversionError::ToolFailed {
                    program: "gdal".into(),
                    code: Some(1),
                    stderr: "bad".into(),
                }));
            }
            JobResult::Success
        }
    }

    /// Tracks the maximum number of concurrent conversions.
    struct Gauge {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl Converter for Gauge {
        fn convert(&self, _job: &ConversionJob) -> JobResult {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.current.fetch_sub(1, Ordering::SeqCst);
            JobResult::Success
        }
    }

    struct Harness {
        scheduler: JobScheduler,
        reporter: Arc<Reporter>,
        limiter: Arc<ProcessLimiter>,
        cancel: CancellationToken,
    }

    fn harness(permits: usize, converter: Arc<dyn Converter>) -> Harness {
        let reporter = Arc::new(Reporter::new());
        let limiter = Arc::new(ProcessLimiter::new(permits, "test"));
        let cancel = CancellationToken::new();
        let scheduler = JobScheduler::new(
            Arc::clone(&limiter),
            converter,
            reporter.clone(),
            cancel.clone(),
        );
        Harness {
            scheduler,
            reporter,
            limiter,
            cancel,
        }
    }

    fn scheduler(permits: usize, converter: Arc<dyn Converter>) -> (JobScheduler, Arc<Reporter>) {
        let h = harness(permits, converter);
        (h.scheduler, h.reporter)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_failure_is_isolated() {
        for (n, permits) in [(1, 1), (5, 1), (8, 3), (20, 8)] {
            let bad = format!("{}", n / 2);
            let converter = Arc::new(FailOne {
                bad: bad.clone(),
                panic: false,
                delay: Duration::from_millis(1),
            });
            let (scheduler, _) = scheduler(permits, converter);

            let outcomes = scheduler.run(jobs(n)).await;

            assert_eq!(outcomes.len(), n);
            let failures: Vec<_> = outcomes.iter().filter(|o| o.result.is_failure()).collect();
            assert_eq!(failures.len(), 1, "n={} permits={}", n, permits);
            assert_eq!(failures[0].job.sub_id.as_deref(), Some(bad.as_str()));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panic_is_captured() {
        let converter = Arc::new(FailOne {
            bad: "2".into(),
            panic: true,
            delay: Duration::ZERO,
        });
        let (scheduler, reporter) = scheduler(2, converter);

        let outcomes = scheduler.run(jobs(5)).await;

        assert_eq!(outcomes.iter().filter(|o| o.result.is_success()).count(), 4);
        match &outcomes[2].result {
            JobResult::Failure(JobError::Panicked(msg)) => {
                assert!(msg.contains("converter exploded"))
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(reporter.summary(1).failed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_results_in_submission_order() {
        let (scheduler, _) = scheduler(
            4,
            Arc::new(FailOne {
                bad: "none".into(),
                panic: false,
                delay: Duration::from_millis(2),
            }),
        );
        let input = jobs(10);
        let outcomes = scheduler.run(input.clone()).await;
        let returned: Vec<_> = outcomes.into_iter().map(|o| o.job).collect();
        assert_eq!(returned, input);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrency_capped_across_concurrent_runs() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
        });
        let Harness {
            scheduler, limiter, ..
        } = harness(3, gauge.clone());

        // three "layers" scheduled at once share one budget
        let (a, b, c) = tokio::join!(
            scheduler.run(jobs(6)),
            scheduler.run(jobs(6)),
            scheduler.run(jobs(6)),
        );

        assert_eq!(a.len() + b.len() + c.len(), 18);
        assert!(gauge.max.load(Ordering::SeqCst) <= 3);
        assert!(limiter.peak_in_flight() <= 3);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_before_start() {
        let Harness {
            scheduler,
            reporter,
            cancel,
            ..
        } = harness(
            1,
            Arc::new(FailOne {
                bad: "none".into(),
                panic: false,
                delay: Duration::ZERO,
            }),
        );
        cancel.cancel();

        let outcomes = scheduler.run(jobs(3)).await;

        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, JobResult::Failure(JobError::Cancelled))));
        let summary = reporter.summary(1);
        assert_eq!(summary.cancelled, 3);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_mid_run_lets_in_flight_finish() {
        let converter = Arc::new(FailOne {
            bad: "none".into(),
            panic: false,
            delay: Duration::from_millis(100),
        });
        let Harness {
            scheduler,
            cancel: token,
            ..
        } = harness(1, converter);

        let run = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(jobs(4)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();

        let outcomes = run.await.unwrap();
        let succeeded = outcomes.iter().filter(|o| o.result.is_success()).count();
        let cancelled = outcomes
            .iter()
            .filter(|o| matches!(o.result, JobResult::Failure(JobError::Cancelled)))
            .count();

        // the job holding the only permit completes; the rest never start
        assert!(succeeded >= 1);
        assert_eq!(succeeded + cancelled, 4);
        assert!(cancelled >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_batch() {
        let (scheduler, reporter) = scheduler(
            2,
            Arc::new(FailOne {
                bad: "none".into(),
                panic: false,
                delay: Duration::ZERO,
            }),
        );
        assert!(scheduler.run(Vec::new()).await.is_empty());
        assert!(reporter.is_empty());
    }
}
