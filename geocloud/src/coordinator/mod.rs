//! Run coordination.
//!
//! The [`RunCoordinator`] drives a complete run over a [`Catalog`]:
//!
//! ```text
//! Catalog ─► resolve layers (concurrently, blocking pool)
//!         ─► claim output paths in catalog order
//!         ─► schedule every layer's jobs (concurrently, shared limiter)
//!         ─► RunSummary from the reporter's events
//! ```
//!
//! A run never fails as a whole. Resolution problems, tool failures, panics
//! and cancellation all end up in the summary.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = RunCoordinator::from_config(&config, Arc::new(GdalConverter::new("gdal")));
//! let cancel = coordinator.cancel_handle();
//! ctrlc::set_handler(move || cancel.cancel())?;
//!
//! let summary = coordinator.run_all(&Catalog::builtin()).await;
//! ```

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::convert::Converter;
use crate::error::ResolutionError;
use crate::executor::{JobScheduler, ProcessLimiter};
use crate::job::ConversionJob;
use crate::layer::Catalog;
use crate::report::{EventSink, Reporter, RunEvent, RunSummary};
use crate::resolver::{FileResolver, Resolution};

/// Resolved work for one layer, after output claims.
#[derive(Debug, Clone)]
pub struct LayerPlan {
    pub layer: String,
    pub jobs: Vec<ConversionJob>,
    pub errors: Vec<ResolutionError>,
}

impl LayerPlan {
    fn from_resolution(resolution: Resolution) -> Self {
        Self {
            layer: resolution.layer,
            jobs: resolution.jobs,
            errors: resolution.errors,
        }
    }
}

/// Reporter and cancellation token of one run.
///
/// A fresh state is installed when a run starts after a finished one, so
/// events, timings and cancellation never leak between runs.
struct RunState {
    reporter: Arc<Reporter>,
    cancel: CancellationToken,
    requested: bool,
    finished: bool,
}

impl RunState {
    fn fresh() -> Self {
        Self {
            reporter: Arc::new(Reporter::new()),
            cancel: CancellationToken::new(),
            requested: false,
            finished: false,
        }
    }
}

/// Requests cancellation of a run from outside it (for example a signal
/// handler).
///
/// Cancelling before a run starts cancels that run. Cancelling after a run
/// finished applies to the next one.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<Mutex<RunState>>,
}

impl CancelHandle {
    /// Stops new jobs from starting. Safe to call more than once.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if state.finished {
            *state = RunState::fresh();
        }
        if !state.requested {
            state.requested = true;
            state.reporter.record(RunEvent::Cancelled);
        }
        state.cancel.cancel();
    }

    /// True if the current (or most recent) run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancel.is_cancelled()
    }
}

/// Drives resolution and execution of a whole catalog.
pub struct RunCoordinator {
    resolver: FileResolver,
    converter: Arc<dyn Converter>,
    limiter: Arc<ProcessLimiter>,
    state: Arc<Mutex<RunState>>,
}

impl RunCoordinator {
    /// Creates a coordinator around an existing resolver and limiter.
    pub fn new(
        resolver: FileResolver,
        converter: Arc<dyn Converter>,
        limiter: Arc<ProcessLimiter>,
    ) -> Self {
        Self {
            resolver,
            converter,
            limiter,
            state: Arc::new(Mutex::new(RunState::fresh())),
        }
    }

    /// Creates a coordinator over the filesystem roots and budget in `config`.
    pub fn from_config(config: &RunConfig, converter: Arc<dyn Converter>) -> Self {
        let resolver = FileResolver::new(&config.input_root, &config.output_root);
        let limiter = Arc::new(ProcessLimiter::new(config.max_concurrency, "conversions"));
        Self::new(resolver, converter, limiter)
    }

    /// Reporter of the current (or most recent) run.
    pub fn reporter(&self) -> Arc<Reporter> {
        Arc::clone(&self.state.lock().reporter)
    }

    pub fn limiter(&self) -> &Arc<ProcessLimiter> {
        &self.limiter
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Resolves every layer without running anything.
    pub async fn plan(&self, catalog: &Catalog) -> Vec<LayerPlan> {
        let resolutions = self.resolve_all(catalog).await;
        claim_outputs(resolutions)
    }

    /// Runs every layer in `catalog` and returns the summary.
    ///
    /// Each call is an independent run with its own events and timing.
    pub async fn run_all(&self, catalog: &Catalog) -> RunSummary {
        let started = Instant::now();
        let (reporter, cancel) = self.begin_run();
        let sink: Arc<dyn EventSink> = reporter.clone();
        let scheduler = JobScheduler::new(
            Arc::clone(&self.limiter),
            Arc::clone(&self.converter),
            sink,
            cancel,
        );

        info!(
            layers = catalog.len(),
            input_root = %self.resolver.input_root().display(),
            output_root = %self.resolver.output_root().display(),
            max_concurrency = self.limiter.permits(),
            "Starting run"
        );

        let plans = self.plan(catalog).await;

        for plan in &plans {
            reporter.record(RunEvent::LayerResolved {
                layer: plan.layer.clone(),
                jobs: plan.jobs.len(),
                errors: plan.errors.len(),
            });
            for error in &plan.errors {
                reporter.record(RunEvent::ResolutionFailed {
                    layer: plan.layer.clone(),
                    error: error.clone(),
                });
            }
        }

        // Layer-level futures hold no permits; only conversions do.
        let batches = plans
            .into_iter()
            .filter(|plan| !plan.jobs.is_empty())
            .map(|plan| scheduler.run(plan.jobs));
        join_all(batches).await;

        self.state.lock().finished = true;

        let events = reporter.events();
        let summary = RunSummary::from_events(catalog.len(), &events, started.elapsed());
        info!(
            total_jobs = summary.total_jobs,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            skipped = summary.skipped_unmatched,
            resolution_errors = summary.resolution_errors,
            elapsed_secs = summary.elapsed_secs,
            "Run finished"
        );
        summary
    }

    fn begin_run(&self) -> (Arc<Reporter>, CancellationToken) {
        let mut state = self.state.lock();
        if state.finished {
            *state = RunState::fresh();
        }
        (Arc::clone(&state.reporter), state.cancel.clone())
    }

    async fn resolve_all(&self, catalog: &Catalog) -> Vec<Resolution> {
        let handles = catalog.iter().cloned().map(|layer| {
            let resolver = self.resolver.clone();
            tokio::task::spawn_blocking(move || resolver.resolve(&layer))
        });
        let joined = join_all(handles).await;

        joined
            .into_iter()
            .zip(catalog.iter())
            .map(|(result, layer)| match result {
                Ok(resolution) => resolution,
                Err(e) => {
                    error!(layer = %layer.name, reason = %e, "Resolver task failed");
                    Resolution {
                        layer: layer.name.clone(),
                        jobs: Vec::new(),
                        errors: vec![ResolutionError::listing(
                            self.resolver.input_root().join(&layer.source_path),
                            io::Error::new(io::ErrorKind::Other, e.to_string()),
                        )],
                    }
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("resolver", &self.resolver)
            .field("limiter", &self.limiter)
            .finish()
    }
}

/// Gives each output path to the first job that claims it, in catalog order.
///
/// Later jobs with the same output become `DuplicateOutput` errors of their
/// own layer and are not dispatched.
fn claim_outputs(resolutions: Vec<Resolution>) -> Vec<LayerPlan> {
    let mut owners: HashMap<PathBuf, String> = HashMap::new();

    resolutions
        .into_iter()
        .map(|resolution| {
            let mut plan = LayerPlan::from_resolution(resolution);
            let jobs = std::mem::take(&mut plan.jobs);
            for job in jobs {
                match owners.get(&job.output_path) {
                    Some(owner) => plan.errors.push(ResolutionError::DuplicateOutput {
                        path: job.output_path.clone(),
                        owner: owner.clone(),
                    }),
                    None => {
                        owners.insert(job.output_path.clone(), job.layer.clone());
                        plan.jobs.push(job);
                    }
                }
            }
            plan
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConversionError, JobError};
    use crate::job::JobResult;
    use crate::layer::{LayerDescriptor, LayerKind};
    use crate::resolver::DirectoryLister;
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashSet};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records every job it sees; fails jobs whose input stem is "broken".
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<ConversionJob>>,
        delay: Duration,
    }

    impl Converter for Recording {
        fn convert(&self, job: &ConversionJob) -> JobResult {
            std::thread::sleep(self.delay);
            self.seen.lock().push(job.clone());
            if job.input_path.file_stem().and_then(|s| s.to_str()) == Some("broken") {
                return JobResult::Failure(JobError::Conversion(ConversionError::ToolFailed {
                    program: "gdal".into(),
                    code: Some(1),
                    stderr: "corrupt".into(),
                }));
            }
            JobResult::Success
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn coordinator(input: &Path, output: &Path, converter: Arc<dyn Converter>) -> RunCoordinator {
        RunCoordinator::new(
            FileResolver::new(input, output),
            converter,
            Arc::new(ProcessLimiter::new(2, "test")),
        )
    }

    #[test]
    fn test_claim_outputs_rejects_later_duplicates() {
        let out = Path::new("/out");
        let first = Resolution {
            layer: "a".into(),
            jobs: vec![ConversionJob::new("a", "/in/x.shp", out, LayerKind::Vector, Some("1".into()))],
            errors: vec![],
        };
        // same identity produced by a second descriptor
        let second = Resolution {
            layer: "a".into(),
            jobs: vec![
                ConversionJob::new("a", "/in/y.shp", out, LayerKind::Vector, Some("1".into())),
                ConversionJob::new("a", "/in/z.shp", out, LayerKind::Vector, Some("2".into())),
            ],
            errors: vec![],
        };

        let plans = claim_outputs(vec![first, second]);

        assert_eq!(plans[0].jobs.len(), 1);
        assert_eq!(plans[0].jobs[0].input_path, PathBuf::from("/in/x.shp"));
        assert_eq!(plans[1].jobs.len(), 1);
        assert_eq!(plans[1].jobs[0].sub_id.as_deref(), Some("2"));
        assert!(matches!(
            plans[1].errors[0],
            ResolutionError::DuplicateOutput { ref owner, .. } if owner == "a"
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_all_mixed_outcomes() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        touch(&input.path().join("dem.tif"));
        touch(&input.path().join("Roads/roads_25k.shp"));
        touch(&input.path().join("Roads/broken.shp"));

        let catalog = Catalog::new(vec![
            LayerDescriptor::single("dem", "dem.tif", LayerKind::Raster),
            LayerDescriptor::flat_listing("roads", "Roads", LayerKind::Vector, ["25k", "broken"]),
            LayerDescriptor::single("missing", "nope.tif", LayerKind::Raster),
        ])
        .unwrap();

        let converter = Arc::new(Recording::default());
        let coordinator = coordinator(input.path(), output.path(), converter.clone());
        let summary = coordinator.run_all(&catalog).await;

        assert_eq!(summary.layers, 3);
        assert_eq!(summary.total_jobs, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.resolution_errors, 1);
        assert_eq!(converter.seen.lock().len(), 3);
        assert!(!summary.is_clean());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_plan_runs_nothing() {
        let input = TempDir::new().unwrap();
        touch(&input.path().join("dem.tif"));
        let catalog =
            Catalog::new(vec![LayerDescriptor::single("dem", "dem.tif", LayerKind::Raster)]).unwrap();

        let converter = Arc::new(Recording::default());
        let coordinator = coordinator(input.path(), Path::new("/out"), converter.clone());
        let plans = coordinator.plan(&catalog).await;

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].jobs[0].output_path, PathBuf::from("/out/dem.tif"));
        assert!(converter.seen.lock().is_empty());
        assert!(coordinator.reporter().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_before_run() {
        let input = TempDir::new().unwrap();
        for i in 0..3 {
            touch(&input.path().join(format!("Roads/roads_{}.shp", i)));
        }
        let catalog = Catalog::new(vec![LayerDescriptor::flat_listing(
            "roads",
            "Roads",
            LayerKind::Vector,
            ["0", "1", "2"],
        )])
        .unwrap();

        let converter = Arc::new(Recording::default());
        let coordinator = coordinator(input.path(), Path::new("/out"), converter.clone());
        let handle = coordinator.cancel_handle();
        handle.cancel();
        handle.cancel();

        let summary = coordinator.run_all(&catalog).await;

        assert!(handle.is_cancelled());
        assert_eq!(summary.cancelled, 3);
        assert!(summary.was_cancelled());
        assert!(converter.seen.lock().is_empty());
        let cancelled_events = coordinator
            .reporter()
            .events()
            .iter()
            .filter(|e| matches!(e, RunEvent::Cancelled))
            .count();
        assert_eq!(cancelled_events, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_layers_share_one_budget() {
        let input = TempDir::new().unwrap();
        let mut layers = Vec::new();
        for l in 0..3 {
            for i in 0..4 {
                touch(&input.path().join(format!("L{}/f_{}.shp", l, i)));
            }
            layers.push(LayerDescriptor::flat_listing(
                format!("layer{}", l),
                format!("L{}", l),
                LayerKind::Vector,
                ["0", "1", "2", "3"],
            ));
        }
        let catalog = Catalog::new(layers).unwrap();

        let converter = Arc::new(Recording {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let coordinator = coordinator(input.path(), Path::new("/out"), converter);
        let summary = coordinator.run_all(&catalog).await;

        assert_eq!(summary.succeeded, 12);
        assert!(coordinator.limiter().peak_in_flight() <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_run_reports_only_its_own_jobs() {
        let input = TempDir::new().unwrap();
        touch(&input.path().join("Roads/roads_25k.shp"));
        touch(&input.path().join("Roads/roads_50k.shp"));
        let catalog = Catalog::new(vec![LayerDescriptor::flat_listing(
            "roads",
            "Roads",
            LayerKind::Vector,
            ["25k", "50k"],
        )])
        .unwrap();

        let converter = Arc::new(Recording::default());
        let coordinator = coordinator(input.path(), Path::new("/out"), converter.clone());
        let first = coordinator.run_all(&catalog).await;
        let second = coordinator.run_all(&catalog).await;

        assert_eq!(first.total_jobs, 2);
        assert_eq!(second.total_jobs, first.total_jobs);
        assert_eq!(second.succeeded, first.succeeded);
        assert_eq!(second.per_layer, first.per_layer);
        assert_eq!(second.failures.len(), first.failures.len());
        assert_eq!(converter.seen.lock().len(), 4);
        assert_eq!(coordinator.reporter().summary(1).total_jobs, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_does_not_carry_into_next_run() {
        let input = TempDir::new().unwrap();
        touch(&input.path().join("dem.tif"));
        let catalog =
            Catalog::new(vec![LayerDescriptor::single("dem", "dem.tif", LayerKind::Raster)]).unwrap();

        let converter = Arc::new(Recording::default());
        let coordinator = coordinator(input.path(), Path::new("/out"), converter.clone());
        let handle = coordinator.cancel_handle();

        handle.cancel();
        let cancelled = coordinator.run_all(&catalog).await;
        assert_eq!(cancelled.cancelled, 1);
        assert!(handle.is_cancelled());

        let rerun = coordinator.run_all(&catalog).await;
        assert_eq!(rerun.succeeded, 1);
        assert_eq!(rerun.cancelled, 0);
        assert!(!handle.is_cancelled());

        // cancelling between runs applies to the next one
        handle.cancel();
        let next = coordinator.run_all(&catalog).await;
        assert_eq!(next.cancelled, 1);
        assert_eq!(converter.seen.lock().len(), 1);
    }

    /// In-memory file tree.
    struct MemoryLister {
        files: BTreeSet<PathBuf>,
    }

    impl DirectoryLister for MemoryLister {
        fn is_file(&self, path: &Path) -> bool {
            self.files.contains(path)
        }

        fn is_dir(&self, path: &Path) -> bool {
            self.files.iter().any(|f| f.parent() == Some(path))
        }

        fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
            Ok(self
                .files
                .iter()
                .filter(|f| f.parent() == Some(dir))
                .cloned()
                .collect())
        }

        fn list_dirs(&self, _dir: &Path) -> io::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    mod property_tests {
        use super::*;

        proptest! {
            #[test]
            fn test_dispatched_outputs_are_unique(
                roads in prop::collection::btree_set("[a-c]{1,2}_(25k|50k)", 0..6),
                rivers in prop::collection::btree_set("[a-c]{1,2}_(25k|50k)", 0..6),
                with_single in any::<bool>(),
            ) {
                let mut files: BTreeSet<PathBuf> = roads
                    .iter()
                    .map(|stem| PathBuf::from(format!("/in/Roads/{}.shp", stem)))
                    .chain(rivers.iter().map(|stem| PathBuf::from(format!("/in/Rivers/{}.shp", stem))))
                    .collect();

                let mut layers = vec![LayerDescriptor::flat_listing(
                    "roads",
                    "Roads",
                    LayerKind::Vector,
                    ["25k", "50k"],
                )];
                if with_single {
                    // same output name as the roads 25k sub-layer
                    files.insert(PathBuf::from("/in/roads_25k.shp"));
                    layers.push(LayerDescriptor::single("roads_25k", "roads_25k.shp", LayerKind::Vector));
                }
                layers.push(LayerDescriptor::flat_listing(
                    "rivers",
                    "Rivers",
                    LayerKind::Vector,
                    ["25k", "50k"],
                ));

                let resolver = FileResolver::new("/in", "/out")
                    .with_lister(Arc::new(MemoryLister { files }));
                let resolutions: Vec<Resolution> = layers.iter().map(|l| resolver.resolve(l)).collect();
                let resolved: HashSet<PathBuf> = resolutions
                    .iter()
                    .flat_map(|r| r.jobs.iter().map(|j| j.output_path.clone()))
                    .collect();
                let resolved_jobs: usize = resolutions.iter().map(|r| r.jobs.len()).sum();

                let plans = claim_outputs(resolutions);
                let dispatched: Vec<PathBuf> = plans
                    .iter()
                    .flat_map(|p| p.jobs.iter().map(|j| j.output_path.clone()))
                    .collect();
                let unique: HashSet<PathBuf> = dispatched.iter().cloned().collect();
                let duplicates = plans
                    .iter()
                    .flat_map(|p| p.errors.iter())
                    .filter(|e| matches!(e, ResolutionError::DuplicateOutput { .. }))
                    .count();

                prop_assert_eq!(unique.len(), dispatched.len());
                prop_assert_eq!(&unique, &resolved);
                prop_assert_eq!(dispatched.len() + duplicates, resolved_jobs);
            }
        }
    }
}
