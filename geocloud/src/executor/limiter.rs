//! Process-wide concurrency limiter for external conversions.
//!
//! Every conversion holds one permit for the whole lifetime of its external
//! process. There is exactly one limiter per run, shared by every scheduler
//! call, so scheduling layers concurrently never multiplies the budget:
//!
//! ```text
//! Total Permits: 8 (max_concurrency)
//! ├── layer "roads"     ─► file jobs ─┐
//! ├── layer "mangrove"  ─► file jobs ─┼─► one pool, ≤ 8 processes in flight
//! └── layer "dem"       ─► file job  ─┘
//! ```
//!
//! Layer-level work never holds a permit, which keeps nested scheduling
//! deadlock-free.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Lower bound on the number of permits.
pub const MIN_PERMITS: usize = 1;

/// Returns the host's available parallelism, at least [`MIN_PERMITS`].
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
        .max(MIN_PERMITS)
}

/// Bounded pool of permits for external processes.
#[derive(Debug)]
pub struct ProcessLimiter {
    semaphore: Arc<Semaphore>,

    permits: usize,

    /// Conversions currently holding a permit.
    in_flight: Arc<AtomicUsize>,

    /// Highest value `in_flight` has reached.
    peak_in_flight: Arc<AtomicUsize>,

    label: String,
}

impl ProcessLimiter {
    /// Creates a limiter with `permits` slots (clamped to at least one).
    pub fn new(permits: usize, label: impl Into<String>) -> Self {
        let permits = permits.max(MIN_PERMITS);
        let label: String = label.into();

        tracing::info!(permits, label = %label, "Created process limiter");

        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            label,
        }
    }

    /// Creates a limiter sized to the host's available parallelism.
    pub fn with_defaults(label: impl Into<String>) -> Self {
        Self::new(default_concurrency(), label)
    }

    /// Waits for a permit.
    ///
    /// Returns `None` only if the underlying semaphore has been closed.
    pub async fn acquire(&self) -> Option<ProcessPermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        Some(ProcessPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Total number of permits.
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Conversions currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest concurrent permit count observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// A held slot in the [`ProcessLimiter`]; released on drop.
pub struct ProcessPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ProcessPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ProcessPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPermit").finish()
    }
}
