//! Job execution under a single process-wide concurrency budget.
//!
//! - [`ProcessLimiter`]: permit pool sized to `max_concurrency`
//! - [`JobScheduler`]: runs batches of jobs, isolating failures
//!
//! # Example
//!
//! ```ignore
//! use geocloud::executor::{JobScheduler, ProcessLimiter};
//!
//! let limiter = Arc::new(ProcessLimiter::new(8, "conversions"));
//! let scheduler = JobScheduler::new(limiter, converter, reporter, CancellationToken::new());
//! let outcomes = scheduler.run(jobs).await;
//! ```

mod limiter;
mod scheduler;

pub use limiter::{default_concurrency, ProcessLimiter, ProcessPermit, MIN_PERMITS};
pub use scheduler::JobScheduler;
