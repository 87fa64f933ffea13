//! Run reporting.
//!
//! Components record [`RunEvent`]s into an [`EventSink`]. The [`Reporter`]
//! mirrors each event to `tracing` and keeps it, so the final
//! [`RunSummary`] is built from the same stream that produced the logs.
//!
//! ```text
//! Resolver / Scheduler ──► RunEvent ──► Reporter ──► tracing
//!                                          └──────► RunSummary (JSON)
//! ```

mod events;
mod summary;

pub use events::{EventSink, Reporter, RunEvent};
pub use summary::{FailureRecord, LayerCounts, RunSummary};
