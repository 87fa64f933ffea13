//! GeoCloud - batch conversion of geospatial layers to cloud-native formats.
//!
//! GeoCloud expands a catalog of raster and vector layers into one
//! conversion job per input file and runs the external `gdal` tool for each,
//! producing Cloud-Optimized GeoTIFF (rasters) and FlatGeobuf (vectors).
//!
//! # Architecture
//!
//! ```text
//! Catalog ─► FileResolver ─► ConversionJob* ─► JobScheduler ─► Converter ─► gdal
//!                │                                  │
//!                └── ResolutionError ──► Reporter ◄─┘ JobResult
//!                                           │
//!                                           └─► RunSummary
//! ```
//!
//! - [`layer`]: layer descriptors and the catalog
//! - [`resolver`]: turns a layer into jobs
//! - [`convert`]: builds and runs tool invocations
//! - [`executor`]: process limiter and job scheduler
//! - [`coordinator`]: drives a whole run
//! - [`report`]: events and the run summary

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod job;
pub mod layer;
pub mod logging;
pub mod report;
pub mod resolver;

/// Version of the GeoCloud library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
