//! CLI command implementations.

pub mod catalog;
pub mod common;
pub mod plan;
pub mod run;
