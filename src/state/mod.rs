//! Build state module
//!
//! Persisted per-step profile fingerprints and the build log.

mod log;
mod manifest;

pub use log::BuildLog;
pub use manifest::{BuildState, StepRecord};
