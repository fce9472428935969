//! Core build engine
//!
//! The step graph, recipe planning, freshness decisions and the sequencer
//! that runs them.

mod engine;
mod freshness;
mod plan;
mod report;
mod steps;

pub use engine::BuildEngine;
pub use freshness::{assess, Freshness, FreshnessContext};
pub use plan::{Plan, Recipe, StepGraph};
pub use report::{BuildReport, StepOutcome, StepReport};
pub use steps::{invocation_for, standard_steps, Step, StepId};
