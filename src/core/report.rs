//! Build report
//!
//! What happened to each planned step, for the summary printed at the end
//! of a build and for `--format json`.

use super::freshness::Freshness;
use super::plan::Recipe;
use super::steps::StepId;
use crate::toolchain::ToolchainKind;
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// What happened to a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    /// The step's command ran successfully
    Ran,
    /// The step was up to date
    Skipped,
    /// Dry run: the step would have run
    Planned,
}

/// Report entry for one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step identifier
    pub step: StepId,
    /// Outcome
    pub outcome: StepOutcome,
    /// Freshness decision that led to the outcome
    pub freshness: Freshness,
    /// Rendered command (ran or planned steps)
    pub command: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// Result of running a recipe
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Recipe that was run
    pub recipe: Recipe,
    /// Active toolchain profile
    pub toolchain: ToolchainKind,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// When the build started
    pub started_at: DateTime<Utc>,
    /// Per-step results in execution order
    pub steps: Vec<StepReport>,
    /// Paths removed by clean
    pub removed: Vec<PathBuf>,
    /// Total wall-clock time in milliseconds
    pub duration_ms: u64,
}

impl BuildReport {
    /// Start an empty report
    pub fn new(recipe: Recipe, toolchain: ToolchainKind, dry_run: bool) -> Self {
        Self {
            recipe,
            toolchain,
            dry_run,
            started_at: Utc::now(),
            steps: Vec::new(),
            removed: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Append a step result
    pub fn push(&mut self, step: StepId, outcome: StepOutcome, freshness: Freshness, command: Option<String>, duration: Duration) {
        self.steps.push(StepReport {
            step,
            outcome,
            freshness,
            command,
            duration_ms: duration.as_millis() as u64,
        });
    }

    /// Steps with the given outcome, in order
    pub fn steps_with(&self, outcome: StepOutcome) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.outcome == outcome)
            .map(|s| s.step)
            .collect()
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Print a human-readable summary
    pub fn print_summary(&self) {
        println!();
        println!(
            "=== {} ({}, {}) ===",
            style(format!("benchmake {}", self.recipe)).bold(),
            self.toolchain.vendor(),
            if self.dry_run { "dry run" } else { "done" }
        );

        if self.recipe == Recipe::Clean {
            println!("Removed:   {}", self.removed.len());
            for path in &self.removed {
                println!("  {}", path.display());
            }
        } else {
            println!("Ran:       {}", self.steps_with(StepOutcome::Ran).len());
            println!("Skipped:   {}", self.steps_with(StepOutcome::Skipped).len());
            if self.dry_run {
                println!("Would run: {}", self.steps_with(StepOutcome::Planned).len());
            }
        }
        println!(
            "Duration:  {}",
            humantime::format_duration(Duration::from_millis(self.duration_ms))
        );
    }
}
