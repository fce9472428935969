//! Step freshness
//!
//! Decides whether a step must run. Modification times are compared the way
//! make does it: a step is stale if any input is newer than its oldest
//! output. On top of that, dependencies rebuilt in the same invocation and
//! a changed toolchain fingerprint also make a step stale.

use super::steps::{Step, StepId};
use crate::error::Result;
use crate::state::BuildState;
use filetime::FileTime;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Why a step does or does not need to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum Freshness {
    /// Explicitly forced by the recipe
    Forced,
    /// Step has no outputs and always runs
    Phony,
    /// A declared input does not exist yet
    MissingInput(String),
    /// A declared output does not exist
    MissingOutput(String),
    /// An input is newer than an output
    StaleInput(String),
    /// A dependency ran in this invocation
    DependencyRebuilt(StepId),
    /// Outputs were built with a different toolchain profile
    ProfileChanged,
    /// Nothing to do
    UpToDate,
}

impl Freshness {
    /// Whether the step has to run
    pub fn needs_run(&self) -> bool {
        !matches!(self, Self::UpToDate)
    }

    /// Short label for plan listings
    pub fn label(&self) -> &'static str {
        if self.needs_run() {
            "run"
        } else {
            "skip"
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::Phony => write!(f, "always runs"),
            Self::MissingInput(p) => write!(f, "input {} not present yet", p),
            Self::MissingOutput(p) => write!(f, "{} missing", p),
            Self::StaleInput(p) => write!(f, "{} changed", p),
            Self::DependencyRebuilt(id) => write!(f, "{} was rebuilt", id),
            Self::ProfileChanged => write!(f, "toolchain profile changed"),
            Self::UpToDate => write!(f, "up to date"),
        }
    }
}

/// Inputs to a freshness decision that are not part of the step itself
pub struct FreshnessContext<'a> {
    /// Project root
    pub root: &'a Path,
    /// Persisted build state
    pub state: &'a BuildState,
    /// Fingerprint of the active profile
    pub fingerprint: &'a str,
    /// Steps already run (or planned to run) in this invocation
    pub rebuilt: &'a HashSet<StepId>,
    /// Steps forced by the recipe
    pub forced: bool,
}

/// Decide whether `step` has to run
pub fn assess(step: &Step, ctx: &FreshnessContext<'_>) -> Result<Freshness> {
    if ctx.forced {
        return Ok(Freshness::Forced);
    }
    if step.is_phony() {
        return Ok(Freshness::Phony);
    }
    if let Some(dep) = step.deps.iter().find(|d| ctx.rebuilt.contains(d)) {
        return Ok(Freshness::DependencyRebuilt(*dep));
    }

    let mut oldest_output: Option<FileTime> = None;
    for output in &step.outputs {
        match output.newest_mtime(ctx.root)? {
            Some(t) => oldest_output = Some(oldest_output.map_or(t, |o| o.min(t))),
            None => return Ok(Freshness::MissingOutput(output.describe())),
        }
    }

    if let Some(oldest) = oldest_output {
        for input in &step.inputs {
            match input.newest_mtime(ctx.root)? {
                Some(t) if t > oldest => return Ok(Freshness::StaleInput(input.describe())),
                Some(_) => {}
                None => return Ok(Freshness::MissingInput(input.describe())),
            }
        }
    }

    if step.profile_sensitive && ctx.state.fingerprint(step.id.name()) != Some(ctx.fingerprint) {
        return Ok(Freshness::ProfileChanged);
    }

    Ok(Freshness::UpToDate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectLayout;
    use crate::core::steps::standard_steps;
    use crate::state::StepRecord;
    use chrono::Utc;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch_at(dir: &Path, name: &str, secs: i64) {
        let path = dir.join(name);
        File::create(&path).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    fn kernel_step() -> Step {
        standard_steps(&ProjectLayout::default()).remove(0)
    }

    fn state_with(step: &str, fp: &str) -> BuildState {
        let mut state = BuildState::default();
        state.record(
            step,
            StepRecord {
                fingerprint: Some(fp.into()),
                profile: "gnu".into(),
                finished_at: Utc::now(),
                duration_ms: 0,
            },
        );
        state
    }

    fn check(dir: &Path, step: &Step, state: &BuildState, rebuilt: &HashSet<StepId>, forced: bool) -> Freshness {
        let ctx = FreshnessContext {
            root: dir,
            state,
            fingerprint: "fp",
            rebuilt,
            forced,
        };
        assess(step, &ctx).unwrap()
    }

    #[test]
    fn test_missing_output() {
        let dir = TempDir::new().unwrap();
        touch_at(dir.path(), "fbench.f90", 100);
        let f = check(dir.path(), &kernel_step(), &BuildState::default(), &HashSet::new(), false);
        assert_eq!(f, Freshness::MissingOutput("fbench.o".into()));
    }

    #[test]
    fn test_newer_input_is_stale() {
        let dir = TempDir::new().unwrap();
        touch_at(dir.path(), "fbench.o", 100);
        touch_at(dir.path(), "fbench.f90", 200);
        let state = state_with("compile-kernel", "fp");
        let f = check(dir.path(), &kernel_step(), &state, &HashSet::new(), false);
        assert_eq!(f, Freshness::StaleInput("fbench.f90".into()));
    }

    #[test]
    fn test_up_to_date_with_matching_fingerprint() {
        let dir = TempDir::new().unwrap();
        touch_at(dir.path(), "fbench.f90", 100);
        touch_at(dir.path(), "fbench.o", 200);
        let state = state_with("compile-kernel", "fp");
        let f = check(dir.path(), &kernel_step(), &state, &HashSet::new(), false);
        assert_eq!(f, Freshness::UpToDate);
        assert!(!f.needs_run());
    }

    #[test]
    fn test_profile_change_forces_rebuild() {
        let dir = TempDir::new().unwrap();
        touch_at(dir.path(), "fbench.f90", 100);
        touch_at(dir.path(), "fbench.o", 200);
        let state = state_with("compile-kernel", "other");
        let f = check(dir.path(), &kernel_step(), &state, &HashSet::new(), false);
        assert_eq!(f, Freshness::ProfileChanged);
    }

    #[test]
    fn test_generation_ignores_profile() {
        let dir = TempDir::new().unwrap();
        touch_at(dir.path(), "bench.pyx", 100);
        touch_at(dir.path(), "bench.c", 200);
        let step = standard_steps(&ProjectLayout::default()).remove(1);
        let f = check(dir.path(), &step, &BuildState::default(), &HashSet::new(), false);
        assert_eq!(f, Freshness::UpToDate);
    }

    #[test]
    fn test_rebuilt_dependency_and_forced_and_phony() {
        let dir = TempDir::new().unwrap();
        let steps = standard_steps(&ProjectLayout::default());
        let rebuilt = HashSet::from([StepId::GenerateSource]);
        let f = check(dir.path(), &steps[2], &BuildState::default(), &rebuilt, false);
        assert_eq!(f, Freshness::DependencyRebuilt(StepId::GenerateSource));

        let f = check(dir.path(), &steps[1], &BuildState::default(), &HashSet::new(), true);
        assert_eq!(f, Freshness::Forced);

        let f = check(dir.path(), &steps[3], &BuildState::default(), &HashSet::new(), false);
        assert_eq!(f, Freshness::Phony);
    }

    #[test]
    fn test_missing_input_with_existing_output() {
        let dir = TempDir::new().unwrap();
        touch_at(dir.path(), "fbench.o", 200);
        let f = check(dir.path(), &kernel_step(), &BuildState::default(), &HashSet::new(), false);
        assert_eq!(f, Freshness::MissingInput("fbench.f90".into()));
    }
}
