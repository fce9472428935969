//! Recipe sequencer
//!
//! Runs a planned recipe one step at a time. A step only runs after all of
//! its dependencies, only if it is stale, and only if its declared inputs
//! exist. Any failure stops the build; artifacts from earlier steps stay on
//! disk until `clean`.

use super::freshness::{assess, FreshnessContext};
use super::plan::{Recipe, StepGraph};
use super::report::{BuildReport, StepOutcome};
use super::steps::{invocation_for, Step};
use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::fs;
use crate::process::{OutputMode, ProcessRunner, SystemRunner};
use crate::progress::StepReporter;
use crate::state::{BuildLog, BuildState, StepRecord};
use chrono::Utc;
use filetime::FileTime;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Executes recipes against a resolved configuration
pub struct BuildEngine<R: ProcessRunner = SystemRunner> {
    config: BuildConfig,
    graph: StepGraph,
    runner: R,
    reporter: StepReporter,
}

impl BuildEngine<SystemRunner> {
    /// Create an engine that runs real processes
    pub fn new(config: BuildConfig) -> Result<Self> {
        Self::with_runner(config, SystemRunner::new())
    }
}

impl<R: ProcessRunner> BuildEngine<R> {
    /// Create an engine with a custom process runner
    pub fn with_runner(config: BuildConfig, runner: R) -> Result<Self> {
        let graph = StepGraph::standard(&config.layout)?;
        Ok(Self {
            config,
            graph,
            runner,
            reporter: StepReporter::disabled(),
        })
    }

    /// Attach a progress reporter
    pub fn with_reporter(mut self, reporter: StepReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// The resolved configuration
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The step graph
    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// The process runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run a recipe
    pub fn execute(&self, recipe: Recipe) -> Result<BuildReport> {
        let start = Instant::now();
        let mut report = BuildReport::new(recipe, self.config.profile.kind, self.config.dry_run);

        tracing::info!(
            "Running recipe '{}' with the {} toolchain",
            recipe,
            self.config.profile.kind.vendor()
        );

        if recipe == Recipe::Clean {
            let cleaned = fs::clean(&self.config.root, &self.config.layout, self.config.dry_run)?;
            report.removed = cleaned.removed;
        } else {
            self.run_steps(recipe, &mut report)?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    fn run_steps(&self, recipe: Recipe, report: &mut BuildReport) -> Result<()> {
        let plan = self.graph.plan(recipe)?;
        let state_path = self.config.path(&self.config.layout.state_file());
        let mut state = BuildState::load_or_default(&state_path)?;
        let fingerprint = self.config.profile.fingerprint();
        let mut log = if self.config.dry_run {
            None
        } else {
            Some(BuildLog::open(&self.config.path(&self.config.layout.log_file))?)
        };

        let mut rebuilt = HashSet::new();
        for id in &plan.steps {
            let step = self
                .graph
                .step(*id)
                .ok_or_else(|| BuildError::config(format!("unknown step '{}'", id)))?;

            let freshness = assess(
                step,
                &FreshnessContext {
                    root: &self.config.root,
                    state: &state,
                    fingerprint: &fingerprint,
                    rebuilt: &rebuilt,
                    forced: plan.forced.contains(id),
                },
            )?;

            if !freshness.needs_run() {
                tracing::debug!("Skipping {}: {}", id, freshness);
                self.reporter.skip(id.name(), &freshness.to_string());
                report.push(*id, StepOutcome::Skipped, freshness, None, Duration::ZERO);
                continue;
            }

            let invocation = invocation_for(*id, &self.config);

            if self.config.dry_run {
                self.reporter
                    .planned(id.name(), &freshness.to_string(), &invocation.to_string());
                report.push(*id, StepOutcome::Planned, freshness, Some(invocation.to_string()), Duration::ZERO);
                rebuilt.insert(*id);
                continue;
            }

            self.check_inputs(step)?;
            let before = step
                .outputs
                .iter()
                .map(|o| o.snapshot(&self.config.root))
                .collect::<Result<Vec<_>>>()?;
            let started = FileTime::now();

            tracing::info!("Running {} ({})", id, freshness);
            let streaming = invocation.output == OutputMode::Inherit;
            self.reporter.start(id.name(), id.description(), streaming);

            let output = match self.runner.run(&invocation) {
                Ok(output) => output,
                Err(e) => {
                    self.reporter.fail(id.name());
                    if let Some(ref mut log) = log {
                        if let Err(log_err) = log.record(&invocation, Err(e.to_string().as_str())) {
                            tracing::warn!("Could not write build log: {}", log_err);
                        }
                    }
                    return Err(e);
                }
            };

            if !output.stdout.is_empty() {
                tracing::debug!("[{}] stdout:\n{}", id, output.stdout.trim_end());
            }
            if !output.stderr.is_empty() {
                tracing::debug!("[{}] stderr:\n{}", id, output.stderr.trim_end());
            }
            if let Some(ref mut log) = log {
                log.record(&invocation, Ok(&output))?;
            }

            if let Err(e) = self.check_outputs(step, &before, started) {
                self.reporter.fail(id.name());
                return Err(e);
            }
            self.reporter.finish(id.name(), output.duration);

            state.record(
                id.name(),
                StepRecord {
                    fingerprint: step.profile_sensitive.then(|| fingerprint.clone()),
                    profile: self.config.profile.kind.name().to_string(),
                    finished_at: Utc::now(),
                    duration_ms: output.duration.as_millis() as u64,
                },
            );
            // Persist after every step so a later failure keeps earlier records
            if !step.is_phony() {
                state.save(&state_path)?;
            }

            report.push(*id, StepOutcome::Ran, freshness, Some(invocation.to_string()), output.duration);
            rebuilt.insert(*id);
        }

        Ok(())
    }

    /// Every declared input must exist before the step body runs
    fn check_inputs(&self, step: &Step) -> Result<()> {
        for input in &step.inputs {
            if input.resolve(&self.config.root)?.is_empty() {
                return Err(BuildError::missing_input(step.id.name(), input.describe()));
            }
        }
        Ok(())
    }

    /// Every declared output must exist after the step body succeeds, and at
    /// least one match of each must be new or rewritten. Matches within a
    /// second of the start count as rewritten on coarse-grained filesystems.
    fn check_outputs(&self, step: &Step, before: &[Snapshot], started: FileTime) -> Result<()> {
        let horizon = FileTime::from_unix_time(started.unix_seconds() - 1, 0);
        for (i, output) in step.outputs.iter().enumerate() {
            let after = output.snapshot(&self.config.root)?;
            if after.is_empty() {
                return Err(BuildError::OutputNotProduced {
                    step: step.id.name().to_string(),
                    expected: output.describe(),
                });
            }
            let previous = before.get(i).map(Vec::as_slice).unwrap_or(&[]);
            let untouched = after
                .iter()
                .all(|entry| previous.contains(entry) && entry.1 < horizon);
            if untouched {
                return Err(BuildError::OutputNotUpdated {
                    step: step.id.name().to_string(),
                    expected: output.describe(),
                });
            }
        }
        Ok(())
    }
}

type Snapshot = Vec<(PathBuf, FileTime)>;
