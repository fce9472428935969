//! Recipe planning
//!
//! Recipes name target steps. The planner takes the dependency closure of
//! the targets and orders it so that every step comes after the steps it
//! depends on. Ties are broken by declaration order, so a plan is the same
//! on every run.

use super::steps::{standard_steps, Step, StepId};
use crate::config::ProjectLayout;
use crate::error::{BuildError, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Named recipes
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipe {
    /// Build what is stale, then run the benchmark
    All,
    /// Force extension source regeneration, then run 'all'
    New,
    /// Build the extension
    Cy,
    /// Compile the kernel
    Fbench,
    /// Remove generated artifacts
    Clean,
}

impl Recipe {
    /// Recipe name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::New => "new",
            Self::Cy => "cy",
            Self::Fbench => "fbench",
            Self::Clean => "clean",
        }
    }

    /// Steps the recipe asks for; dependencies are added by the planner
    pub fn targets(&self) -> &'static [StepId] {
        match self {
            Self::All | Self::New => &[StepId::RunBenchmark],
            Self::Cy => &[StepId::BuildExtension],
            Self::Fbench => &[StepId::CompileKernel],
            Self::Clean => &[],
        }
    }

    /// Steps that run regardless of freshness
    pub fn forced(&self) -> &'static [StepId] {
        match self {
            Self::New => &[StepId::GenerateSource],
            _ => &[],
        }
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An ordered list of steps for one recipe
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// Recipe being planned
    pub recipe: Recipe,
    /// Steps in execution order
    pub steps: Vec<StepId>,
    /// Steps that run regardless of freshness
    pub forced: BTreeSet<StepId>,
}

/// The step dependency graph
#[derive(Debug, Clone)]
pub struct StepGraph {
    steps: Vec<Step>,
    index: HashMap<StepId, usize>,
}

impl StepGraph {
    /// Build and validate a graph. Unknown dependencies, duplicate steps
    /// and cycles are configuration errors.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.id, i).is_some() {
                return Err(BuildError::config(format!("step '{}' declared twice", step.id)));
            }
        }
        for step in &steps {
            for dep in &step.deps {
                if !index.contains_key(dep) {
                    return Err(BuildError::config(format!(
                        "step '{}' depends on undeclared step '{}'",
                        step.id, dep
                    )));
                }
            }
        }

        let graph = Self { steps, index };
        let all: Vec<StepId> = graph.steps.iter().map(|s| s.id).collect();
        graph.order(&all)?;
        Ok(graph)
    }

    /// Graph of the standard kernel/extension/benchmark chain
    pub fn standard(layout: &ProjectLayout) -> Result<Self> {
        Self::new(standard_steps(layout))
    }

    /// Look up a step
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.index.get(&id).map(|&i| &self.steps[i])
    }

    /// All steps in declaration order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Plan a recipe
    pub fn plan(&self, recipe: Recipe) -> Result<Plan> {
        let steps = self.order(recipe.targets())?;
        let forced = recipe
            .forced()
            .iter()
            .copied()
            .filter(|id| steps.contains(id))
            .collect();
        Ok(Plan {
            recipe,
            steps,
            forced,
        })
    }

    /// Steps that transitively depend on `id`, including `id`
    pub fn dependents_of(&self, id: StepId) -> HashSet<StepId> {
        let mut out = HashSet::from([id]);
        let mut changed = true;
        while changed {
            changed = false;
            for step in &self.steps {
                if !out.contains(&step.id) && step.deps.iter().any(|d| out.contains(d)) {
                    out.insert(step.id);
                    changed = true;
                }
            }
        }
        out
    }

    fn closure(&self, targets: &[StepId]) -> Result<HashSet<StepId>> {
        let mut seen = HashSet::new();
        let mut stack: Vec<StepId> = targets.to_vec();
        while let Some(id) = stack.pop() {
            let step = self
                .step(id)
                .ok_or_else(|| BuildError::config(format!("unknown step '{}'", id)))?;
            if seen.insert(id) {
                stack.extend(step.deps.iter().copied());
            }
        }
        Ok(seen)
    }

    /// Kahn's algorithm over the closure of `targets`
    fn order(&self, targets: &[StepId]) -> Result<Vec<StepId>> {
        let wanted = self.closure(targets)?;
        let mut remaining: HashMap<StepId, usize> = self
            .steps
            .iter()
            .filter(|s| wanted.contains(&s.id))
            .map(|s| (s.id, s.deps.len()))
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            // First ready step in declaration order
            let next = self
                .steps
                .iter()
                .map(|s| s.id)
                .find(|id| remaining.get(id) == Some(&0));

            let Some(next) = next else {
                let mut stuck: Vec<&str> = remaining.keys().map(|id| id.name()).collect();
                stuck.sort_unstable();
                return Err(BuildError::config(format!(
                    "dependency cycle among steps: {}",
                    stuck.join(", ")
                )));
            };

            remaining.remove(&next);
            for step in &self.steps {
                if step.deps.contains(&next) {
                    if let Some(count) = remaining.get_mut(&step.id) {
                        *count -= 1;
                    }
                }
            }
            order.push(next);
        }
        Ok(order)
    }
}
