//! Persistent build state
//!
//! Records, per step, which toolchain profile fingerprint produced its
//! outputs so that switching profiles rebuilds the affected steps.

use crate::error::{BuildError, IoResultExt, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Record of one step's last successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Fingerprint of the profile in effect (profile-sensitive steps only)
    pub fingerprint: Option<String>,
    /// Profile name in effect
    pub profile: String,
    /// When the step finished
    pub finished_at: DateTime<Utc>,
    /// How long the step took, in milliseconds
    pub duration_ms: u64,
}

/// Build state for one project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    /// State format version
    pub version: u32,
    /// Step records keyed by step name
    pub steps: BTreeMap<String, StepRecord>,
}

impl Default for BuildState {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            steps: BTreeMap::new(),
        }
    }
}

impl BuildState {
    /// Current state version
    pub const VERSION: u32 = 1;

    /// Load state, returning an empty state if the file does not exist.
    /// A state file from another version is discarded.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).with_path(path)?;
        let state: Self = serde_json::from_str(&content)
            .map_err(|e| BuildError::State(format!("{}: {}", path.display(), e)))?;
        if state.version != Self::VERSION {
            tracing::warn!(
                "Ignoring build state version {} (expected {})",
                state.version,
                Self::VERSION
            );
            return Ok(Self::default());
        }
        Ok(state)
    }

    /// Save state as JSON, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| BuildError::State(e.to_string()))?;
        std::fs::write(path, json).with_path(path)?;
        Ok(())
    }

    /// Fingerprint recorded for a step
    pub fn fingerprint(&self, step: &str) -> Option<&str> {
        self.steps.get(step).and_then(|r| r.fingerprint.as_deref())
    }

    /// Record a successful step run
    pub fn record(&mut self, step: &str, record: StepRecord) {
        self.steps.insert(step.to_string(), record);
    }
}
