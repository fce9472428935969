//! Error types for benchmake
//!
//! Every failure that can stop a build is a variant of [`BuildError`].
//! Step failures carry the tool's exit status and captured output so the
//! user sees what the compiler or interpreter actually said.

use std::path::PathBuf;
use thiserror::Error;

/// Number of trailing stderr lines kept in a step failure message
const STDERR_TAIL_LINES: usize = 20;

/// Main error type for benchmake operations
#[derive(Error, Debug)]
pub enum BuildError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error (bad project file, unknown profile, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The selected toolchain profile name is empty
    #[error("Configuration error: no toolchain profile selected")]
    ProfileUnset,

    /// The selected toolchain profile name is not one of the known profiles
    #[error("Configuration error: unknown toolchain profile '{name}' (expected one of: {expected})")]
    UnknownProfile { name: String, expected: String },

    /// An external program could not be started at all
    #[error("Step '{step}': could not start '{program}': {source}")]
    Spawn {
        step: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An external program ran and exited unsuccessfully
    #[error("Step '{step}' failed ({status}){}", format_stderr(.stderr))]
    StepFailed {
        step: String,
        /// Exit code, `None` when the process was killed by a signal
        code: Option<i32>,
        status: String,
        stderr: String,
    },

    /// A step's declared input is absent when the step is about to run
    #[error("Step '{step}' cannot run: required input '{path}' is missing")]
    MissingInput { step: String, path: PathBuf },

    /// A step succeeded but did not leave its declared output behind
    #[error("Step '{step}' finished but did not produce '{expected}'")]
    OutputNotProduced { step: String, expected: String },

    /// A step succeeded but every match of its output predates the run
    #[error("Step '{step}' finished but left '{expected}' unchanged from an earlier build")]
    OutputNotUpdated { step: String, expected: String },

    /// Build state file could not be read or written
    #[error("Build state error: {0}")]
    State(String),

    /// Invalid glob pattern in the project layout
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    format!("\n{}", lines[start..].join("\n"))
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a missing-input error
    pub fn missing_input(step: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingInput {
            step: step.into(),
            path: path.into(),
        }
    }

    /// Whether this error was raised before any external process ran
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::ProfileUnset | Self::UnknownProfile { .. } | Self::Pattern { .. }
        )
    }

    /// Exit code the CLI should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StepFailed { code: Some(code), .. } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } | Self::MissingInput { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for benchmake operations
pub type Result<T> = std::result::Result<T, BuildError>;

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        BuildError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| BuildError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = BuildError::io("/test/path", io_err);
        assert_eq!(err.path().unwrap(), &PathBuf::from("/test/path"));
    }

    #[test]
    fn test_step_failure_shows_stderr_tail() {
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let err = BuildError::StepFailed {
            step: "compile-kernel".into(),
            code: Some(2),
            status: "exit status: 2".into(),
            stderr,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Step 'compile-kernel' failed (exit status: 2)"));
        assert!(msg.contains("line 29"));
        assert!(!msg.contains("line 9\n"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_step_failure_without_stderr() {
        let err = BuildError::StepFailed {
            step: "run-benchmark".into(),
            code: None,
            status: "signal: 9".into(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "Step 'run-benchmark' failed (signal: 9)");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_configuration_classification() {
        assert!(BuildError::ProfileUnset.is_configuration_error());
        assert!(BuildError::UnknownProfile {
            name: "pgi".into(),
            expected: "gnu, intel, nag".into()
        }
        .is_configuration_error());
        assert!(!BuildError::missing_input("x", "y").is_configuration_error());
    }
}
