//! External process invocation
//!
//! An [`Invocation`] is a structured description of one external command:
//! program, arguments, extra environment and working directory. A
//! [`ProcessRunner`] executes it and reports exit status plus captured
//! output. Non-zero exits become [`BuildError::StepFailed`].

use crate::error::{BuildError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// How a child's stdout/stderr are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Capture both streams for logging and error reporting
    #[default]
    Capture,
    /// Pass both streams straight through to the terminal
    Inherit,
}

/// A single external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Name of the build step issuing this command
    pub step: String,
    /// Program to execute (looked up on PATH)
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment variables, applied on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: PathBuf,
    /// Output handling
    pub output: OutputMode,
}

impl Invocation {
    /// Create an invocation of `program` for `step`, run in `cwd`
    pub fn new(step: impl Into<String>, program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            step: step.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: cwd.into(),
            output: OutputMode::Capture,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the output mode
    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }

    /// Value of an environment variable set on this invocation
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Build the std [`Command`]
    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.cwd).stdin(Stdio::null());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        match self.output {
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    /// Shell-like rendering, for logs and dry runs only
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, shell_quote(value))?;
        }
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Result of a successful invocation
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code (0 on success)
    pub code: Option<i32>,
    /// Captured stdout (empty in inherit mode)
    pub stdout: String,
    /// Captured stderr (empty in inherit mode)
    pub stderr: String,
    /// Wall-clock time the process took
    pub duration: Duration,
}

/// Executes invocations. The build engine only talks to this trait.
pub trait ProcessRunner {
    /// Run to completion. Returns `Err` when the program cannot be started
    /// or exits unsuccessfully.
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Runs invocations as real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new system runner
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        tracing::debug!("[{}] {}", invocation.step, invocation);
        let start = Instant::now();

        let spawn_err = |source: std::io::Error| BuildError::Spawn {
            step: invocation.step.clone(),
            program: invocation.program.clone(),
            source,
        };

        let (status, stdout, stderr) = match invocation.output {
            OutputMode::Capture => {
                let output = invocation.to_command().output().map_err(spawn_err)?;
                (
                    output.status,
                    String::from_utf8_lossy(&output.stdout).to_string(),
                    String::from_utf8_lossy(&output.stderr).to_string(),
                )
            }
            OutputMode::Inherit => {
                let status = invocation.to_command().status().map_err(spawn_err)?;
                (status, String::new(), String::new())
            }
        };

        let duration = start.elapsed();
        check_status(&invocation.step, status, stdout, stderr, duration)
    }
}

fn check_status(
    step: &str,
    status: ExitStatus,
    stdout: String,
    stderr: String,
    duration: Duration,
) -> Result<ProcessOutput> {
    if status.success() {
        return Ok(ProcessOutput {
            code: status.code(),
            stdout,
            stderr,
            duration,
        });
    }

    // Some tools report errors on stdout only
    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(BuildError::StepFailed {
        step: step.to_string(),
        code: status.code(),
        status: status.to_string(),
        stderr: detail,
    })
}

/// Resolve `path` against `root` unless it is already absolute
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
