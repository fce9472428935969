//! Build log
//!
//! Appends each executed command and its captured output to a plain text
//! log in the project root. The log is a byproduct removed by clean.

use crate::error::{IoResultExt, Result};
use crate::process::{Invocation, ProcessOutput};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only log of tool output
pub struct BuildLog {
    path: PathBuf,
    file: File,
}

impl BuildLog {
    /// Open (creating if needed) the log at `path` for appending
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_path(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a command and its outcome
    pub fn record(&mut self, invocation: &Invocation, outcome: std::result::Result<&ProcessOutput, &str>) -> Result<()> {
        let mut text = format!(
            "=== {} [{}] {}\n$ {}\n",
            Utc::now().to_rfc3339(),
            invocation.step,
            match outcome {
                Ok(_) => "ok",
                Err(_) => "FAILED",
            },
            invocation
        );
        match outcome {
            Ok(output) => {
                push_block(&mut text, &output.stdout);
                push_block(&mut text, &output.stderr);
            }
            Err(message) => push_block(&mut text, message),
        }
        self.file.write_all(text.as_bytes()).with_path(&self.path)
    }
}

fn push_block(text: &mut String, block: &str) {
    if !block.is_empty() {
        text.push_str(block);
        if !block.ends_with('\n') {
            text.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_appends_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("benchmake.log");
        let inv = Invocation::new("compile-kernel", "gfortran", dir.path()).args(["-c", "fbench.f90"]);

        let mut log = BuildLog::open(&path).unwrap();
        let output = ProcessOutput {
            code: Some(0),
            stdout: "compiled".into(),
            ..Default::default()
        };
        log.record(&inv, Ok(&output)).unwrap();
        log.record(&inv, Err("fbench.f90:3: Error: syntax")).unwrap();
        drop(log);

        let mut log = BuildLog::open(&path).unwrap();
        log.record(&inv, Ok(&ProcessOutput::default())).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("[compile-kernel]").count(), 3);
        assert!(content.contains("$ gfortran -c fbench.f90\ncompiled\n"));
        assert!(content.contains("FAILED"));
        assert!(content.contains("Error: syntax"));
    }
}
