//! CLI integration tests for benchmake.
//!
//! These tests invoke the compiled binary against a scratch project. The
//! compiler, generator and interpreter are small shell scripts, so the
//! tests exercise the real process plumbing without a Fortran toolchain.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const SOURCES: [&str; 4] = ["bench.py", "bench.pyx", "fbench.f90", "setup.py"];

/// Writes `-o <file>` targets, like a compiler or source generator would
const FAKE_COMPILER: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then shift; out="$1"; fi
  shift
done
echo "built" > "$out"
"#;

/// Builds the extension for `setup.py`, otherwise acts as the benchmark
const FAKE_INTERPRETER: &str = r#"#!/bin/sh
case "$1" in
  setup.py)
    mkdir -p build
    echo "$FC|$FFLAGS|$LDSHARED" > build/ext_env.txt
    echo "so" > bench.fake.so
    ;;
  *)
    shift
    echo "benchmark ran $*"
    ;;
esac
"#;

const BROKEN_COMPILER: &str = r#"#!/bin/sh
echo "fbench.f90:12:3: Error: Unclassifiable statement" >&2
exit 3
"#;

struct Project {
    root: tempfile::TempDir,
    tools: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("create project dir");
        for name in SOURCES {
            std::fs::write(root.path().join(name), name).expect("write source");
        }
        let tools = tempfile::tempdir().expect("create tools dir");
        let project = Self { root, tools };
        project.tool("fc", FAKE_COMPILER);
        project.tool("gen", FAKE_COMPILER);
        project.tool("py", FAKE_INTERPRETER);
        project
    }

    fn tool(&self, name: &str, script: &str) -> PathBuf {
        let path = self.tools.path().join(name);
        std::fs::write(&path, script).expect("write tool");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod tool");
        path
    }

    fn tool_path(&self, name: &str) -> String {
        self.tools.path().join(name).to_str().unwrap().to_string()
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    /// The binary pointed at the project, with a scrubbed environment
    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_benchmake"));
        for var in ["FC", "FFLAGS", "FLINKER", "LDFLAGS", "CYTHON", "PYTHON", "BENCHMAKE_TOOLCHAIN", "RUST_LOG"] {
            cmd.env_remove(var);
        }
        for prefix in ["BENCHMAKE_GNU", "BENCHMAKE_INTEL", "BENCHMAKE_NAG"] {
            for suffix in ["FC", "FFLAGS", "FLINKER", "LDFLAGS"] {
                cmd.env_remove(format!("{}_{}", prefix, suffix));
            }
        }
        cmd.arg("-C").arg(self.path());
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command()
            .args(["--fc", &self.tool_path("fc")])
            .args(["--generator", &self.tool_path("gen")])
            .args(["--interpreter", &self.tool_path("py")])
            .args(args)
            .output()
            .expect("run binary")
    }

    fn listing(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn cli_profiles_marks_active() {
    let project = Project::new();

    let output = project.run(&["profiles"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("* gnu"), "stdout: {}", out);
    assert!(out.contains("  intel"), "stdout: {}", out);
    assert!(out.contains("  nag"), "stdout: {}", out);

    let output = project.run(&["--toolchain", "nag", "profiles", "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid json");
    assert_eq!(doc["active"], "nag");
    assert_eq!(doc["profiles"].as_array().unwrap().len(), 3);
}

#[test]
fn cli_unknown_toolchain_fails_before_building() {
    let project = Project::new();
    let output = project.run(&["--toolchain", "pgi", "all"]);

    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("unknown toolchain profile 'pgi'"),
        "stderr: {}",
        stderr(&output)
    );
    assert_eq!(project.listing(), SOURCES);
}

#[test]
fn cli_empty_toolchain_is_unset() {
    let project = Project::new();
    let output = project.run(&["--toolchain", "", "fbench"]);

    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("no toolchain profile selected"),
        "stderr: {}",
        stderr(&output)
    );
    assert_eq!(project.listing(), SOURCES);
}

#[test]
fn cli_all_builds_and_runs_then_clean_restores_sources() {
    let project = Project::new();

    let output = project.run(&["-q", "all", "--", "--size", "8"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(
        stdout(&output).contains("benchmark ran --size 8"),
        "stdout: {}",
        stdout(&output)
    );
    for artifact in ["fbench.o", "bench.c", "bench.fake.so", "build", "benchmake.log", ".benchmake"] {
        assert!(project.path().join(artifact).exists(), "missing {}", artifact);
    }

    let env = std::fs::read_to_string(project.path().join("build/ext_env.txt")).unwrap();
    assert!(env.contains("-O3 -march=native -fPIC"), "env: {}", env);
    assert!(env.ends_with("gfortran -shared\n"), "env: {}", env);

    let output = project.run(&["-q", "clean"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(project.listing(), SOURCES);
}

#[test]
fn cli_second_run_skips_up_to_date_steps() {
    let project = Project::new();
    assert!(project.run(&["-q", "cy"]).status.success());

    let output = project.run(&["cy", "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid json");
    let outcomes: Vec<&str> = report["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["outcome"].as_str().unwrap())
        .collect();
    assert_eq!(outcomes, vec!["skipped", "skipped", "skipped"]);
}

#[test]
fn cli_compiler_failure_surfaces_status_and_output() {
    let project = Project::new();
    project.tool("fc", BROKEN_COMPILER);

    let output = project.run(&["-q", "all"]);
    assert_eq!(output.status.code(), Some(3));
    let err = stderr(&output);
    assert!(err.contains("Step 'compile-kernel' failed"), "stderr: {}", err);
    assert!(err.contains("Unclassifiable statement"), "stderr: {}", err);
    assert!(!project.path().join("bench.c").exists());
    assert!(!project.path().join("bench.fake.so").exists());
}

#[test]
fn cli_dry_run_touches_nothing() {
    let project = Project::new();
    let output = project.run(&["--dry-run", "new"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("compile-kernel"), "stderr: {}", stderr(&output));
    assert_eq!(project.listing(), SOURCES);
}

#[test]
fn cli_plan_json_lists_ordered_steps() {
    let project = Project::new();
    let output = project.run(&["--toolchain", "intel", "plan", "cy", "--format", "json"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid json");
    let steps: Vec<&str> = doc["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["step"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["compile-kernel", "generate-source", "build-extension"]);
    assert_eq!(doc["toolchain"], "intel");
}

#[test]
fn cli_generic_compiler_env_does_not_leak_into_profile() {
    let project = Project::new();
    let output = project
        .command()
        .env("FC", "gfortran")
        .env("FFLAGS", "-O2 -march=native")
        .args(["--toolchain", "nag", "plan", "fbench"])
        .output()
        .expect("run binary");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("$ nagfor -O4 -PIC -c fbench.f90 -o fbench.o"), "stdout: {}", out);
    assert!(!out.contains("gfortran"), "stdout: {}", out);

    let output = project
        .command()
        .env("BENCHMAKE_NAG_FFLAGS", "-O0 -g")
        .env("BENCHMAKE_GNU_FC", "gfortran-13")
        .args(["--toolchain", "nag", "plan", "fbench"])
        .output()
        .expect("run binary");
    assert!(
        stdout(&output).contains("$ nagfor -O0 -g -c fbench.f90 -o fbench.o"),
        "stdout: {}",
        stdout(&output)
    );
}

#[test]
fn cli_clean_refuses_layout_that_covers_sources() {
    let project = Project::new();
    std::fs::write(
        project.path().join("benchmake.json"),
        r#"{ "layout": { "build_dir": "." } }"#,
    )
    .unwrap();

    let output = project.run(&["-q", "clean"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("layout.build_dir"), "stderr: {}", stderr(&output));
    for name in SOURCES {
        assert!(project.path().join(name).exists(), "{} was removed", name);
    }
}
