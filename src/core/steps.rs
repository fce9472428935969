//! Build steps
//!
//! Each step declares the files it reads, the files it produces and the
//! steps it depends on. The command a step runs is derived from the
//! resolved [`BuildConfig`] alone, so switching the active toolchain
//! profile changes the commands without touching the step definitions.

use crate::config::{BuildConfig, ProjectLayout};
use crate::fs::ArtifactSpec;
use crate::process::{Invocation, OutputMode};
use serde::Serialize;
use std::fmt;

/// Identifier of a build step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    /// Compile the kernel source into an object
    CompileKernel,
    /// Generate extension source from the interface description
    GenerateSource,
    /// Compile and link the extension in place
    BuildExtension,
    /// Run the benchmark entry point
    RunBenchmark,
}

impl StepId {
    /// Stable name used in logs and the state file
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompileKernel => "compile-kernel",
            Self::GenerateSource => "generate-source",
            Self::BuildExtension => "build-extension",
            Self::RunBenchmark => "run-benchmark",
        }
    }

    /// Short description for progress output
    pub fn description(&self) -> &'static str {
        match self {
            Self::CompileKernel => "Compiling kernel",
            Self::GenerateSource => "Generating extension source",
            Self::BuildExtension => "Building extension",
            Self::RunBenchmark => "Running benchmark",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declaration of one step in the build graph
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// Step identifier
    pub id: StepId,
    /// Files that must exist before the step runs
    pub inputs: Vec<ArtifactSpec>,
    /// Files the step must leave behind; empty means the step always runs
    pub outputs: Vec<ArtifactSpec>,
    /// Steps that must complete first
    pub deps: Vec<StepId>,
    /// Whether the active toolchain profile affects the outputs
    pub profile_sensitive: bool,
}

impl Step {
    /// A step with no outputs runs every time
    pub fn is_phony(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// The kernel/extension/benchmark step chain for a project layout
pub fn standard_steps(layout: &ProjectLayout) -> Vec<Step> {
    vec![
        Step {
            id: StepId::CompileKernel,
            inputs: vec![ArtifactSpec::File(layout.kernel_source.clone())],
            outputs: vec![ArtifactSpec::File(layout.kernel_object.clone())],
            deps: Vec::new(),
            profile_sensitive: true,
        },
        Step {
            id: StepId::GenerateSource,
            inputs: vec![ArtifactSpec::File(layout.interface_source.clone())],
            outputs: vec![ArtifactSpec::File(layout.generated_source.clone())],
            deps: Vec::new(),
            profile_sensitive: false,
        },
        Step {
            id: StepId::BuildExtension,
            inputs: vec![
                ArtifactSpec::File(layout.generated_source.clone()),
                ArtifactSpec::File(layout.kernel_object.clone()),
                ArtifactSpec::File(layout.build_script.clone()),
            ],
            outputs: vec![ArtifactSpec::Glob(layout.extension_glob.clone())],
            deps: vec![StepId::CompileKernel, StepId::GenerateSource],
            profile_sensitive: true,
        },
        Step {
            id: StepId::RunBenchmark,
            inputs: vec![
                ArtifactSpec::Glob(layout.extension_glob.clone()),
                ArtifactSpec::File(layout.benchmark_entry.clone()),
            ],
            outputs: Vec::new(),
            deps: vec![StepId::BuildExtension],
            profile_sensitive: false,
        },
    ]
}

/// The command a step runs under `config`
pub fn invocation_for(id: StepId, config: &BuildConfig) -> Invocation {
    let layout = &config.layout;
    let profile = &config.profile;
    let root = config.root.clone();

    match id {
        StepId::CompileKernel => Invocation::new(id.name(), &profile.compiler, root)
            .args(profile.compiler_flags.iter().cloned())
            .arg("-c")
            .arg(path_arg(&layout.kernel_source))
            .arg("-o")
            .arg(path_arg(&layout.kernel_object)),

        StepId::GenerateSource => Invocation::new(id.name(), &config.generator, root)
            .arg(path_arg(&layout.interface_source))
            .arg("-o")
            .arg(path_arg(&layout.generated_source)),

        StepId::BuildExtension => {
            let mut inv = Invocation::new(id.name(), &config.interpreter, root)
                .arg(path_arg(&layout.build_script))
                .args(["build_ext", "--inplace"])
                .env("FC", &profile.compiler)
                .env("FFLAGS", profile.compiler_flags.join(" "))
                .env("LDFLAGS", profile.linker_flags.join(" "))
                .env(
                    "BENCHMAKE_KERNEL_OBJECT",
                    config.path(&layout.kernel_object).display().to_string(),
                );
            if let Some(link) = profile.link_command() {
                inv = inv.env("LDSHARED", link);
            }
            inv
        }

        StepId::RunBenchmark => Invocation::new(id.name(), &config.interpreter, root)
            .arg(path_arg(&layout.benchmark_entry))
            .args(config.bench_args.iter().cloned())
            .output(OutputMode::Inherit),
    }
}

fn path_arg(path: &std::path::Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectFile, ToolArgs};
    use crate::toolchain::ToolchainKind;
    use std::path::PathBuf;

    fn config(kind: &str) -> BuildConfig {
        BuildConfig::from_sources(
            PathBuf::from("/proj"),
            ProjectFile::default(),
            Some(kind),
            &ToolArgs::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_compile_kernel_command() {
        let inv = invocation_for(StepId::CompileKernel, &config("gnu"));
        assert_eq!(inv.program, "gfortran");
        assert_eq!(
            inv.args,
            vec!["-O3", "-march=native", "-fPIC", "-c", "fbench.f90", "-o", "fbench.o"]
        );
        assert_eq!(inv.cwd, PathBuf::from("/proj"));
    }

    #[test]
    fn test_generate_command() {
        let inv = invocation_for(StepId::GenerateSource, &config("gnu"));
        assert_eq!(inv.program, "cython");
        assert_eq!(inv.args, vec!["bench.pyx", "-o", "bench.c"]);
    }

    #[test]
    fn test_extension_env_follows_profile() {
        let inv = invocation_for(StepId::BuildExtension, &config("intel"));
        assert_eq!(inv.program, "python3");
        assert_eq!(inv.args, vec!["setup.py", "build_ext", "--inplace"]);
        assert_eq!(inv.env_value("FC"), Some("ifort"));
        assert_eq!(inv.env_value("FFLAGS"), Some("-O3 -xHost -fPIC"));
        assert_eq!(inv.env_value("LDSHARED"), Some("ifort -shared -nofor-main"));
        assert_eq!(inv.env_value("BENCHMAKE_KERNEL_OBJECT"), Some("/proj/fbench.o"));

        let nag = invocation_for(StepId::BuildExtension, &config("nag"));
        assert_eq!(nag.env_value("FC"), Some("nagfor"));
        assert_eq!(nag.env_value("LDSHARED"), None);
    }

    #[test]
    fn test_each_profile_fully_determines_commands() {
        for kind in ToolchainKind::ALL {
            let cfg = config(kind.name());
            let profile = kind.builtin_profile();
            let compile = invocation_for(StepId::CompileKernel, &cfg);
            assert_eq!(compile.program, profile.compiler);
            assert_eq!(&compile.args[..profile.compiler_flags.len()], &profile.compiler_flags[..]);

            let ext = invocation_for(StepId::BuildExtension, &cfg);
            assert_eq!(ext.env_value("FC"), Some(profile.compiler.as_str()));
            assert_eq!(ext.env_value("LDSHARED").map(str::to_string), profile.link_command());

            for other in ToolchainKind::ALL.iter().filter(|o| **o != kind) {
                let other_compiler = other.builtin_profile().compiler;
                assert!(!compile.to_string().contains(&other_compiler));
                assert!(!ext.to_string().contains(&other_compiler));
            }
        }
    }

    #[test]
    fn test_benchmark_streams_and_passes_args() {
        let mut cfg = config("gnu");
        cfg.bench_args = vec!["--size".into(), "64".into()];
        let inv = invocation_for(StepId::RunBenchmark, &cfg);
        assert_eq!(inv.args, vec!["bench.py", "--size", "64"]);
        assert_eq!(inv.output, OutputMode::Inherit);
    }

    #[test]
    fn test_only_benchmark_is_phony() {
        let steps = standard_steps(&ProjectLayout::default());
        let phony: Vec<StepId> = steps.iter().filter(|s| s.is_phony()).map(|s| s.id).collect();
        assert_eq!(phony, vec![StepId::RunBenchmark]);
    }
}
