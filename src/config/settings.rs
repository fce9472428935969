//! Configuration settings for benchmake
//!
//! Defines the CLI arguments, the optional `benchmake.json` project file and
//! the resolved [`BuildConfig`] that every recipe runs against.
//!
//! Precedence, highest first: command-line flag, environment variable,
//! project file, built-in default.

use crate::core::Recipe;
use crate::error::{BuildError, IoResultExt, Result};
use crate::toolchain::{ProfileOverride, ToolchainKind, ToolchainProfile};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Default project file name, looked up in the project root
pub const PROJECT_FILE: &str = "benchmake.json";

/// benchmake - build and run a Fortran kernel benchmark through a generated extension
#[derive(Parser, Debug, Clone)]
#[command(name = "benchmake")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Toolchain-aware build orchestrator for Fortran kernel benchmarks")]
#[command(long_about = r#"
benchmake compiles a Fortran numerical kernel, generates and builds a native
extension from its interface description, and runs the benchmark driver.

Recipes:
  all     build whatever is out of date, then run the benchmark (default)
  new     force regeneration of the extension source, then run 'all'
  cy      build the extension (compiles the kernel first if needed)
  fbench  compile the kernel object
  clean   remove every generated artifact

Examples:
  benchmake                          # build and run with the GNU toolchain
  benchmake cy --toolchain intel     # build the extension with Intel Fortran
  BENCHMAKE_GNU_FFLAGS="-O0 -g" benchmake fbench   # override GNU flags
  benchmake all -- --size 4096       # pass arguments to the benchmark
"#)]
pub struct CliArgs {
    /// Project root directory
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Project file (default: <root>/benchmake.json when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Toolchain profile (gnu, intel, nag)
    #[arg(short = 't', long, global = true, env = "BENCHMAKE_TOOLCHAIN", value_name = "PROFILE")]
    pub toolchain: Option<String>,

    /// Compiler, generator and interpreter overrides
    #[command(flatten)]
    pub tools: ToolArgs,

    /// Show what would run without running anything
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Output format for plans, profiles and build summaries
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Recipe or inspection command (default: all)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Tool and flag overrides.
///
/// The compiler and linker flags apply to the active profile for this
/// invocation only. Environment overrides are scoped per profile
/// (`BENCHMAKE_GNU_FC`, `BENCHMAKE_NAG_FFLAGS`, ...) so a generic `FC` or
/// `LDFLAGS` exported by the shell never leaks into a profile.
#[derive(Args, Debug, Clone, Default)]
pub struct ToolArgs {
    /// Fortran compiler for the active profile
    #[arg(long, global = true, value_name = "PROG")]
    pub fc: Option<String>,

    /// Fortran compiler flags for the active profile
    #[arg(long, global = true, value_name = "FLAGS", allow_hyphen_values = true)]
    pub fflags: Option<String>,

    /// Linker for the active profile (empty disables LDSHARED)
    #[arg(long, global = true, value_name = "PROG")]
    pub linker: Option<String>,

    /// Linker flags for the active profile
    #[arg(long, global = true, value_name = "FLAGS", allow_hyphen_values = true)]
    pub ldflags: Option<String>,

    /// Program that turns the interface description into extension source
    #[arg(long, global = true, env = "CYTHON", value_name = "PROG")]
    pub generator: Option<String>,

    /// Interpreter that runs the extension build script and the benchmark
    #[arg(long, global = true, env = "PYTHON", value_name = "PROG")]
    pub interpreter: Option<String>,

    /// Per-profile overrides read from `BENCHMAKE_<PROFILE>_*` variables
    #[arg(skip)]
    pub profile_env: BTreeMap<ToolchainKind, ProfileOverride>,
}

impl ToolArgs {
    /// Profile fields given on the command line
    pub fn profile_override(&self) -> ProfileOverride {
        ProfileOverride {
            compiler: self.fc.clone(),
            compiler_flags: self.fflags.clone(),
            linker: self.linker.clone(),
            linker_flags: self.ldflags.clone(),
        }
    }

    /// Fill the per-profile environment overrides from `lookup`
    pub fn with_profile_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.profile_env = ToolchainKind::ALL
            .iter()
            .map(|kind| (*kind, ProfileOverride::from_env(*kind, &lookup)))
            .filter(|(_, ov)| !ov.is_empty())
            .collect();
        self
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build what is out of date, then run the benchmark
    #[command(name = "all")]
    All {
        /// Arguments passed through to the benchmark entry point
        #[arg(last = true, value_name = "ARGS")]
        bench_args: Vec<String>,
    },

    /// Force regeneration of the extension source, then run 'all'
    #[command(name = "new")]
    New {
        /// Arguments passed through to the benchmark entry point
        #[arg(last = true, value_name = "ARGS")]
        bench_args: Vec<String>,
    },

    /// Build the native extension
    #[command(name = "cy")]
    Cy,

    /// Compile the kernel object
    #[command(name = "fbench")]
    Fbench,

    /// Remove generated artifacts
    #[command(name = "clean")]
    Clean,

    /// Print the ordered steps a recipe would consider
    #[command(name = "plan")]
    Plan {
        /// Recipe to plan
        #[arg(value_enum, default_value = "all")]
        recipe: Recipe,
    },

    /// List toolchain profiles and mark the active one
    #[command(name = "profiles")]
    Profiles,
}

impl Commands {
    /// Recipe this command executes, if it is a recipe
    pub fn recipe(&self) -> Option<Recipe> {
        match self {
            Self::All { .. } => Some(Recipe::All),
            Self::New { .. } => Some(Recipe::New),
            Self::Cy => Some(Recipe::Cy),
            Self::Fbench => Some(Recipe::Fbench),
            Self::Clean => Some(Recipe::Clean),
            Self::Plan { .. } | Self::Profiles => None,
        }
    }

    /// Benchmark pass-through arguments
    pub fn bench_args(&self) -> &[String] {
        match self {
            Self::All { bench_args } | Self::New { bench_args } => bench_args.as_slice(),
            _ => &[],
        }
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// File names making up a benchmark project, relative to its root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectLayout {
    /// Fortran kernel source
    pub kernel_source: PathBuf,
    /// Compiled kernel object
    pub kernel_object: PathBuf,
    /// Interface description the extension source is generated from
    pub interface_source: PathBuf,
    /// Generated extension source
    pub generated_source: PathBuf,
    /// Script that compiles and links the extension in place
    pub build_script: PathBuf,
    /// Glob matching the loadable extension artifact
    pub extension_glob: String,
    /// Benchmark entry point run by the interpreter
    pub benchmark_entry: PathBuf,
    /// Build directory left behind by the extension build
    pub build_dir: PathBuf,
    /// Extra byproduct globs removed by clean
    pub byproducts: Vec<String>,
    /// Log of captured tool output
    pub log_file: PathBuf,
    /// Directory holding build state
    pub state_dir: PathBuf,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            kernel_source: PathBuf::from("fbench.f90"),
            kernel_object: PathBuf::from("fbench.o"),
            interface_source: PathBuf::from("bench.pyx"),
            generated_source: PathBuf::from("bench.c"),
            build_script: PathBuf::from("setup.py"),
            extension_glob: "bench*.so".to_string(),
            benchmark_entry: PathBuf::from("bench.py"),
            build_dir: PathBuf::from("build"),
            byproducts: vec!["*.mod".to_string()],
            log_file: PathBuf::from("benchmake.log"),
            state_dir: PathBuf::from(".benchmake"),
        }
    }
}

impl ProjectLayout {
    /// Hand-written inputs that clean must never touch
    pub fn sources(&self) -> [&Path; 4] {
        [
            &self.kernel_source,
            &self.interface_source,
            &self.build_script,
            &self.benchmark_entry,
        ]
    }

    /// Path of the state file
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    /// Generated paths that clean removes by name
    pub fn outputs(&self) -> [(&'static str, &Path); 5] {
        [
            ("kernel_object", self.kernel_object.as_path()),
            ("generated_source", self.generated_source.as_path()),
            ("build_dir", self.build_dir.as_path()),
            ("log_file", self.log_file.as_path()),
            ("state_dir", self.state_dir.as_path()),
        ]
    }

    /// Reject layouts where removing a generated path would remove a source.
    ///
    /// An output may not be empty, may not resolve to the project root and
    /// may not be a source or contain one.
    pub fn validate(&self, root: &Path) -> Result<()> {
        let root = normalize(root);
        let sources: Vec<PathBuf> = self
            .sources()
            .iter()
            .map(|p| normalize(&crate::process::resolve(&root, p)))
            .collect();

        for (field, path) in self.outputs() {
            if path.as_os_str().is_empty() {
                return Err(BuildError::config(format!("layout.{} is empty", field)));
            }
            let full = normalize(&crate::process::resolve(&root, path));
            if root.starts_with(&full) {
                return Err(BuildError::config(format!(
                    "layout.{} '{}' is the project root",
                    field,
                    path.display()
                )));
            }
            if let Some(source) = sources.iter().find(|s| s.starts_with(&full)) {
                return Err(BuildError::config(format!(
                    "layout.{} '{}' would remove source '{}'",
                    field,
                    path.display(),
                    source.display()
                )));
            }
        }

        if self.extension_glob.trim().is_empty() {
            return Err(BuildError::config("layout.extension_glob is empty"));
        }
        Ok(())
    }
}

/// Lexically normalize a path: drop `.` components and fold `..`
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Contents of `benchmake.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectFile {
    /// Active toolchain profile name
    pub toolchain: Option<String>,
    /// Extension source generator
    pub generator: Option<String>,
    /// Interpreter for the build script and benchmark
    pub interpreter: Option<String>,
    /// File layout
    pub layout: ProjectLayout,
    /// Per-profile field overrides, keyed by profile name
    pub profiles: BTreeMap<String, ProfileOverride>,
}

impl ProjectFile {
    /// Parse a project file from JSON text
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BuildError::config(format!("invalid project file: {}", e)))
    }

    /// Load a project file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        Self::parse(&content).map_err(|e| match e {
            BuildError::Config(msg) => BuildError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Profile overrides keyed by validated kind
    pub fn profile_overrides(&self) -> Result<BTreeMap<ToolchainKind, ProfileOverride>> {
        let mut out = BTreeMap::new();
        for (name, ov) in &self.profiles {
            let kind: ToolchainKind = name.parse()?;
            out.insert(kind, ov.clone());
        }
        Ok(out)
    }
}

/// Fully-resolved configuration for one build invocation
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    /// Project root; relative layout paths resolve against it
    pub root: PathBuf,
    /// File layout
    pub layout: ProjectLayout,
    /// The single active toolchain profile
    pub profile: ToolchainProfile,
    /// Extension source generator program
    pub generator: String,
    /// Interpreter program
    pub interpreter: String,
    /// Arguments appended to the benchmark invocation
    pub bench_args: Vec<String>,
    /// Plan and report without executing
    pub dry_run: bool,
}

impl BuildConfig {
    /// Default generator program
    pub const DEFAULT_GENERATOR: &'static str = "cython";
    /// Default interpreter program
    pub const DEFAULT_INTERPRETER: &'static str = "python3";

    /// Resolve from CLI arguments, reading the project file if there is one
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let root = match args.root {
            Some(ref root) => root.clone(),
            None => std::env::current_dir().map_err(|e| BuildError::io(".", e))?,
        };

        let project = match args.config {
            Some(ref path) => ProjectFile::load(&crate::process::resolve(&root, path))?,
            None => {
                let default_path = root.join(PROJECT_FILE);
                if default_path.is_file() {
                    ProjectFile::load(&default_path)?
                } else {
                    ProjectFile::default()
                }
            }
        };

        let tools = args.tools.clone().with_profile_env(|key| std::env::var(key).ok());
        let mut config = Self::from_sources(root, project, args.toolchain.as_deref(), &tools)?;
        config.dry_run = args.dry_run;
        if let Some(ref command) = args.command {
            config.bench_args = command.bench_args().to_vec();
        }
        Ok(config)
    }

    /// Resolve from an already-loaded project file plus CLI/env values
    pub fn from_sources(
        root: PathBuf,
        project: ProjectFile,
        toolchain: Option<&str>,
        tools: &ToolArgs,
    ) -> Result<Self> {
        let kind = select_toolchain(toolchain, project.toolchain.as_deref())?;

        let file_overrides = project.profile_overrides()?;
        let from_file = file_overrides.get(&kind).cloned().unwrap_or_default();
        let from_env = tools.profile_env.get(&kind).cloned().unwrap_or_default();
        let merged = from_file
            .merged_with(&from_env)
            .merged_with(&tools.profile_override());
        let profile = kind.builtin_profile().with_override(&merged)?;

        let generator = non_empty(tools.generator.as_deref())
            .or_else(|| non_empty(project.generator.as_deref()))
            .unwrap_or(Self::DEFAULT_GENERATOR)
            .to_string();
        let interpreter = non_empty(tools.interpreter.as_deref())
            .or_else(|| non_empty(project.interpreter.as_deref()))
            .unwrap_or(Self::DEFAULT_INTERPRETER)
            .to_string();

        project.layout.validate(&root)?;

        Ok(Self {
            root,
            layout: project.layout,
            profile,
            generator,
            interpreter,
            bench_args: Vec::new(),
            dry_run: false,
        })
    }

    /// Absolute path of a layout entry
    pub fn path(&self, relative: &Path) -> PathBuf {
        crate::process::resolve(&self.root, relative)
    }
}

/// Pick the single active profile. The first source that is present wins;
/// a present-but-empty value is an error, never a silent fallback.
pub fn select_toolchain(cli: Option<&str>, file: Option<&str>) -> Result<ToolchainKind> {
    match cli.or(file) {
        Some(name) => name.parse(),
        None => Ok(ToolchainKind::default()),
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
