//! # benchmake - build orchestration for Fortran kernel benchmarks
//!
//! benchmake compiles a Fortran numerical kernel into an object, generates a
//! native extension from an interface description, builds that extension in
//! place against the kernel, and finally runs the benchmark entry point.
//!
//! ## Features
//!
//! - **Toolchain profiles**: GNU, Intel and NAG, exactly one active per build
//! - **Explicit step graph**: declared inputs and outputs, topological order
//! - **Freshness checks**: modification times plus toolchain fingerprints
//! - **Structured processes**: captured exit status and output, fail-fast
//! - **Clean**: removes generated artifacts and never touches sources
//!
//! ## Quick Start
//!
//! ```no_run
//! use benchmake::config::{BuildConfig, ProjectFile, ToolArgs};
//! use benchmake::core::{BuildEngine, Recipe};
//! use std::path::PathBuf;
//!
//! let config = BuildConfig::from_sources(
//!     PathBuf::from("/path/to/project"),
//!     ProjectFile::default(),
//!     Some("intel"),
//!     &ToolArgs::default(),
//! ).unwrap();
//!
//! let engine = BuildEngine::new(config).unwrap();
//! let report = engine.execute(Recipe::All).unwrap();
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod process;
pub mod progress;
pub mod state;
pub mod toolchain;

// Re-export commonly used types
pub use config::BuildConfig;
pub use core::{BuildEngine, BuildReport, Recipe};
pub use error::{BuildError, Result};
pub use toolchain::{ToolchainKind, ToolchainProfile};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use benchmake::prelude::*;
    //! ```

    pub use crate::config::{BuildConfig, CliArgs, ProjectFile, ProjectLayout, ToolArgs};
    pub use crate::core::{BuildEngine, BuildReport, Recipe, StepId};
    pub use crate::error::{BuildError, Result};
    pub use crate::process::{Invocation, ProcessRunner, SystemRunner};
    pub use crate::progress::StepReporter;
    pub use crate::toolchain::{ToolchainKind, ToolchainProfile};
}
