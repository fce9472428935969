//! Toolchain profiles
//!
//! A profile maps each toolchain role (compiler, compiler flags, linker,
//! linker flags) to a value. Exactly one profile is active per build and
//! it is never mutated once the build configuration is resolved.

use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::Xxh3;

/// The mutually exclusive toolchain families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainKind {
    /// GNU Fortran
    #[default]
    Gnu,
    /// Intel Fortran
    Intel,
    /// NAG Fortran
    Nag,
}

impl ToolchainKind {
    /// All known kinds, in display order
    pub const ALL: [ToolchainKind; 3] = [Self::Gnu, Self::Intel, Self::Nag];

    /// Short name used on the command line and in files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gnu => "gnu",
            Self::Intel => "intel",
            Self::Nag => "nag",
        }
    }

    /// Human-readable vendor name
    pub fn vendor(&self) -> &'static str {
        match self {
            Self::Gnu => "GNU",
            Self::Intel => "Intel",
            Self::Nag => "NAG",
        }
    }

    /// Built-in profile for this kind
    pub fn builtin_profile(&self) -> ToolchainProfile {
        match self {
            Self::Gnu => ToolchainProfile {
                kind: *self,
                compiler: "gfortran".to_string(),
                compiler_flags: split_flags("-O3 -march=native -fPIC"),
                linker: Some("gfortran".to_string()),
                linker_flags: split_flags("-shared"),
            },
            Self::Intel => ToolchainProfile {
                kind: *self,
                compiler: "ifort".to_string(),
                compiler_flags: split_flags("-O3 -xHost -fPIC"),
                linker: Some("ifort".to_string()),
                linker_flags: split_flags("-shared -nofor-main"),
            },
            // nagfor has no separate link step in this build
            Self::Nag => ToolchainProfile {
                kind: *self,
                compiler: "nagfor".to_string(),
                compiler_flags: split_flags("-O4 -PIC"),
                linker: None,
                linker_flags: Vec::new(),
            },
        }
    }

    /// Prefix of the environment variables that override this profile
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Gnu => "BENCHMAKE_GNU",
            Self::Intel => "BENCHMAKE_INTEL",
            Self::Nag => "BENCHMAKE_NAG",
        }
    }

    fn expected_names() -> String {
        Self::ALL
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolchainKind {
    type Err = BuildError;

    /// Parse a profile name. Empty means unset; anything unknown is rejected
    /// rather than mapped to a default.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.is_empty() {
            return Err(BuildError::ProfileUnset);
        }
        match name.to_ascii_lowercase().as_str() {
            "gnu" => Ok(Self::Gnu),
            "intel" => Ok(Self::Intel),
            "nag" => Ok(Self::Nag),
            _ => Err(BuildError::UnknownProfile {
                name: name.to_string(),
                expected: Self::expected_names(),
            }),
        }
    }
}

/// A fully-specified toolchain profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainProfile {
    /// Which family this profile belongs to
    pub kind: ToolchainKind,
    /// Compiler executable
    pub compiler: String,
    /// Flags passed when compiling the kernel
    pub compiler_flags: Vec<String>,
    /// Linker executable, if the toolchain links separately
    pub linker: Option<String>,
    /// Flags passed to the linker
    pub linker_flags: Vec<String>,
}

/// Partial profile used for overrides from the project file or environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileOverride {
    /// Compiler executable
    pub compiler: Option<String>,
    /// Whitespace-separated compiler flags
    pub compiler_flags: Option<String>,
    /// Linker executable; empty disables the separate link command
    pub linker: Option<String>,
    /// Whitespace-separated linker flags
    pub linker_flags: Option<String>,
}

impl ProfileOverride {
    /// Read `BENCHMAKE_<KIND>_FC`, `_FFLAGS`, `_FLINKER` and `_LDFLAGS` for
    /// one profile. Unset or empty variables leave the field alone.
    pub fn from_env<F>(kind: ToolchainKind, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}_{}", kind.env_prefix(), suffix)).filter(|v| !v.trim().is_empty())
        };
        ProfileOverride {
            compiler: var("FC"),
            compiler_flags: var("FFLAGS"),
            linker: var("FLINKER"),
            linker_flags: var("LDFLAGS"),
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn merged_with(&self, other: &ProfileOverride) -> ProfileOverride {
        ProfileOverride {
            compiler: other.compiler.clone().or_else(|| self.compiler.clone()),
            compiler_flags: other
                .compiler_flags
                .clone()
                .or_else(|| self.compiler_flags.clone()),
            linker: other.linker.clone().or_else(|| self.linker.clone()),
            linker_flags: other
                .linker_flags
                .clone()
                .or_else(|| self.linker_flags.clone()),
        }
    }
}

impl ToolchainProfile {
    /// Apply a partial override, returning the adjusted profile
    pub fn with_override(mut self, ov: &ProfileOverride) -> Result<Self> {
        if let Some(ref compiler) = ov.compiler {
            if compiler.trim().is_empty() {
                return Err(BuildError::config(format!(
                    "compiler for profile '{}' is empty",
                    self.kind
                )));
            }
            self.compiler = compiler.trim().to_string();
        }
        if let Some(ref flags) = ov.compiler_flags {
            self.compiler_flags = split_flags(flags);
        }
        if let Some(ref linker) = ov.linker {
            let linker = linker.trim();
            self.linker = if linker.is_empty() {
                None
            } else {
                Some(linker.to_string())
            };
        }
        if let Some(ref flags) = ov.linker_flags {
            self.linker_flags = split_flags(flags);
        }
        Ok(self)
    }

    /// Command line used to link shared objects, e.g. `gfortran -shared`
    pub fn link_command(&self) -> Option<String> {
        self.linker.as_ref().map(|linker| {
            std::iter::once(linker.as_str())
                .chain(self.linker_flags.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    /// Stable hash over every field of the profile
    pub fn fingerprint(&self) -> String {
        let mut hasher = Xxh3::new();
        let mut feed = |s: &str| {
            hasher.update(s.as_bytes());
            hasher.update(&[0]);
        };
        feed(self.kind.name());
        feed(&self.compiler);
        feed(&self.compiler_flags.join("\u{1f}"));
        feed(self.linker.as_deref().unwrap_or(""));
        feed(&self.linker_flags.join("\u{1f}"));
        format!("{:032x}", hasher.digest128())
    }
}

/// Split a flag string on whitespace into an argument vector
pub fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_string).collect()
}
