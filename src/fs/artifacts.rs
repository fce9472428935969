//! Build artifacts
//!
//! Locates generated files by exact path or glob, reads their modification
//! times, and removes them on clean. Hand-written sources named in the
//! project layout are never removed, neither when a byproduct glob matches
//! them nor when a generated directory contains them.

use crate::config::{normalize, ProjectLayout};
use crate::error::{BuildError, IoResultExt, Result};
use filetime::FileTime;
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file (or set of files) a step reads or writes, relative to the root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ArtifactSpec {
    /// One exact path
    File(PathBuf),
    /// Every file matching a glob
    Glob(String),
}

impl ArtifactSpec {
    /// Human-readable form for messages
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Glob(pattern) => pattern.clone(),
        }
    }

    /// Existing paths this artifact refers to under `root`
    pub fn resolve(&self, root: &Path) -> Result<Vec<PathBuf>> {
        match self {
            Self::File(path) => {
                let full = crate::process::resolve(root, path);
                Ok(if full.exists() { vec![full] } else { Vec::new() })
            }
            Self::Glob(pattern) => glob_matches(root, pattern),
        }
    }

    /// Matching paths with their modification times
    pub fn snapshot(&self, root: &Path) -> Result<Vec<(PathBuf, FileTime)>> {
        self.resolve(root)?
            .into_iter()
            .map(|path| mtime(&path).map(|t| (path, t)))
            .collect()
    }

    /// Newest modification time among the matching files, `None` if nothing
    /// matches
    pub fn newest_mtime(&self, root: &Path) -> Result<Option<FileTime>> {
        let mut newest = None;
        for path in self.resolve(root)? {
            let t = mtime(&path)?;
            newest = Some(newest.map_or(t, |n: FileTime| n.max(t)));
        }
        Ok(newest)
    }
}

/// Modification time of a path
pub fn mtime(path: &Path) -> Result<FileTime> {
    let meta = std::fs::metadata(path).with_path(path)?;
    Ok(FileTime::from_last_modification_time(&meta))
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| BuildError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Paths under `root` whose root-relative path matches `pattern`.
///
/// The walk only descends as deep as the pattern has components, so
/// `bench*.so` looks at the root only and `build/*.o` one level down.
pub fn glob_matches(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    // Matching is against root-relative paths, which never start with `./`
    let pattern = pattern.trim_start_matches("./");
    let matcher = compile_glob(pattern)?;
    let depth = if pattern.contains("**") {
        usize::MAX
    } else {
        Path::new(pattern).components().count().max(1)
    };

    let mut matches = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(depth).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };
        if let Ok(relative) = entry.path().strip_prefix(root) {
            if matcher.is_match(relative) {
                matches.push(entry.path().to_path_buf());
            }
        }
    }
    Ok(matches)
}

/// Everything clean removes, in removal order
pub fn generated_artifacts(layout: &ProjectLayout) -> Vec<ArtifactSpec> {
    let mut specs = vec![
        ArtifactSpec::File(layout.kernel_object.clone()),
        ArtifactSpec::File(layout.generated_source.clone()),
        ArtifactSpec::Glob(layout.extension_glob.clone()),
        ArtifactSpec::File(layout.build_dir.clone()),
    ];
    specs.extend(layout.byproducts.iter().cloned().map(ArtifactSpec::Glob));
    specs.push(ArtifactSpec::File(layout.log_file.clone()));
    specs.push(ArtifactSpec::File(layout.state_dir.clone()));
    specs
}

/// Result of a clean
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    /// Paths that were (or in a dry run, would be) removed
    pub removed: Vec<PathBuf>,
    /// Paths matched by a byproduct glob but kept because they are sources
    pub protected: Vec<PathBuf>,
}

/// Remove all generated artifacts under `root`
pub fn clean(root: &Path, layout: &ProjectLayout, dry_run: bool) -> Result<CleanReport> {
    let sources: Vec<PathBuf> = layout
        .sources()
        .iter()
        .map(|p| normalize(&crate::process::resolve(root, p)))
        .collect();

    let mut report = CleanReport::default();
    for spec in generated_artifacts(layout) {
        for path in spec.resolve(root)? {
            // A directory holding a source counts as the source itself
            let full = normalize(&path);
            if sources.iter().any(|s| s.starts_with(&full)) {
                tracing::warn!("Not removing {:?}: it is or contains a source file", path);
                report.protected.push(path);
                continue;
            }
            if report.removed.contains(&path) {
                continue;
            }
            if !dry_run {
                remove_path(&path)?;
            }
            tracing::debug!("Removed {:?}", path);
            report.removed.push(path);
        }
    }
    Ok(report)
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path).with_path(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path).with_path(path)
    } else {
        std::fs::remove_file(path).with_path(path)
    }
}
