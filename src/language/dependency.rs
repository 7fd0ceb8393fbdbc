// Shared pieces for dependency installation: primary/fallback tool selection,
// staging artifact cleanup, and `name:version` dependency specs

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::process::ToolRunner;

/// A tool picked from an ordered candidate list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTool {
    pub name: &'static str,
    pub path: PathBuf,
}

/// Pick the first candidate present on the search path.
///
/// Candidates are tried strictly in order so the choice only depends on which tools
/// are installed.
pub fn select_tool(runner: &dyn ToolRunner, candidates: &[&'static str]) -> Option<SelectedTool> {
    let selected = candidates.iter().find_map(|name| {
        runner
            .find_executable(name)
            .map(|path| SelectedTool { name: *name, path })
    });
    debug!(
        candidates = ?candidates,
        selected = ?selected.as_ref().map(|t| t.name),
        "Tool selection"
    );
    selected
}

/// Files and directories a toolchain writes into the repository working tree while
/// installing. Everything tracked is removed when the guard drops.
#[derive(Debug, Default)]
pub struct StagingGuard {
    paths: Vec<PathBuf>,
}

impl StagingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else if path.exists() {
                std::fs::remove_file(&path)
            } else {
                continue;
            };

            match result {
                Ok(()) => debug!(path = %path.display(), "Removed staging artifact"),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove staging artifact"
                ),
            }
        }
    }
}

/// Split `name:version` into its parts. A spec without a colon has no version.
pub fn split_versioned(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(':') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            (name, Some(version))
        }
        _ => (spec, None),
    }
}
