use std::ffi::OsString;
use std::path::{Path, PathBuf};

use kdev_types::{KdevError, Result};

const KUBECTL: &str = "kubectl";

/// Fixed install locations checked before the search path
pub const DEFAULT_KUBECTL_PATHS: &[&str] = &["/usr/local/bin/kubectl", "/usr/bin/kubectl"];

/// Finds the external tool executable
///
/// Resolution is repeated on every call so a tool installed after startup is
/// picked up without restarting.
#[derive(Clone, Debug)]
pub struct ToolLocator {
    program: String,
    candidates: Vec<PathBuf>,
    /// Search path override; the process `PATH` when unset
    search_path: Option<OsString>,
}

impl ToolLocator {
    /// Locator for kubectl with the default install locations
    pub fn kubectl() -> Self {
        Self::new(KUBECTL, DEFAULT_KUBECTL_PATHS.iter().map(PathBuf::from))
    }

    pub fn new<I>(program: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        Self {
            program: program.into(),
            candidates: candidates.into_iter().collect(),
            search_path: None,
        }
    }

    /// Search these directories instead of the process `PATH` on fallback
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Resolve the executable path
    pub fn locate(&self) -> Result<PathBuf> {
        if let Some(found) = self.candidates.iter().find(|c| is_executable(c)) {
            return Ok(found.clone());
        }

        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
                which::which_in(&self.program, Some(paths), cwd)
            }
            None => which::which(&self.program),
        };

        found.map_err(|_| KdevError::ToolNotFound(self.program.clone()))
    }
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::kubectl()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
