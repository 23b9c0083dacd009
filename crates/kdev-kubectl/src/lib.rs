//! kubectl integration for kdev
//!
//! This crate locates the kubectl executable, runs it with a controlled
//! environment, and turns its output into the identifiers and pod details
//! the rest of kdev works with.

mod executor;
mod locator;
mod parse;
mod process;

pub use executor::{ActivitySink, DEFAULT_LOOKUP_DIRS, Kubectl};
pub use locator::{DEFAULT_KUBECTL_PATHS, ToolLocator};
pub use parse::{container_names, describe, parse_item_names, parse_names, parse_pod};
pub use process::{InteractiveCommand, PortForward};

// Re-export types that are used in our public API
pub use kdev_types::{CopyDirection, KdevError, PodDescription, PortMapping, Result};

#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script into `dir`
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
