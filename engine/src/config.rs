//! Well-known report directories.
//!
//! Cached source manifests and per-run logs live under one reports root:
//!
//! ```text
//! <reports root>/
//!     manifests/
//!         old_manifests/
//!     logs/
//! ```
//!
//! The root defaults to `moveit_reports` on the desktop (or in the home
//! directory when there is no desktop) and can be moved with the
//! `COPYIT_REPORTS_DIR` environment variable.

use crate::error::EngineError;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the reports root.
pub const REPORTS_DIR_ENV: &str = "COPYIT_REPORTS_DIR";

/// Archive subfolder of the manifest cache.
pub const OLD_MANIFESTS_DIR: &str = "old_manifests";

/// Directories used by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Cache of generated source manifests
    pub manifest_dir: PathBuf,
    /// Per-run event logs
    pub logs_dir: PathBuf,
}

impl Settings {
    /// Lay the report directories out under `reports_root`.
    pub fn under(reports_root: &Path) -> Self {
        Settings {
            manifest_dir: reports_root.join("manifests"),
            logs_dir: reports_root.join("logs"),
        }
    }

    /// Resolve the reports root from the environment or the platform defaults.
    pub fn from_env() -> Self {
        Self::under(&reports_root(std::env::var_os(REPORTS_DIR_ENV)))
    }

    /// Where consumed manifests are archived.
    pub fn old_manifests_dir(&self) -> PathBuf {
        self.manifest_dir.join(OLD_MANIFESTS_DIR)
    }

    /// Create every report directory that does not exist yet.
    pub fn ensure_dirs(&self) -> Result<(), EngineError> {
        for dir in [&self.manifest_dir, &self.old_manifests_dir(), &self.logs_dir] {
            fs::create_dir_all(dir).map_err(|e| EngineError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

fn reports_root(override_dir: Option<OsString>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::desktop_dir()
            .or_else(dirs::home_dir)
            .map(|d| d.join("moveit_reports"))
            .unwrap_or_else(|| PathBuf::from("moveit_reports")),
    }
}
