//! Tree enumeration.
//!
//! Hidden entries (names starting with `.`) and the Windows
//! `System Volume Information` folder are pruned from every walk. The
//! enumerator and the manifest builder share `candidate_files` so they always
//! agree on which files belong to a tree.

use crate::error::EngineError;
use crate::event_log::EventLog;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Reserved folder created by Windows at the root of every volume.
pub const SYSTEM_VOLUME_MARKER: &str = "System Volume Information";

/// Platform junk files removed from source and destination trees.
pub const JUNK_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Result of a fresh walk over a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// Number of files found
    pub count: usize,
    /// Bare file names, in no particular order
    pub names: Vec<String>,
}

/// True if an entry with this name is skipped by every walk.
pub fn is_excluded(name: &str) -> bool {
    name.starts_with('.') || name == SYSTEM_VOLUME_MARKER
}

fn is_pruned(entry: &DirEntry) -> bool {
    // The walk root itself is never pruned, even if it is a dot-directory.
    entry.depth() > 0 && is_excluded(&entry.file_name().to_string_lossy())
}

fn walk_error(root: &Path, err: walkdir::Error) -> EngineError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop detected"));
    EngineError::EnumerationFailed { path, source }
}

/// Full paths of every non-excluded file under `root`.
///
/// If `root` is itself a file, it is the only candidate.
pub fn candidate_files(root: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_pruned(e)) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Count the files under `root` and collect their bare names.
pub fn enumerate(root: &Path) -> Result<Enumeration, EngineError> {
    let names: Vec<String> = candidate_files(root)?
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();

    tracing::debug!("enumerated {} files under {}", names.len(), root.display());
    Ok(Enumeration {
        count: names.len(),
        names,
    })
}

/// Count every file under `root`, hidden or not.
pub fn count_all_files(root: &Path) -> Result<usize, EngineError> {
    let mut count = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// Delete `.DS_Store`, `Thumbs.db` and `desktop.ini` files under `root`.
///
/// Removal failures (typically a read-only source) are logged and skipped.
/// Returns the paths that were actually removed.
pub fn remove_junk_files(root: &Path, log: Option<&EventLog>) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !JUNK_FILE_NAMES.contains(&name.as_ref()) {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("removed unwanted file {}", path.display());
                if let Some(log) = log {
                    log.event(&format!(
                        "Unwanted file removal - {} was removed",
                        path.display()
                    ));
                }
                removed.push(path.to_path_buf());
            }
            Err(e) => {
                tracing::warn!("can't delete {} as source is read-only: {}", path.display(), e);
                if let Some(log) = log {
                    log.event(&format!(
                        "Unwanted file removal - Failure - {} could not be removed: {}",
                        path.display(),
                        e
                    ));
                }
            }
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, b"x").expect("Failed to write file");
    }

    #[test]
    fn test_enumerate_prunes_hidden_and_system_entries() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("src");
        touch(&root.join("a.txt"));
        touch(&root.join("b").join("c.txt"));
        touch(&root.join(".hidden_file"));
        touch(&root.join(".git").join("config"));
        touch(&root.join(SYSTEM_VOLUME_MARKER).join("IndexerVolumeGuid"));
        touch(&root.join("b").join(".secret").join("d.txt"));

        let result = enumerate(&root).expect("Failed to enumerate");

        assert_eq!(result.count, 2);
        let mut names = result.names.clone();
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "c.txt".to_string()]);
    }

    #[test]
    fn test_system_marker_is_case_sensitive() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("src");
        touch(&root.join("system volume information").join("kept.txt"));

        let result = enumerate(&root).expect("Failed to enumerate");
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_hidden_root_is_still_walked() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join(".staging");
        touch(&root.join("a.txt"));

        assert_eq!(enumerate(&root).expect("Failed to enumerate").count, 1);
    }

    #[test]
    fn test_enumerate_nonexistent_root_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = enumerate(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(EngineError::EnumerationFailed { .. })));
    }

    #[test]
    fn test_count_all_files_includes_hidden() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        touch(&root.join("a.txt"));
        touch(&root.join(".hidden"));

        assert_eq!(count_all_files(root).expect("Failed to count"), 2);
    }

    #[test]
    fn test_remove_junk_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        touch(&root.join("a.txt"));
        touch(&root.join("Thumbs.db"));
        touch(&root.join("sub").join(".DS_Store"));
        touch(&root.join("sub").join("desktop.ini"));

        let log = EventLog::open(root.join("run.log")).expect("Failed to open log");
        let removed = remove_junk_files(root, Some(&log));

        assert_eq!(removed.len(), 3);
        assert!(root.join("a.txt").exists());
        assert!(!root.join("Thumbs.db").exists());
        let contents = fs::read_to_string(log.path()).expect("Failed to read log");
        assert_eq!(contents.matches("Unwanted file removal").count(), 3);
    }
}
