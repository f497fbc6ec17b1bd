//! Filesystem operations for the in-process copy agent.
//!
//! This module provides:
//! - Recursive tree copy honoring `CopyOptions`
//! - File copy with mode and modification time preservation
//! - Parent directory creation

use crate::copy_agent::CopyOptions;
use crate::enumerate::is_excluded;
use crate::error::EngineError;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Copy the contents of `source` into `destination`, creating it if needed.
///
/// Symbolic links are skipped. Returns the number of files written.
///
/// # Errors
/// Stops at the first file or directory that cannot be read or written.
pub fn copy_tree(source: &Path, destination: &Path, options: &CopyOptions) -> Result<usize, EngineError> {
    fs::create_dir_all(destination).map_err(|e| EngineError::DirectoryCreationFailed {
        path: destination.to_path_buf(),
        source: e,
    })?;

    let mut walker = WalkDir::new(source).min_depth(1);
    if !options.recursive {
        walker = walker.max_depth(1);
    }

    let mut copied = 0;
    let entries = walker
        .into_iter()
        .filter_entry(|e| !(options.exclude_hidden && is_excluded(&e.file_name().to_string_lossy())));

    for entry in entries {
        let entry = entry.map_err(|e| EngineError::EnumerationFailed {
            path: e.path().unwrap_or(source).to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop detected")),
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| EngineError::DirectoryCreationFailed {
                path: target.clone(),
                source: e,
            })?;
        } else if file_type.is_file() {
            if options.no_clobber && target.exists() {
                tracing::debug!("not overwriting existing {}", target.display());
                continue;
            }
            copy_file_with_metadata(entry.path(), &target, options.preserve_mode_and_timestamps)?;
            copied += 1;
        } else {
            tracing::warn!("skipping special file {}", entry.path().display());
        }
    }

    Ok(copied)
}

/// Copy a file from source to destination.
///
/// With `preserve` set, the permission bits and modification time of the
/// source are applied to the copy.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path, preserve: bool) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;
    drop(dst_file);

    if preserve {
        let write_error = |e| EngineError::WriteError {
            path: dst.to_path_buf(),
            source: e,
        };
        if let Ok(mtime) = src_metadata.modified() {
            filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime))
                .map_err(write_error)?;
        }
        fs::set_permissions(dst, src_metadata.permissions()).map_err(write_error)?;
    }

    Ok(bytes_copied)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}
