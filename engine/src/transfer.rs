//! Transfer orchestration.
//!
//! Everything between "the source manifest is trusted" and "the bytes are at
//! the destination": the write probe, overwrite questions, running the copy
//! agent, and rebasing manifest paths when the source had no folder name.

use crate::copy_agent::{CopyAgent, CopyOptions, CopyReport, CopyRequest};
use crate::error::EngineError;
use crate::event_log::EventLog;
use crate::manifest::Manifest;
use crate::model::{OverwriteDecision, OverwriteDecisions, TransferJob};
use crate::prompt::Prompter;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_EXISTS_QUESTION: &str = "A manifest already exists at your destination. Overwrite? Y/N?";
pub const DIRECTORY_EXISTS_QUESTION: &str = "A directory already exists at your destination. Overwrite? Y/N?";
pub const FOLDER_NAME_QUESTION: &str = "What do you want your destination folder to be called?";

/// Folder name supplied by a source path, if any.
///
/// A bare root (`/`, `D:\`) or a path ending in a separator names no folder;
/// its contents are copied into a folder the user names instead.
pub fn folder_name_of(source: &Path) -> Option<String> {
    let text = source.as_os_str().to_string_lossy();
    if text.ends_with('/') || text.ends_with('\\') {
        return None;
    }
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

fn is_valid_folder_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(|c: char| c == '/' || c == '\\')
}

/// Ask for a destination folder name until a usable one is given.
pub fn ask_folder_name(prompter: &mut dyn Prompter) -> Result<String, EngineError> {
    loop {
        let answer = prompter.ask(FOLDER_NAME_QUESTION)?;
        if is_valid_folder_name(&answer) {
            return Ok(answer);
        }
        tracing::warn!("rejected destination folder name '{}'", answer);
    }
}

/// Check that files can be created in `destination`.
///
/// A temporary file is created and removed again.
///
/// # Errors
/// `DestinationNotDirectory` when the path is missing or a file,
/// `DestinationAccessDenied` when the probe file cannot be created.
pub fn probe_write_access(destination: &Path, log: &EventLog) -> Result<(), EngineError> {
    if !destination.is_dir() {
        log.record(&format!(
            "{} is either not a directory or it does not exist",
            destination.display()
        ));
        return Err(EngineError::DestinationNotDirectory {
            path: destination.to_path_buf(),
        });
    }

    let probe = tempfile::Builder::new()
        .prefix(".copyit_probe")
        .suffix(".tmp")
        .tempfile_in(destination)
        .and_then(|file| file.close());

    if let Err(e) = probe {
        log.event("I/O Test - Failure - No write access to destination directory.");
        return Err(EngineError::DestinationAccessDenied {
            path: destination.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

fn decide(
    prompter: &mut dyn Prompter,
    exists: bool,
    question: &str,
) -> Result<OverwriteDecision, EngineError> {
    if !exists {
        return Ok(OverwriteDecision::NotNeeded);
    }
    Ok(if prompter.confirm(question)? {
        OverwriteDecision::Overwrite
    } else {
        OverwriteDecision::Keep
    })
}

/// Ask about destination artifacts that already exist.
///
/// The manifest question comes first, then the directory question. Absent
/// artifacts are not asked about.
pub fn arbitrate_overwrites(
    job: &mut TransferJob,
    prompter: &mut dyn Prompter,
) -> Result<OverwriteDecisions, EngineError> {
    let decisions = OverwriteDecisions {
        manifest: decide(prompter, job.manifests.destination.is_file(), MANIFEST_EXISTS_QUESTION)?,
        directory: decide(prompter, job.destination_final_path.is_dir(), DIRECTORY_EXISTS_QUESTION)?,
    };
    job.overwrite = decisions;
    Ok(decisions)
}

/// Copy the source into the final destination folder.
///
/// Returns `None` when the user chose to keep an existing destination
/// directory and nothing was copied.
pub fn transfer(
    job: &TransferJob,
    agent: &dyn CopyAgent,
    log: &EventLog,
) -> Result<Option<CopyReport>, EngineError> {
    match job.overwrite.directory {
        OverwriteDecision::Keep => {
            log.event("File Transfer Overwrite - Destination directory already exists - Not Overwriting.");
            return Ok(None);
        }
        OverwriteDecision::Overwrite => {
            log.event("File Transfer Overwrite - Destination directory already exists - Overwriting.");
        }
        OverwriteDecision::NotNeeded => {}
    }

    let request = CopyRequest {
        source: &job.source_path,
        destination: &job.destination_final_path,
        options: CopyOptions::default(),
    };

    log.event(&format!("File Transfer, status=started, agentName={}", agent.name()));
    match agent.copy(&request) {
        Ok(report) => {
            log.event(&format!("File Transfer, status=completed, agentName={}", agent.name()));
            Ok(Some(report))
        }
        Err(e) => {
            log.event(&format!("File Transfer, status=failed, agentName={}", agent.name()));
            Err(e)
        }
    }
}

/// Write a copy of `manifest` with `folder/` inserted before every path.
///
/// The copy is a new `.md5` file in `manifest_dir`; the input is untouched.
/// Returns the path of the copy.
pub fn rebase_manifest(manifest: &Path, folder: &str, manifest_dir: &Path) -> Result<PathBuf, EngineError> {
    let rebased = Manifest::read(manifest)?.rebased(folder);

    fs::create_dir_all(manifest_dir).map_err(|e| EngineError::DirectoryCreationFailed {
        path: manifest_dir.to_path_buf(),
        source: e,
    })?;
    let write_error = |e| EngineError::WriteError {
        path: manifest_dir.to_path_buf(),
        source: e,
    };

    let mut temp = tempfile::Builder::new()
        .prefix(&format!("{}_rebased_", folder))
        .suffix(".md5")
        .tempfile_in(manifest_dir)
        .map_err(write_error)?;
    temp.write_all(rebased.to_text().as_bytes()).map_err(write_error)?;
    temp.flush().map_err(write_error)?;

    let (_, path) = temp.keep().map_err(|e| write_error(e.error))?;
    Ok(path)
}

/// True if `err` means the current user may not write somewhere.
pub fn is_permission_error(err: &EngineError) -> bool {
    match err {
        EngineError::DestinationAccessDenied { source, .. }
        | EngineError::WriteError { source, .. }
        | EngineError::DirectoryCreationFailed { source, .. } => source.kind() == ErrorKind::PermissionDenied,
        _ => false,
    }
}
