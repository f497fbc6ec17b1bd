//! Job orchestration module.
//!
//! This module provides the three steps of a run:
//! - Creating a job from source/destination paths (`create_job`)
//! - Planning it: write probe, overwrite questions, source manifest (`plan_job`)
//! - Running it: copy, destination manifest, verification (`run_job`)
//!
//! Every fatal condition found while planning stops the run before any byte
//! is copied.

use crate::config::Settings;
use crate::copy_agent::CopyAgent;
use crate::enumerate::{self, JUNK_FILE_NAMES};
use crate::error::EngineError;
use crate::event_log::EventLog;
use crate::manifest::{self, MANIFEST_SUFFIX};
use crate::model::{JobState, OverwriteDecision, RunSummary, TransferJob};
use crate::progress::ProgressCallback;
use crate::prompt::Prompter;
use crate::{store, transfer, verify};
use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Log name used when a rejected source names no folder.
const FALLBACK_LOG_NAME: &str = "copyit";

fn expect_state(job: &TransferJob, expected: JobState) -> Result<(), EngineError> {
    if job.state != expected {
        return Err(EngineError::InvalidJobState {
            expected,
            actual: job.state,
        });
    }
    Ok(())
}

/// Detect an information package: a directory holding exactly
/// `<id>_manifest.md5` and a directory `<id>`.
///
/// Returns the payload directory `<dir>/<id>`. Junk files are ignored while
/// counting entries.
pub fn find_information_package(dir: &Path) -> Result<Option<PathBuf>, EngineError> {
    let listing_error = |e: io::Error| EngineError::EnumerationFailed {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(listing_error)? {
        let name = entry.map_err(listing_error)?.file_name().to_string_lossy().into_owned();
        if !JUNK_FILE_NAMES.contains(&name.as_str()) {
            names.push(name);
        }
    }
    if names.len() != 2 {
        return Ok(None);
    }

    for name in &names {
        let Some(id) = name.strip_suffix(MANIFEST_SUFFIX) else {
            continue;
        };
        let payload = dir.join(id);
        if !id.is_empty() && dir.join(name).is_file() && payload.is_dir() {
            return Ok(Some(payload));
        }
    }
    Ok(None)
}

fn check_source(source: &Path) -> Result<(), EngineError> {
    match fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::SourceNotDirectory {
            path: source.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: source.to_path_buf(),
        }),
        Err(e) => Err(EngineError::ReadError {
            path: source.to_path_buf(),
            source: e,
        }),
    }
}

fn record_opening(log: &EventLog, source: &Path, destination: &Path) {
    log.record("copyit started.");
    log.record(&format!("eventDetail=copyit {}", env!("CARGO_PKG_VERSION")));
    log.record(&format!("Source: {}", source.display()));
    log.record(&format!("Destination: {}", destination.display()));
}

/// Validate the paths and settle the folder name. Returns the job and
/// whether an information package was unpacked.
fn prepare_job(
    source: &Path,
    destination: &Path,
    fast_copy: bool,
    settings: &Settings,
    prompter: &mut dyn Prompter,
) -> Result<(TransferJob, bool), EngineError> {
    check_source(source)?;

    let package = find_information_package(source)?;
    let (source_path, destination_path) = match &package {
        Some(payload) => {
            let package_destination = match source.file_name() {
                Some(name) => destination.join(name),
                None => destination.to_path_buf(),
            };
            fs::create_dir_all(&package_destination).map_err(|e| EngineError::DirectoryCreationFailed {
                path: package_destination.clone(),
                source: e,
            })?;
            tracing::info!("information package found, payload {}", payload.display());
            (payload.clone(), package_destination)
        }
        None => (source.to_path_buf(), destination.to_path_buf()),
    };

    let (folder_name, rootless) = match transfer::folder_name_of(&source_path) {
        Some(name) => (name, false),
        None => (transfer::ask_folder_name(prompter)?, true),
    };

    settings.ensure_dirs()?;
    let job = TransferJob::new(
        source_path,
        destination_path,
        folder_name,
        rootless,
        fast_copy,
        &settings.manifest_dir,
    );
    Ok((job, package.is_some()))
}

/// Log a job that failed before it had a log of its own.
///
/// The log is named after the source folder, or `copyit` for a bare root.
fn log_failed_start(source: &Path, destination: &Path, settings: &Settings, err: &EngineError) {
    let name = transfer::folder_name_of(source).unwrap_or_else(|| FALLBACK_LOG_NAME.to_string());
    let log = match EventLog::create(&settings.logs_dir, &name, Local::now()) {
        Ok(log) => log,
        Err(e) => {
            tracing::warn!("no event log for rejected source {}: {}", source.display(), e);
            return;
        }
    };
    record_opening(&log, source, destination);
    if matches!(err, EngineError::SourceNotDirectory { .. }) {
        log.error("Attempted file transfer. Source and Destination must be a directory");
    }
    log.error(&err.to_string());
    log.record("copyit exit");
}

/// Create a new transfer job and open its event log.
///
/// The source must be an existing directory. If it is an information package
/// the payload folder becomes the source and a folder named after the
/// package is created in the destination to receive it. When the source
/// names no folder (a bare root, or a path ending in a separator) the
/// prompter is asked for one.
///
/// A job rejected here still leaves a log with an `ERROR = ...` line.
///
/// # Errors
/// `SourceNotFound`, `SourceNotDirectory`, or any failure creating the
/// report directories and the log.
pub fn create_job(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    fast_copy: bool,
    settings: &Settings,
    prompter: &mut dyn Prompter,
) -> Result<(TransferJob, EventLog), EngineError> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    let (job, package_found) = match prepare_job(source, destination, fast_copy, settings, prompter) {
        Ok(prepared) => prepared,
        Err(e) => {
            log_failed_start(source, destination, settings, &e);
            return Err(e);
        }
    };

    let log = EventLog::create(&settings.logs_dir, &job.folder_name, job.created_at)?;
    record_opening(&log, &job.source_path, &job.destination_path);
    if package_found {
        log.event(&format!("Information package found - payload: {}", job.source_path.display()));
    }

    tracing::debug!("created job {} for {}", job.id, job.folder_name);
    Ok((job, log))
}

/// Plan a job: everything that must hold before the copy starts.
///
/// Probes the destination, asks the overwrite questions, removes junk files
/// from the source, walks it and settles the source manifest.
///
/// # Errors
/// `InvalidJobState` unless the job is `Pending`; any probe, prompt,
/// enumeration or manifest failure, including `StaleManifest`.
pub fn plan_job(
    job: &mut TransferJob,
    prompter: &mut dyn Prompter,
    log: &EventLog,
    progress: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    expect_state(job, JobState::Pending)?;

    transfer::probe_write_access(&job.destination_path, log)?;
    transfer::arbitrate_overwrites(job, prompter)?;

    enumerate::remove_junk_files(&job.source_path, Some(log));
    let enumeration = enumerate::enumerate(&job.source_path)?;
    let resolved = store::resolve_source_manifest(job, &enumeration, log, progress)?;

    tracing::info!(
        "planned {}: {} files, {} source manifest {}",
        job.folder_name,
        enumeration.count,
        resolved.0,
        resolved.1.display()
    );
    job.enumeration = Some(enumeration);
    job.source_manifest = Some(resolved);
    job.state = JobState::Planned;
    Ok(())
}

fn discard_rebased(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("could not remove rebased manifest {}: {}", path.display(), e);
    }
}

/// Run a planned job.
///
/// Copies with `agent`, writes the destination manifest (unless the user
/// kept an existing one), compares it with the source manifest and archives
/// the working manifest when it lives in the manifest cache.
///
/// A checksum mismatch is not an error: it is logged and returned in
/// `RunSummary::report`.
///
/// # Errors
/// `InvalidJobState` unless the job is `Planned`; any copy, hashing or
/// manifest I/O failure.
pub fn run_job(
    job: &mut TransferJob,
    agent: &dyn CopyAgent,
    log: &EventLog,
    progress: Option<&dyn ProgressCallback>,
    settings: &Settings,
) -> Result<RunSummary, EngineError> {
    expect_state(job, JobState::Planned)?;
    let source_manifest = job
        .source_manifest
        .as_ref()
        .map(|(_, path)| path.clone())
        .ok_or(EngineError::InvalidJobState {
            expected: JobState::Planned,
            actual: job.state,
        })?;

    transfer::transfer(job, agent, log)?;

    let destination_manifest_count = if job.overwrite.manifest.should_write() {
        if job.overwrite.manifest == OverwriteDecision::Overwrite {
            log.event("Destination Manifest Overwrite - Destination manifest already exists - Overwriting.");
        }
        log.event(
            "Generating destination manifest: status=started, eventType=message digest calculation, module=md5",
        );
        let count = manifest::build_to_file(
            &job.destination_final_path,
            &job.manifests.destination,
            &job.destination_path,
            progress,
        )?;
        log.event("Generating destination manifest: status=completed");
        Some(count)
    } else {
        log.event("Destination Manifest Overwrite - Destination manifest already exists - Not Overwriting.");
        None
    };

    enumerate::remove_junk_files(&job.destination_final_path, Some(log));
    let destination_count = if job.destination_final_path.is_dir() {
        enumerate::count_all_files(&job.destination_final_path)?
    } else {
        0
    };
    let source_count = job.enumeration.as_ref().map_or(0, |e| e.count);

    let working = if job.rootless {
        transfer::rebase_manifest(&source_manifest, &job.folder_name, &settings.manifest_dir)?
    } else {
        source_manifest
    };

    let report = match verify::compare(&working, &job.manifests.destination) {
        Ok(report) => report,
        Err(e) => {
            if job.rootless {
                discard_rebased(&working);
            }
            return Err(e);
        }
    };
    verify::report(&report, log);
    if !report.is_success() {
        log.event(&format!(
            "File Transfer Failure Explanation - {} files in your destination, {} files at source",
            destination_count, source_count
        ));
    }

    let archived_manifest = if working.parent() == Some(settings.manifest_dir.as_path()) {
        Some(verify::archive_manifest(&working, &settings.old_manifests_dir(), Local::now())?)
    } else {
        None
    };

    job.state = JobState::Completed;
    log.record("copyit finished.");

    Ok(RunSummary {
        report,
        source_count,
        destination_manifest_count,
        destination_count,
        archived_manifest,
    })
}
