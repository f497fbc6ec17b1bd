//! Per-run audit trail.
//!
//! Each run appends human-readable `EVENT = ...` / `ERROR = ...` lines to its
//! own log file. Lines are never rewritten. Every record is mirrored to
//! `tracing` so diagnostics and the audit trail tell the same story.

use crate::error::EngineError;
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Timestamp suffix used in log and archived manifest file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "_%Y_%m_%dT%H_%M_%S";

/// Append-only event log for one run.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl EventLog {
    /// Open a new log named after the destination folder and start time.
    pub fn create(logs_dir: &Path, folder_name: &str, started: DateTime<Local>) -> Result<Self, EngineError> {
        fs::create_dir_all(logs_dir).map_err(|e| EngineError::DirectoryCreationFailed {
            path: logs_dir.to_path_buf(),
            source: e,
        })?;
        let file_name = format!("{}{}.log", folder_name, started.format(FILE_TIMESTAMP_FORMAT));
        Self::open(logs_dir.join(file_name))
    }

    /// Open (or continue) a log at an explicit path.
    pub fn open(path: PathBuf) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EngineError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        Ok(EventLog {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a raw line.
    ///
    /// A failed write is reported through `tracing` only; losing an audit line
    /// must not abort a transfer that is otherwise healthy.
    pub fn record(&self, message: &str) {
        tracing::info!(target: "copyit::event", "{}", message);
        let line = format!("{}, {}\n", Local::now().to_rfc3339(), message);
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            tracing::warn!("could not append to event log {}: {}", self.path.display(), e);
        }
    }

    /// Append an `EVENT = ...` line.
    pub fn event(&self, message: &str) {
        self.record(&format!("EVENT = {}", message));
    }

    /// Append an `ERROR = ...` line.
    pub fn error(&self, message: &str) {
        tracing::error!(target: "copyit::event", "{}", message);
        self.record(&format!("ERROR = {}", message));
    }
}
