//! Error types for the transfer engine.
//!
//! Every `EngineError` is fatal to the run that raised it: the CLI logs it to
//! the event log and exits. A post-copy checksum mismatch is NOT an error; it
//! is reported through `VerificationReport` so the run can finish and log the
//! full diff.

use crate::model::JobState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a transfer run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source path does not exist
    #[error("Source path not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source path exists but is a file (only directories are supported)
    #[error("Source must be a directory, not a file: {}", path.display())]
    SourceNotDirectory { path: PathBuf },

    /// Destination is missing or is not a directory
    #[error("Destination is either not a directory or it does not exist: {}", path.display())]
    DestinationNotDirectory { path: PathBuf },

    /// The write probe could not create a file in the destination
    #[error("You cannot write to your destination: {}", path.display())]
    DestinationAccessDenied { path: PathBuf, source: io::Error },

    /// Failed to read a file (while hashing or copying)
    #[error("Failed to read file: {}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write a file (manifest, log or copied file)
    #[error("Failed to write file: {}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to walk a directory tree
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// An existing source manifest disagrees with the source tree
    ///
    /// The name lists hold bare file names, as in `StalenessReport`.
    #[error(
        "Manifest may be outdated: {} files in the source directory, {} in {}",
        source_count,
        manifest_count,
        manifest.display()
    )]
    StaleManifest {
        manifest: PathBuf,
        source_count: usize,
        manifest_count: usize,
        source_only: Vec<String>,
        manifest_only: Vec<String>,
    },

    /// A manifest line could not be parsed
    #[error("Malformed manifest {} at line {}: {}", path.display(), line, reason)]
    MalformedManifest {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The external copy program could not be started
    #[error("Could not launch copy agent '{}'", agent)]
    CopyAgentUnavailable { agent: String, source: io::Error },

    /// The copy agent ran but reported failure
    #[error("Copy agent '{}' failed with status {}", agent, status)]
    CopyAgentFailed { agent: String, status: String },

    /// Reading an interactive answer failed (closed stdin, broken terminal)
    #[error("Could not read an answer: {}", reason)]
    PromptFailed { reason: String },

    /// A pipeline step was called out of order
    #[error("Job is {actual:?}, expected {expected:?}")]
    InvalidJobState { expected: JobState, actual: JobState },
}
