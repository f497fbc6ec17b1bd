//! Core data model for transfer runs.
//!
//! This module defines the values threaded through one run:
//! - TransferJob: everything the pipeline needs, passed by reference
//! - OverwriteDecision, JobState: enums controlling behavior
//! - VerificationReport, RunSummary: what a finished run reports

use crate::enumerate::Enumeration;
use crate::store::{ManifestLocations, ManifestSource};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Context for one transfer run. Not persisted.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Directory being transferred
    pub source_path: PathBuf,

    /// Directory the transfer lands in
    pub destination_path: PathBuf,

    /// Name of the folder created inside the destination
    pub folder_name: String,

    /// True when the source path supplied no folder name (a bare drive root
    /// or a path ending in a separator) and `folder_name` was asked for.
    /// Source manifest paths then lack the folder and must be rebased.
    pub rootless: bool,

    /// `destination_path/folder_name`
    pub destination_final_path: PathBuf,

    /// Use the faster copy agent where the platform has one
    pub fast_copy: bool,

    /// Candidate and output manifest paths
    pub manifests: ManifestLocations,

    /// Answers to the overwrite questions (filled in by planning)
    pub overwrite: OverwriteDecisions,

    /// Fresh walk of the source (filled in by planning)
    pub enumeration: Option<Enumeration>,

    /// Working source manifest and where it came from (filled in by planning)
    pub source_manifest: Option<(ManifestSource, PathBuf)>,

    /// Current lifecycle state
    pub state: JobState,

    /// When the job was created
    pub created_at: DateTime<Local>,
}

impl TransferJob {
    /// Assemble a pending job from already validated inputs.
    ///
    /// `create_job` is the usual entry point; it validates the paths and
    /// settles the folder name before calling this.
    pub fn new(
        source_path: PathBuf,
        destination_path: PathBuf,
        folder_name: String,
        rootless: bool,
        fast_copy: bool,
        manifest_dir: &Path,
    ) -> Self {
        let manifests =
            ManifestLocations::for_job(&source_path, &folder_name, &destination_path, manifest_dir);
        TransferJob {
            id: Uuid::new_v4(),
            destination_final_path: destination_path.join(&folder_name),
            source_path,
            destination_path,
            folder_name,
            rootless,
            fast_copy,
            manifests,
            overwrite: OverwriteDecisions::default(),
            enumeration: None,
            source_manifest: None,
            state: JobState::Pending,
            created_at: Local::now(),
        }
    }

    /// Prefix removed from source file paths when building the source
    /// manifest. Keeping the source folder name in every path lets the
    /// source manifest line up with the destination manifest.
    pub fn source_strip_prefix(&self) -> &Path {
        if self.rootless {
            &self.source_path
        } else {
            self.source_path.parent().unwrap_or(&self.source_path)
        }
    }
}

/// Decision about an artifact that may already exist at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwriteDecision {
    /// Nothing there yet; write it
    #[default]
    NotNeeded,
    /// Exists; the user agreed to replace it
    Overwrite,
    /// Exists; the user declined, leave it alone
    Keep,
}

impl OverwriteDecision {
    /// True unless the user chose to keep the existing artifact.
    pub fn should_write(&self) -> bool {
        !matches!(self, OverwriteDecision::Keep)
    }
}

/// Overwrite answers for the two destination artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverwriteDecisions {
    pub manifest: OverwriteDecision,
    pub directory: OverwriteDecision,
}

/// The lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, nothing checked yet
    Pending,
    /// Destination probed, overwrites arbitrated, source manifest resolved
    Planned,
    /// Copied and verified
    Completed,
}

/// Result of comparing two manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Manifests are byte-identical
    Success,
    /// Manifests differ
    Mismatch,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "pass"),
            Outcome::Mismatch => write!(f, "fail"),
        }
    }
}

/// Findings of a manifest comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub outcome: Outcome,
    /// Source lines with no identical line in the destination manifest
    pub expected_not_found: Vec<String>,
    /// Destination paths missing from the source manifest
    pub extra_at_destination: Vec<String>,
}

impl VerificationReport {
    pub fn success() -> Self {
        VerificationReport {
            outcome: Outcome::Success,
            expected_not_found: Vec::new(),
            extra_at_destination: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// What a completed run reports back to its caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: VerificationReport,
    /// Files found in the source by the fresh enumeration
    pub source_count: usize,
    /// Entries written to the destination manifest, if it was regenerated
    pub destination_manifest_count: Option<usize>,
    /// Every file now under the final destination folder
    pub destination_count: usize,
    /// Where the working source manifest was archived, if it was
    pub archived_manifest: Option<PathBuf>,
}
