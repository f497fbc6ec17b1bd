//! # copyit Engine - Verified Directory Transfer Library
//!
//! A headless engine that copies a directory tree to archival storage and
//! proves, with MD5 manifests taken before and after, that every byte
//! arrived intact. The CLI is a thin layer over it.
//!
//! ## Overview
//!
//! A run goes through three steps:
//! - **create**: validate the source, settle the destination folder name,
//!   open the event log
//! - **plan**: probe the destination, ask the overwrite questions, find or
//!   build a trustworthy source manifest
//! - **run**: copy with a `CopyAgent`, build the destination manifest,
//!   compare the two and archive the consumed manifest
//!
//! Interactive decisions go through the `Prompter` trait and hashing progress
//! through `ProgressCallback`, so neither is tied to a terminal.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use copyit_engine::{create_job, plan_job, run_job, select_agent, Platform, Settings, TerminalPrompter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env();
//! let mut prompter = TerminalPrompter::stdio();
//!
//! let (mut job, log) = create_job("/media/usb/film", "/mnt/archive", false, &settings, &mut prompter)?;
//! plan_job(&mut job, &mut prompter, &log, None)?;
//!
//! let agent = select_agent(Platform::current(), job.fast_copy);
//! let summary = run_job(&mut job, agent.as_ref(), &log, None, &settings)?;
//! println!("eventOutcome={}", summary.report.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: TransferJob, overwrite decisions, verification results
//! - **error**: Error types and handling
//! - **enumerate**: Tree walks with hidden-entry exclusion, junk removal
//! - **checksums**: Streaming MD5 digests
//! - **manifest**: Manifest format and builder
//! - **store**: Source manifest discovery and staleness check
//! - **prompt**: Yes/no and free-text questions
//! - **copy_agent**: External and in-process copy programs
//! - **fs_ops**: Low-level filesystem operations
//! - **transfer**: Write probe, overwrite arbitration, copy, rebasing
//! - **verify**: Manifest comparison and archiving
//! - **event_log**: Per-run audit trail
//! - **config**: Report directory settings
//! - **job**: Job orchestration (create, plan, run)
//! - **progress**: Progress callback trait

pub mod model;
pub mod error;
pub mod enumerate;
pub mod checksums;
pub mod manifest;
pub mod store;
pub mod prompt;
pub mod copy_agent;
pub mod fs_ops;
pub mod transfer;
pub mod verify;
pub mod event_log;
pub mod config;
pub mod job;
pub mod progress;

// Re-export main types and functions
pub use model::{
    JobState, Outcome, OverwriteDecision, OverwriteDecisions, RunSummary, TransferJob, VerificationReport,
};
pub use error::EngineError;
pub use checksums::{compute_file_digest, Digest};
pub use manifest::{Manifest, ManifestEntry};
pub use store::{ManifestLocations, ManifestSource};
pub use prompt::{Prompter, ScriptedPrompter, TerminalPrompter};
pub use copy_agent::{select_agent, CommandAgent, CommandKind, CopyAgent, CopyOptions, NativeAgent, Platform};
pub use event_log::EventLog;
pub use config::Settings;
pub use job::{create_job, plan_job, run_job};
pub use progress::ProgressCallback;
