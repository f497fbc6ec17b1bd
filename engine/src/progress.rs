//! Progress reporting trait.
//!
//! Manifest generation is the long-running part of a run. This trait lets the
//! CLI (or any other front end) watch it without the engine knowing how the
//! progress is displayed. Pass `None` wherever a callback is accepted for a
//! silent run.

use std::path::Path;

/// Receives progress updates while a manifest is built.
///
/// All methods are called synchronously on the hashing thread.
pub trait ProgressCallback {
    /// Called once the files to hash have been counted.
    fn on_manifest_started(&self, root: &Path, total_files: usize);

    /// Called before a file is hashed. `file_index` starts at 1.
    fn on_file_started(&self, file_index: usize, total_files: usize, path: &Path);

    /// Called when the read percentage of the current file increases.
    fn on_file_progress(&self, percent: u8);

    /// Called after every file has been hashed and the entries sorted.
    fn on_manifest_completed(&self, entries: usize);
}
