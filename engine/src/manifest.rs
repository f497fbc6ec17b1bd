//! Checksum manifests.
//!
//! A manifest is a UTF-8 text file with one line per file:
//!
//! ```text
//! d41d8cd98f00b204e9800998ecf8427e  a.txt
//! d41d8cd98f00b204e9800998ecf8427e  b/c.txt
//! ```
//!
//! 32 lowercase hex digest characters, two spaces, then the path relative to
//! the manifest's root using `/` separators. Lines are sorted by path alone
//! and the file ends with a newline, so building the same tree twice yields
//! byte-identical files whatever order the filesystem returns entries in.

use crate::checksums::{compute_file_digest, Digest, DIGEST_HEX_LEN};
use crate::enumerate::candidate_files;
use crate::error::EngineError;
use crate::progress::ProgressCallback;
use std::fs;
use std::path::Path;

/// Separator between the digest and the relative path.
pub const DIGEST_SEPARATOR: &str = "  ";

/// Width of the `digest + separator` prefix on every manifest line.
pub const DIGEST_PREFIX_WIDTH: usize = DIGEST_HEX_LEN + DIGEST_SEPARATOR.len();

/// Suffix shared by every manifest file name.
pub const MANIFEST_SUFFIX: &str = "_manifest.md5";

/// `<name>_manifest.md5`
pub fn manifest_file_name(name: &str) -> String {
    format!("{}{}", name, MANIFEST_SUFFIX)
}

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub digest: Digest,
}

impl ManifestEntry {
    /// Render as a manifest line, without the newline.
    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.digest, DIGEST_SEPARATOR, self.relative_path)
    }
}

/// Split one manifest line into its digest and relative path.
///
/// Returns a human-readable reason on failure.
pub fn parse_line(line: &str) -> Result<ManifestEntry, String> {
    if line.len() <= DIGEST_PREFIX_WIDTH {
        return Err(format!(
            "expected at least {} characters, found {}",
            DIGEST_PREFIX_WIDTH + 1,
            line.len()
        ));
    }
    if !line.is_char_boundary(DIGEST_HEX_LEN) || !line.is_char_boundary(DIGEST_PREFIX_WIDTH) {
        return Err("digest prefix is not ASCII".to_string());
    }

    let (digest, rest) = line.split_at(DIGEST_HEX_LEN);
    let digest: Digest = digest.parse().map_err(|e| format!("{}", e))?;
    let relative_path = rest
        .strip_prefix(DIGEST_SEPARATOR)
        .ok_or_else(|| "digest must be followed by two spaces".to_string())?;

    Ok(ManifestEntry {
        relative_path: relative_path.to_string(),
        digest,
    })
}

/// Derive a manifest path from an absolute file path.
///
/// Removes `prefix`, then one leading `/` or `\`, then turns every `\` into
/// `/`. Paths outside `prefix` keep their full text.
pub fn relative_path(path: &Path, prefix: &Path) -> String {
    let full = path.to_string_lossy();
    let prefix = prefix.to_string_lossy();

    let rest = full.strip_prefix(prefix.as_ref()).unwrap_or(&full);
    let rest = rest
        .strip_prefix('/')
        .or_else(|| rest.strip_prefix('\\'))
        .unwrap_or(rest);
    rest.replace('\\', "/")
}

/// An ordered list of manifest entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from unordered entries, sorting them by path.
    pub fn from_entries(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Manifest { entries }
    }

    /// Parse manifest text, keeping the line order found in the text.
    ///
    /// Blank lines are ignored. `origin` only labels errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, EngineError> {
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let entry = parse_line(line).map_err(|reason| EngineError::MalformedManifest {
                path: origin.to_path_buf(),
                line: index + 1,
                reason,
            })?;
            entries.push(entry);
        }
        Ok(Manifest { entries })
    }

    /// Read and parse a manifest file.
    pub fn read(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, path)
    }

    /// Serialize, one line per entry, with a trailing newline.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.to_line());
            text.push('\n');
        }
        text
    }

    pub fn write(&self, path: &Path) -> Result<(), EngineError> {
        fs::write(path, self.to_text()).map_err(|e| EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bare file names (the last path component of every entry).
    pub fn file_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| {
                e.relative_path
                    .rsplit(|c: char| c == '/' || c == '\\')
                    .next()
                    .unwrap_or(&e.relative_path)
                    .to_string()
            })
            .collect()
    }

    /// Copy of this manifest with `folder/` inserted in front of every path.
    pub fn rebased(&self, folder: &str) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|e| ManifestEntry {
                relative_path: format!("{}/{}", folder, e.relative_path),
                digest: e.digest,
            })
            .collect();
        Manifest { entries }
    }
}

/// Hash every file under `root` and assemble a sorted manifest.
///
/// `strip_prefix` is removed from each absolute path to form the recorded
/// relative path (see [`relative_path`]).
///
/// # Errors
/// Fails on the first file that cannot be read. No partial manifest is
/// produced.
pub fn build(
    root: &Path,
    strip_prefix: &Path,
    progress: Option<&dyn ProgressCallback>,
) -> Result<Manifest, EngineError> {
    let files = candidate_files(root)?;
    let total = files.len();

    if let Some(callback) = progress {
        callback.on_manifest_started(root, total);
    }

    let mut entries = Vec::with_capacity(total);
    for (index, path) in files.iter().enumerate() {
        if let Some(callback) = progress {
            callback.on_file_started(index + 1, total, path);
        }
        let digest = compute_file_digest(path, |percent| {
            if let Some(callback) = progress {
                callback.on_file_progress(percent);
            }
        })?;
        entries.push(ManifestEntry {
            relative_path: relative_path(path, strip_prefix),
            digest,
        });
    }

    let manifest = Manifest::from_entries(entries);
    if let Some(callback) = progress {
        callback.on_manifest_completed(manifest.len());
    }
    Ok(manifest)
}

/// Build a manifest for `root` and write it to `output`.
///
/// Returns the number of entries written.
pub fn build_to_file(
    root: &Path,
    output: &Path,
    strip_prefix: &Path,
    progress: Option<&dyn ProgressCallback>,
) -> Result<usize, EngineError> {
    let manifest = build(root, strip_prefix, progress)?;
    manifest.write(output)?;
    tracing::info!("wrote {} entries to {}", manifest.len(), output.display());
    Ok(manifest.len())
}
