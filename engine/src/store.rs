//! Source manifest discovery.
//!
//! A source may already carry a manifest. Candidates are checked in strict
//! priority order and the first one that exists is used:
//!
//! 1. sidecar: `<parent>/<source name>_manifest.md5`, next to the source
//! 2. root: `<source>/<folder>_manifest.md5`, e.g. at the top of a drive
//! 3. cache: `<manifest dir>/<folder>_manifest.md5`, left by an earlier run
//!
//! A found manifest is only trusted if it lists as many files as a fresh walk
//! of the source finds. Otherwise the run stops before anything is copied.
//! When no candidate exists a new manifest is generated into the cache.

use crate::enumerate::Enumeration;
use crate::error::EngineError;
use crate::event_log::EventLog;
use crate::manifest::{self, manifest_file_name, Manifest};
use crate::model::TransferJob;
use crate::progress::ProgressCallback;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a working source manifest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    Sidecar,
    Root,
    Cache,
    /// Generated by this run
    Generated,
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestSource::Sidecar => write!(f, "sidecar"),
            ManifestSource::Root => write!(f, "root"),
            ManifestSource::Cache => write!(f, "cache"),
            ManifestSource::Generated => write!(f, "generated"),
        }
    }
}

/// Manifest paths for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocations {
    /// Next to the source; absent when the source is a bare root
    pub sidecar: Option<PathBuf>,
    /// Inside the source root
    pub root: PathBuf,
    /// In the local manifest cache
    pub cache: PathBuf,
    /// Destination manifest written after the copy
    pub destination: PathBuf,
}

impl ManifestLocations {
    pub fn for_job(source: &Path, folder_name: &str, destination: &Path, manifest_dir: &Path) -> Self {
        let sidecar = match (source.parent(), source.file_name()) {
            (Some(parent), Some(name)) => {
                Some(parent.join(manifest_file_name(&name.to_string_lossy())))
            }
            _ => None,
        };
        let file_name = manifest_file_name(folder_name);

        ManifestLocations {
            sidecar,
            root: source.join(&file_name),
            cache: manifest_dir.join(&file_name),
            destination: destination.join(&file_name),
        }
    }

    /// Source manifest candidates, highest priority first.
    pub fn candidates(&self) -> Vec<(ManifestSource, &Path)> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(sidecar) = &self.sidecar {
            candidates.push((ManifestSource::Sidecar, sidecar.as_path()));
        }
        candidates.push((ManifestSource::Root, self.root.as_path()));
        candidates.push((ManifestSource::Cache, self.cache.as_path()));
        candidates
    }
}

/// First candidate manifest that exists on disk.
pub fn find_existing(locations: &ManifestLocations) -> Option<(ManifestSource, PathBuf)> {
    locations
        .candidates()
        .into_iter()
        .find(|(_, path)| path.is_file())
        .map(|(kind, path)| (kind, path.to_path_buf()))
}

/// How an existing manifest disagrees with the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessReport {
    pub source_count: usize,
    pub manifest_count: usize,
    /// Names in the source tree but not in the manifest
    pub source_only: Vec<String>,
    /// Names in the manifest but not in the source tree
    pub manifest_only: Vec<String>,
}

/// Compare a manifest against a fresh enumeration.
///
/// Returns `None` when the counts agree. Names are compared as bare file
/// names, so the lists are a guide for manual remediation rather than exact
/// paths.
pub fn staleness(manifest: &Manifest, enumeration: &Enumeration) -> Option<StalenessReport> {
    if manifest.len() == enumeration.count {
        return None;
    }

    let in_manifest: BTreeSet<String> = manifest.file_names().into_iter().collect();
    let in_source: BTreeSet<String> = enumeration.names.iter().cloned().collect();

    Some(StalenessReport {
        source_count: enumeration.count,
        manifest_count: manifest.len(),
        source_only: in_source.difference(&in_manifest).cloned().collect(),
        manifest_only: in_manifest.difference(&in_source).cloned().collect(),
    })
}

/// One line per name that only one side lists.
pub fn difference_lines(source_only: &[String], manifest_only: &[String]) -> Vec<String> {
    let source_side = source_only
        .iter()
        .map(|name| format!("{} is present in your source directory but not in the source manifest", name));
    let manifest_side = manifest_only
        .iter()
        .map(|name| format!("{} is present in manifest but is missing in your source files", name));
    source_side.chain(manifest_side).collect()
}

/// Refuse a manifest whose entry count disagrees with the source tree.
pub fn check_staleness(path: &Path, enumeration: &Enumeration, log: &EventLog) -> Result<(), EngineError> {
    let manifest = Manifest::read(path)?;
    let Some(report) = staleness(&manifest, enumeration) else {
        return Ok(());
    };

    for line in difference_lines(&report.source_only, &report.manifest_only) {
        log.record(&line);
    }
    log.event(
        "Existing source manifest check - Failure - The number of files in the source directory \
         is not equal to the number of files in the source manifest",
    );

    Err(EngineError::StaleManifest {
        manifest: path.to_path_buf(),
        source_count: report.source_count,
        manifest_count: report.manifest_count,
        source_only: report.source_only,
        manifest_only: report.manifest_only,
    })
}

/// Find a trustworthy source manifest for `job`, or generate one.
///
/// # Errors
/// `StaleManifest` when an existing manifest disagrees with `enumeration`;
/// any read error while generating a new manifest.
pub fn resolve_source_manifest(
    job: &TransferJob,
    enumeration: &Enumeration,
    log: &EventLog,
    progress: Option<&dyn ProgressCallback>,
) -> Result<(ManifestSource, PathBuf), EngineError> {
    if let Some((kind, path)) = find_existing(&job.manifests) {
        log.event(&format!(
            "Existing source manifest check - {} manifest found at {}",
            kind,
            path.display()
        ));
        check_staleness(&path, enumeration, log)?;
        if kind == ManifestSource::Sidecar {
            log.event("Manifest sidecar exists - source manifest generation will be skipped");
        }
        return Ok((kind, path));
    }

    let output = &job.manifests.cache;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    log.event(
        "Generating source manifest: status=started, eventType=message digest calculation, module=md5",
    );
    manifest::build_to_file(&job.source_path, output, job.source_strip_prefix(), progress)?;
    log.event("Generating source manifest: status=completed");

    Ok((ManifestSource::Generated, output.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::enumerate;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    struct Fixture {
        _temp_dir: tempfile::TempDir,
        job: TransferJob,
        log: EventLog,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("film");
        for name in files {
            let path = source.join(name);
            fs::create_dir_all(path.parent().expect("File has a parent")).expect("Failed to create dir");
            fs::write(&path, b"").expect("Failed to write file");
        }
        let destination = temp_dir.path().join("dst");
        fs::create_dir_all(&destination).expect("Failed to create dst");

        let job = TransferJob::new(
            source,
            destination,
            "film".to_string(),
            false,
            false,
            &temp_dir.path().join("cache"),
        );
        let log = EventLog::open(temp_dir.path().join("run.log")).expect("Failed to open log");
        Fixture {
            _temp_dir: temp_dir,
            job,
            log,
        }
    }

    fn write_manifest(path: &Path, paths: &[&str]) {
        fs::create_dir_all(path.parent().expect("Manifest has a parent")).expect("Failed to create dir");
        let text: String = paths.iter().map(|p| format!("{}  {}\n", EMPTY_MD5, p)).collect();
        fs::write(path, text).expect("Failed to write manifest");
    }

    #[test]
    fn test_locations_for_named_source() {
        let locations = ManifestLocations::for_job(
            Path::new("/mnt/a/film"),
            "film",
            Path::new("/mnt/b"),
            Path::new("/cache"),
        );
        assert_eq!(locations.sidecar, Some(PathBuf::from("/mnt/a/film_manifest.md5")));
        assert_eq!(locations.root, PathBuf::from("/mnt/a/film/film_manifest.md5"));
        assert_eq!(locations.cache, PathBuf::from("/cache/film_manifest.md5"));
        assert_eq!(locations.destination, PathBuf::from("/mnt/b/film_manifest.md5"));
    }

    #[test]
    fn test_bare_root_has_no_sidecar() {
        let locations = ManifestLocations::for_job(Path::new("/"), "usb", Path::new("/mnt/b"), Path::new("/cache"));
        assert_eq!(locations.sidecar, None);
        assert_eq!(locations.candidates().len(), 2);
    }

    #[test]
    fn test_sidecar_wins_over_root_and_cache() {
        let f = fixture(&["a.txt"]);
        let locations = &f.job.manifests;
        write_manifest(locations.sidecar.as_ref().expect("Has sidecar"), &["film/a.txt"]);
        write_manifest(&locations.root, &["film/a.txt"]);
        write_manifest(&locations.cache, &["film/a.txt"]);

        let found = find_existing(locations).expect("Should find a manifest");
        assert_eq!(found.0, ManifestSource::Sidecar);

        fs::remove_file(locations.sidecar.as_ref().expect("Has sidecar")).expect("Failed to remove");
        assert_eq!(find_existing(locations).map(|f| f.0), Some(ManifestSource::Root));

        fs::remove_file(&locations.root).expect("Failed to remove");
        assert_eq!(find_existing(locations).map(|f| f.0), Some(ManifestSource::Cache));

        fs::remove_file(&locations.cache).expect("Failed to remove");
        assert_eq!(find_existing(locations), None);
    }

    #[test]
    fn test_staleness_report_lists_both_sides() {
        let manifest = Manifest::parse(
            &format!("{0}  film/a.txt\n{0}  film/b/gone.txt\n{0}  film/c.txt\n", EMPTY_MD5),
            Path::new("m"),
        )
        .expect("Valid manifest");
        let enumeration = Enumeration {
            count: 2,
            names: vec!["a.txt".to_string(), "new.txt".to_string()],
        };

        let report = staleness(&manifest, &enumeration).expect("Counts differ");
        assert_eq!(report.source_count, 2);
        assert_eq!(report.manifest_count, 3);
        assert_eq!(report.source_only, vec!["new.txt"]);
        assert_eq!(report.manifest_only, vec!["c.txt", "gone.txt"]);
    }

    #[test]
    fn test_difference_lines_wording() {
        let lines = difference_lines(&["new.txt".to_string()], &["gone.txt".to_string()]);
        assert_eq!(
            lines,
            vec![
                "new.txt is present in your source directory but not in the source manifest",
                "gone.txt is present in manifest but is missing in your source files",
            ]
        );
    }

    #[test]
    fn test_equal_counts_are_trusted() {
        let manifest = Manifest::parse(&format!("{}  film/a.txt\n", EMPTY_MD5), Path::new("m"))
            .expect("Valid manifest");
        let enumeration = Enumeration {
            count: 1,
            names: vec!["a.txt".to_string()],
        };
        assert_eq!(staleness(&manifest, &enumeration), None);
    }

    #[test]
    fn test_stale_cache_manifest_aborts_and_names_missing_file() {
        let f = fixture(&["a.txt", "b/c.txt"]);
        write_manifest(&f.job.manifests.cache, &["film/a.txt", "film/b/c.txt", "film/d.txt"]);
        let enumeration = enumerate(&f.job.source_path).expect("Failed to enumerate");

        let result = resolve_source_manifest(&f.job, &enumeration, &f.log, None);

        match result {
            Err(EngineError::StaleManifest {
                source_count,
                manifest_count,
                source_only,
                manifest_only,
                ..
            }) => {
                assert_eq!(source_count, 2);
                assert_eq!(manifest_count, 3);
                assert!(source_only.is_empty());
                assert_eq!(manifest_only, vec!["d.txt"]);
            }
            other => panic!("expected StaleManifest, got {:?}", other),
        }
        let contents = fs::read_to_string(f.log.path()).expect("Failed to read log");
        assert!(contents.contains("d.txt is present in manifest but is missing in your source files"));
        assert!(!contents.contains("is present in your source directory"));
        assert!(contents.contains("Existing source manifest check - Failure"));
    }

    #[test]
    fn test_generates_into_cache_when_none_exists() {
        let f = fixture(&["a.txt", "b/c.txt"]);
        let enumeration = enumerate(&f.job.source_path).expect("Failed to enumerate");

        let (kind, path) =
            resolve_source_manifest(&f.job, &enumeration, &f.log, None).expect("Failed to resolve");

        assert_eq!(kind, ManifestSource::Generated);
        assert_eq!(path, f.job.manifests.cache);
        let text = fs::read_to_string(&path).expect("Failed to read manifest");
        assert_eq!(text, format!("{0}  film/a.txt\n{0}  film/b/c.txt\n", EMPTY_MD5));
        let contents = fs::read_to_string(f.log.path()).expect("Failed to read log");
        assert!(contents.contains("Generating source manifest: status=completed"));
    }

    #[test]
    fn test_fresh_sidecar_is_used_as_is() {
        let f = fixture(&["a.txt"]);
        let sidecar = f.job.manifests.sidecar.clone().expect("Has sidecar");
        write_manifest(&sidecar, &["film/a.txt"]);
        let enumeration = enumerate(&f.job.source_path).expect("Failed to enumerate");

        let resolved = resolve_source_manifest(&f.job, &enumeration, &f.log, None).expect("Failed to resolve");
        assert_eq!(resolved, (ManifestSource::Sidecar, sidecar));
        assert!(!f.job.manifests.cache.exists(), "Nothing is generated");
    }
}
