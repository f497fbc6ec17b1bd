//! Post-copy verification.
//!
//! The source and destination manifests are compared byte for byte. Only
//! when they differ are they read line by line to explain the difference.
//! Matching is exact: a changed separator or letter case is a real mismatch.

use crate::error::EngineError;
use crate::event_log::{EventLog, FILE_TIMESTAMP_FORMAT};
use crate::manifest::parse_line;
use crate::model::{Outcome, VerificationReport};
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

fn read_bytes(path: &Path) -> Result<Vec<u8>, EngineError> {
    fs::read(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

// Split on `\n` only: a `\r` stays part of its line and shows up as a finding.
fn lines_of(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes).split('\n').map(str::to_string).collect()
}

fn paths_of(lines: &[String], origin: &Path) -> Result<Vec<String>, EngineError> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(index, line)| {
            parse_line(line)
                .map(|entry| entry.relative_path)
                .map_err(|reason| EngineError::MalformedManifest {
                    path: origin.to_path_buf(),
                    line: index + 1,
                    reason,
                })
        })
        .collect()
}

/// Compare two manifest files.
///
/// On a mismatch the report lists every source line with no identical
/// destination line, and every destination path that the source manifest
/// does not list.
pub fn compare(source_manifest: &Path, destination_manifest: &Path) -> Result<VerificationReport, EngineError> {
    let source = read_bytes(source_manifest)?;
    let destination = read_bytes(destination_manifest)?;

    if source == destination {
        return Ok(VerificationReport::success());
    }

    let source_lines = lines_of(&source);
    let destination_lines = lines_of(&destination);

    let destination_set: HashSet<&str> = destination_lines.iter().map(String::as_str).collect();
    let expected_not_found = source_lines
        .iter()
        .filter(|line| !line.is_empty() && !destination_set.contains(line.as_str()))
        .cloned()
        .collect();

    let source_paths: HashSet<String> = paths_of(&source_lines, source_manifest)?.into_iter().collect();
    let extra_at_destination = paths_of(&destination_lines, destination_manifest)?
        .into_iter()
        .filter(|path| !source_paths.contains(path))
        .collect();

    Ok(VerificationReport {
        outcome: Outcome::Mismatch,
        expected_not_found,
        extra_at_destination,
    })
}

/// Write the verdict and every finding to the event log.
pub fn report(findings: &VerificationReport, log: &EventLog) {
    match findings.outcome {
        Outcome::Success => {
            log.event("File Transfer Judgement - Success, eventOutcome=pass");
        }
        Outcome::Mismatch => {
            log.event("File Transfer Outcome - Failure, eventOutcome=fail");
            for line in &findings.expected_not_found {
                log.error(&format!(
                    "{} was expected, but a different value was found in destination manifest",
                    line
                ));
            }
            for path in &findings.extra_at_destination {
                log.error(&format!(
                    "{} is in your destination manifest but is not in the source manifest",
                    path
                ));
            }
        }
    }
}

/// Move a consumed manifest into `archive_dir` with a timestamp suffix.
///
/// `film_manifest.md5` becomes `film_manifest_2024_03_09T14_05_07.md5`. An
/// existing archive file is never replaced.
pub fn archive_manifest(manifest: &Path, archive_dir: &Path, now: DateTime<Local>) -> Result<PathBuf, EngineError> {
    fs::create_dir_all(archive_dir).map_err(|e| EngineError::DirectoryCreationFailed {
        path: archive_dir.to_path_buf(),
        source: e,
    })?;

    let stem = manifest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest".to_string());
    let stamp = now.format(FILE_TIMESTAMP_FORMAT).to_string();

    let mut target = archive_dir.join(format!("{}{}.md5", stem, stamp));
    let mut attempt = 1;
    while target.exists() {
        target = archive_dir.join(format!("{}{}_{}.md5", stem, stamp, attempt));
        attempt += 1;
    }

    fs::rename(manifest, &target)
        .or_else(|_| fs::copy(manifest, &target).and_then(|_| fs::remove_file(manifest)))
        .map_err(|e| EngineError::WriteError {
            path: target.clone(),
            source: e,
        })?;

    tracing::info!("archived {} to {}", manifest.display(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    fn manifest(dir: &Path, name: &str, lines: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let text: String = lines.iter().map(|(d, p)| format!("{}  {}\n", d, p)).collect();
        fs::write(&path, text).expect("Failed to write manifest");
        path
    }

    #[test]
    fn test_identical_manifests_pass() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let lines = [(EMPTY_MD5, "film/a.txt"), (EMPTY_MD5, "film/b/c.txt")];
        let src = manifest(temp_dir.path(), "src.md5", &lines);
        let dst = manifest(temp_dir.path(), "dst.md5", &lines);

        let report = compare(&src, &dst).expect("Failed to compare");
        assert!(report.is_success());
        assert!(report.expected_not_found.is_empty());
    }

    #[test]
    fn test_one_changed_digest() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = manifest(temp_dir.path(), "src.md5", &[(EMPTY_MD5, "film/a.txt"), (EMPTY_MD5, "film/b.txt")]);
        let dst = manifest(temp_dir.path(), "dst.md5", &[(EMPTY_MD5, "film/a.txt"), (HELLO_MD5, "film/b.txt")]);

        let report = compare(&src, &dst).expect("Failed to compare");

        assert_eq!(report.outcome, Outcome::Mismatch);
        assert_eq!(report.expected_not_found, vec![format!("{}  film/b.txt", EMPTY_MD5)]);
        assert!(report.extra_at_destination.is_empty());
    }

    #[test]
    fn test_one_extra_destination_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = manifest(temp_dir.path(), "src.md5", &[(EMPTY_MD5, "film/a.txt")]);
        let dst = manifest(
            temp_dir.path(),
            "dst.md5",
            &[(EMPTY_MD5, "film/a.txt"), (HELLO_MD5, "film/extra.txt")],
        );

        let report = compare(&src, &dst).expect("Failed to compare");

        assert_eq!(report.outcome, Outcome::Mismatch);
        assert!(report.expected_not_found.is_empty());
        assert_eq!(report.extra_at_destination, vec!["film/extra.txt"]);
    }

    #[test]
    fn test_case_difference_is_a_mismatch() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = manifest(temp_dir.path(), "src.md5", &[(EMPTY_MD5, "film/A.txt")]);
        let dst = manifest(temp_dir.path(), "dst.md5", &[(EMPTY_MD5, "film/a.txt")]);

        let report = compare(&src, &dst).expect("Failed to compare");
        assert_eq!(report.expected_not_found.len(), 1);
        assert_eq!(report.extra_at_destination, vec!["film/a.txt"]);
    }

    #[test]
    fn test_missing_trailing_newline_is_a_mismatch_without_findings() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = manifest(temp_dir.path(), "src.md5", &[(EMPTY_MD5, "film/a.txt")]);
        let dst = temp_dir.path().join("dst.md5");
        fs::write(&dst, format!("{}  film/a.txt", EMPTY_MD5)).expect("Failed to write manifest");

        let report = compare(&src, &dst).expect("Failed to compare");
        assert_eq!(report.outcome, Outcome::Mismatch);
        assert!(report.expected_not_found.is_empty());
        assert!(report.extra_at_destination.is_empty());
    }

    #[test]
    fn test_crlf_destination_lists_every_line() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let lines = [(EMPTY_MD5, "film/a.txt"), (HELLO_MD5, "film/b.txt")];
        let src = manifest(temp_dir.path(), "src.md5", &lines);
        let dst = temp_dir.path().join("dst.md5");
        let text: String = lines.iter().map(|(d, p)| format!("{}  {}\r\n", d, p)).collect();
        fs::write(&dst, text).expect("Failed to write manifest");

        let report = compare(&src, &dst).expect("Failed to compare");

        assert_eq!(report.outcome, Outcome::Mismatch);
        assert_eq!(
            report.expected_not_found,
            vec![format!("{}  film/a.txt", EMPTY_MD5), format!("{}  film/b.txt", HELLO_MD5)]
        );
        assert_eq!(report.extra_at_destination, vec!["film/a.txt\r", "film/b.txt\r"]);
    }

    #[test]
    fn test_malformed_destination_line() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = manifest(temp_dir.path(), "src.md5", &[(EMPTY_MD5, "film/a.txt")]);
        let dst = temp_dir.path().join("dst.md5");
        fs::write(&dst, "not a manifest line\n").expect("Failed to write manifest");

        assert!(matches!(
            compare(&src, &dst),
            Err(EngineError::MalformedManifest { line: 1, .. })
        ));
    }

    #[test]
    fn test_log_report_writes_each_finding() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let log = EventLog::open(temp_dir.path().join("run.log")).expect("Failed to open log");
        let findings = VerificationReport {
            outcome: Outcome::Mismatch,
            expected_not_found: vec![format!("{}  film/b.txt", EMPTY_MD5)],
            extra_at_destination: vec!["film/extra.txt".to_string()],
        };

        report(&findings, &log);

        let contents = fs::read_to_string(log.path()).expect("Failed to read log");
        assert!(contents.contains("eventOutcome=fail"));
        assert!(contents.contains("ERROR = d41d8cd98f00b204e9800998ecf8427e  film/b.txt was expected"));
        assert!(contents.contains("ERROR = film/extra.txt is in your destination manifest"));
    }

    #[test]
    fn test_archive_manifest_renames_with_timestamp() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = manifest(temp_dir.path(), "film_manifest.md5", &[(EMPTY_MD5, "film/a.txt")]);
        let archive = temp_dir.path().join("old_manifests");
        let now = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("Unambiguous local time");

        let first = archive_manifest(&path, &archive, now).expect("Failed to archive");
        assert_eq!(first, archive.join("film_manifest_2024_03_09T14_05_07.md5"));
        assert!(!path.exists());

        let path = manifest(temp_dir.path(), "film_manifest.md5", &[(EMPTY_MD5, "film/a.txt")]);
        let second = archive_manifest(&path, &archive, now).expect("Failed to archive again");
        assert_ne!(first, second, "Earlier archives are never replaced");
        assert!(first.exists() && second.exists());
    }
}
