//! copyit - Command-line interface for the verified transfer engine.
//!
//! Copies a directory to archival storage, then proves the copy with MD5
//! manifests. Questions are asked on the terminal, hashing progress goes to
//! stdout and diagnostics to stderr (filtered by `RUST_LOG`).

use clap::Parser;
use copyit_engine::{
    create_job, plan_job, run_job, select_agent, store, transfer, CopyAgent, EngineError, Platform,
    ProgressCallback, Prompter, RunSummary, Settings, TerminalPrompter,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// copyit - Copy a directory with checksum comparison and manifest generation
#[derive(Parser, Debug)]
#[command(name = "copyit")]
#[command(version)]
#[command(about = "Copy directory with checksum comparison and manifest generation")]
struct Args {
    /// Input directory
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Destination directory
    #[arg(value_name = "DESTINATION")]
    destination: PathBuf,

    /// Use gcp instead of rsync on macOS, for speed on LTO tapes
    #[arg(short = 'l', long = "lto")]
    lto: bool,
}

/// Prints hashing progress the way a long manifest build should look on a
/// terminal: one line per file, percentage redrawn in place.
struct CliProgress;

impl ProgressCallback for CliProgress {
    fn on_manifest_started(&self, root: &Path, total_files: usize) {
        println!("Generating manifest for {} ({} files)", root.display(), total_files);
    }

    fn on_file_started(&self, file_index: usize, total_files: usize, path: &Path) {
        println!("Generating MD5 for {} - {} of {}", path.display(), file_index, total_files);
    }

    fn on_file_progress(&self, percent: u8) {
        print!("[{:>3}%]\r", percent);
        let _ = std::io::stdout().flush();
    }

    fn on_manifest_completed(&self, entries: usize) {
        println!();
        println!("Manifest complete: {} entries", entries);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_summary(summary: &RunSummary) {
    if summary.report.is_success() {
        println!("Your files have reached their destination and the checksums match");
        return;
    }

    println!("***********YOUR CHECKSUMS DO NOT MATCH*************");
    if let Some(count) = summary.destination_manifest_count {
        println!(" There are: \n {} files in your destination manifest", count);
    }
    println!(
        " {} files in your destination \n {} files at source",
        summary.destination_count, summary.source_count
    );
    for line in &summary.report.expected_not_found {
        println!("{} was expected, but a different value was found in destination manifest", line);
    }
    for path in &summary.report.extra_at_destination {
        println!("{} is in your destination manifest but is not in the source manifest", path);
    }
}

/// Console explanation for a fatal error, beyond its one-line message.
fn failure_lines(e: &EngineError) -> Vec<String> {
    let mut lines = Vec::new();
    match e {
        EngineError::SourceNotDirectory { .. } => {
            lines.push("File transfer is not currently supported, only directories.".to_string());
        }
        EngineError::StaleManifest {
            source_only,
            manifest_only,
            ..
        } => {
            lines.extend(store::difference_lines(source_only, manifest_only));
            lines.push(
                "This manifest may be outdated as the number of files in your directory \
                 does not match the number of files in the manifest"
                    .to_string(),
            );
        }
        _ => {}
    }
    if transfer::is_permission_error(e) {
        lines.push(
            "You do not have access to this directory. Perhaps it is read only, or the wrong file system".to_string(),
        );
    }
    lines
}

fn print_failure(e: &EngineError) {
    for line in failure_lines(e) {
        eprintln!("{}", line);
    }
}

/// Parse arguments, run one transfer and exit.
///
/// A finished run exits 0 even when the checksums differ; the outcome is
/// printed and logged. Any fatal error exits 1.
fn main() {
    init_logging();
    let args = Args::parse();

    let settings = Settings::from_env();
    let mut prompter = TerminalPrompter::stdio();
    let agent = select_agent(Platform::current(), args.lto);

    let exit_code = match run_cli(&args, &mut prompter, &settings, agent.as_ref()) {
        Ok(summary) => {
            print_summary(&summary);
            println!("eventOutcome={}", summary.report.outcome);
            0
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(
    args: &Args,
    prompter: &mut dyn Prompter,
    settings: &Settings,
    agent: &dyn CopyAgent,
) -> anyhow::Result<RunSummary> {
    let (mut job, log) =
        create_job(&args.source, &args.destination, args.lto, settings, prompter).map_err(|e| {
            print_failure(&e);
            anyhow::Error::new(e).context("Job creation failed")
        })?;
    tracing::debug!("logging run {} to {}", job.id, log.path().display());

    let progress = CliProgress;
    let result = plan_job(&mut job, prompter, &log, Some(&progress))
        .and_then(|()| run_job(&mut job, agent, &log, Some(&progress), settings));

    result.map_err(|e| {
        log.error(&e.to_string());
        print_failure(&e);
        anyhow::Error::new(e).context(format!("Transfer of {} failed", job.folder_name))
    })
}
