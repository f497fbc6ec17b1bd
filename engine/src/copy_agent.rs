//! Copy agents.
//!
//! The bytes are moved by a platform tool (robocopy, rsync, gcp or cp) run
//! as a blocking subprocess, or by the in-process `NativeAgent`. Every agent
//! copies the *contents* of the source into the final destination folder and
//! reports a real success or failure status.

use crate::error::EngineError;
use crate::fs_ops;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Host platform family, for picking a copy agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

/// What a copy must preserve or skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Leave out dot-files and `System Volume Information`
    pub exclude_hidden: bool,
    /// Carry permission bits and modification times over
    pub preserve_mode_and_timestamps: bool,
    /// Never replace a file that already exists at the destination
    pub no_clobber: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions {
            recursive: true,
            exclude_hidden: true,
            preserve_mode_and_timestamps: true,
            no_clobber: true,
        }
    }
}

/// One copy: the contents of `source` go into `destination`.
#[derive(Debug, Clone, Copy)]
pub struct CopyRequest<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
    pub options: CopyOptions,
}

/// What an agent reports after a successful copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub agent: String,
    /// Files written, when the agent can tell
    pub files_copied: Option<usize>,
}

/// Something that can copy a directory tree.
pub trait CopyAgent {
    /// Name recorded in the event log.
    fn name(&self) -> &str;

    /// Copy and block until done.
    ///
    /// # Errors
    /// `CopyAgentUnavailable` if the agent cannot be started,
    /// `CopyAgentFailed` if it reports failure.
    fn copy(&self, request: &CopyRequest<'_>) -> Result<CopyReport, EngineError>;
}

/// External tools the engine knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Windows robocopy
    Robocopy,
    /// rsync, the macOS default
    Rsync,
    /// GNU cp installed as `gcp` on macOS, faster on LTO tape
    Gcp,
    /// GNU cp on Linux
    Cp,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Robocopy => write!(f, "robocopy"),
            CommandKind::Rsync => write!(f, "rsync"),
            CommandKind::Gcp => write!(f, "gcp"),
            CommandKind::Cp => write!(f, "cp"),
        }
    }
}

/// Copy agent running an external program.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    kind: CommandKind,
    name: String,
}

impl CommandAgent {
    pub fn new(kind: CommandKind) -> Self {
        CommandAgent {
            kind,
            name: kind.to_string(),
        }
    }

    /// Program and arguments for a request.
    pub fn command_line(&self, request: &CopyRequest<'_>) -> (String, Vec<OsString>) {
        let options = &request.options;
        let mut args: Vec<OsString> = Vec::new();

        match self.kind {
            CommandKind::Cp | CommandKind::Gcp => {
                if options.preserve_mode_and_timestamps {
                    args.push("--preserve=mode,timestamps".into());
                }
                let mut flags = String::from("-");
                if options.no_clobber {
                    flags.push('n');
                }
                if options.recursive {
                    flags.push('R');
                }
                flags.push('v');
                args.push(flags.into());
                // `src/.` copies the contents whether or not the target exists.
                args.push(request.source.join(".").into_os_string());
                args.push(request.destination.as_os_str().to_owned());
            }
            CommandKind::Rsync => {
                let mut flags = String::from("-");
                if options.recursive {
                    flags.push('r');
                }
                if options.preserve_mode_and_timestamps {
                    flags.push_str("tp");
                }
                flags.push('v');
                args.push(flags.into());
                if options.exclude_hidden {
                    args.push("--exclude=.*".into());
                    args.push("--exclude=.*/".into());
                    args.push("--exclude=System Volume Information/".into());
                }
                if options.no_clobber {
                    args.push("--ignore-existing".into());
                }
                args.push("--stats".into());
                args.push("--progress".into());
                // Trailing slashes make rsync copy contents, not the folder.
                let mut source = request.source.as_os_str().to_owned();
                source.push("/");
                let mut destination = request.destination.as_os_str().to_owned();
                destination.push("/");
                args.push(source);
                args.push(destination);
            }
            CommandKind::Robocopy => {
                args.push(request.source.as_os_str().to_owned());
                args.push(request.destination.as_os_str().to_owned());
                if options.recursive {
                    args.push("/E".into());
                }
                if options.exclude_hidden {
                    for arg in [
                        "/XA:SH",
                        "/XD",
                        ".*",
                        "/XD",
                        "*System Volume Information*",
                        "/XD",
                        "$Recycle.bin",
                    ] {
                        args.push(arg.into());
                    }
                }
                if options.no_clobber {
                    for arg in ["/XC", "/XN", "/XO"] {
                        args.push(arg.into());
                    }
                }
                if options.preserve_mode_and_timestamps {
                    args.push("/COPY:DAT".into());
                    args.push("/DCOPY:T".into());
                }
                args.push("/A-:SH".into());
                args.push("/A+:R".into());
            }
        }

        (self.kind.to_string(), args)
    }

    /// Whether an exit status means the copy worked.
    ///
    /// robocopy uses exit codes below 8 for success (they describe what was
    /// copied or skipped). GNU cp 9.2 and later exits 1 when `-n` skips an
    /// existing file, so with `may_skip` set that status counts as success
    /// for cp and gcp; any file it really failed to copy still shows up when
    /// the manifests are compared. Everything else follows the
    /// zero-is-success rule.
    pub fn is_success(&self, status: &ExitStatus, may_skip: bool) -> bool {
        match (self.kind, status.code()) {
            (CommandKind::Robocopy, Some(code)) => (0..8).contains(&code),
            (CommandKind::Cp | CommandKind::Gcp, Some(1)) if may_skip => true,
            _ => status.success(),
        }
    }
}

impl CopyAgent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn copy(&self, request: &CopyRequest<'_>) -> Result<CopyReport, EngineError> {
        let (program, args) = self.command_line(request);
        let may_skip = request.options.no_clobber && request.destination.exists();
        tracing::info!("running {} {:?}", program, args);

        let status = Command::new(&program)
            .args(&args)
            .status()
            .map_err(|e| EngineError::CopyAgentUnavailable {
                agent: program.clone(),
                source: e,
            })?;

        if !self.is_success(&status, may_skip) {
            return Err(EngineError::CopyAgentFailed {
                agent: program,
                status: status.to_string(),
            });
        }
        if !status.success() && self.kind != CommandKind::Robocopy {
            tracing::warn!("{} finished with {}, existing files were skipped", program, status);
        }

        Ok(CopyReport {
            agent: program,
            files_copied: None,
        })
    }
}

/// In-process copy agent (see `fs_ops::copy_tree`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAgent;

impl CopyAgent for NativeAgent {
    fn name(&self) -> &str {
        "copyit-native"
    }

    fn copy(&self, request: &CopyRequest<'_>) -> Result<CopyReport, EngineError> {
        let files = fs_ops::copy_tree(request.source, request.destination, &request.options)?;
        Ok(CopyReport {
            agent: self.name().to_string(),
            files_copied: Some(files),
        })
    }
}

/// Pick the copy agent for a platform.
///
/// `fast` selects gcp instead of rsync on macOS and is ignored elsewhere.
pub fn select_agent(platform: Platform, fast: bool) -> Box<dyn CopyAgent> {
    match platform {
        Platform::Windows => Box::new(CommandAgent::new(CommandKind::Robocopy)),
        Platform::MacOs if fast => Box::new(CommandAgent::new(CommandKind::Gcp)),
        Platform::MacOs => Box::new(CommandAgent::new(CommandKind::Rsync)),
        Platform::Linux => Box::new(CommandAgent::new(CommandKind::Cp)),
        Platform::Other => Box::new(NativeAgent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn request<'a>(source: &'a Path, destination: &'a Path) -> CopyRequest<'a> {
        CopyRequest {
            source,
            destination,
            options: CopyOptions::default(),
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_select_agent_by_platform() {
        assert_eq!(select_agent(Platform::Windows, false).name(), "robocopy");
        assert_eq!(select_agent(Platform::MacOs, false).name(), "rsync");
        assert_eq!(select_agent(Platform::MacOs, true).name(), "gcp");
        assert_eq!(select_agent(Platform::Linux, true).name(), "cp");
        assert_eq!(select_agent(Platform::Other, false).name(), "copyit-native");
    }

    #[test]
    fn test_cp_command_line() {
        let agent = CommandAgent::new(CommandKind::Cp);
        let (program, args) = agent.command_line(&request(Path::new("/src/film"), Path::new("/dst/film")));

        assert_eq!(program, "cp");
        assert_eq!(
            strings(&args),
            vec!["--preserve=mode,timestamps", "-nRv", "/src/film/.", "/dst/film"]
        );
    }

    #[test]
    fn test_rsync_command_line() {
        let agent = CommandAgent::new(CommandKind::Rsync);
        let (_, args) = agent.command_line(&request(Path::new("/src/film"), Path::new("/dst/film")));
        let args = strings(&args);

        assert_eq!(args[0], "-rtpv");
        assert!(args.contains(&"--exclude=.*".to_string()));
        assert!(args.contains(&"--ignore-existing".to_string()));
        assert_eq!(&args[args.len() - 2..], &["/src/film/", "/dst/film/"]);
    }

    #[test]
    fn test_robocopy_command_line_respects_options() {
        let agent = CommandAgent::new(CommandKind::Robocopy);
        let mut req = request(Path::new("C:\\src"), Path::new("D:\\dst\\film"));
        req.options.no_clobber = false;
        let args = strings(&agent.command_line(&req).1);

        assert_eq!(&args[..3], &["C:\\src", "D:\\dst\\film", "/E"]);
        assert!(args.contains(&"/XA:SH".to_string()));
        assert!(!args.contains(&"/XC".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_interpretation() {
        use std::os::unix::process::ExitStatusExt;

        let robocopy = CommandAgent::new(CommandKind::Robocopy);
        let cp = CommandAgent::new(CommandKind::Cp);
        // Raw wait status: exit code lives in the second byte.
        let exit = |code: i32| ExitStatus::from_raw(code << 8);

        assert!(robocopy.is_success(&exit(1), false));
        assert!(robocopy.is_success(&exit(7), false));
        assert!(!robocopy.is_success(&exit(8), true));
        assert!(cp.is_success(&exit(0), false));
        assert!(!cp.is_success(&exit(1), false));
    }

    #[cfg(unix)]
    #[test]
    fn test_cp_skip_status_accepted_only_over_existing_destination() {
        use std::os::unix::process::ExitStatusExt;

        let exit = |code: i32| ExitStatus::from_raw(code << 8);
        for kind in [CommandKind::Cp, CommandKind::Gcp] {
            let agent = CommandAgent::new(kind);
            assert!(agent.is_success(&exit(1), true), "{} skipped existing files", kind);
            assert!(!agent.is_success(&exit(2), true));
            assert!(!agent.is_success(&exit(1), false));
        }
        let rsync = CommandAgent::new(CommandKind::Rsync);
        assert!(!rsync.is_success(&exit(1), true));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_program_is_unavailable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let agent = CommandAgent::new(CommandKind::Robocopy);
        let result = agent.copy(&request(temp_dir.path(), &temp_dir.path().join("out")));
        assert!(matches!(result, Err(EngineError::CopyAgentUnavailable { .. })));
    }

    #[test]
    fn test_native_agent_reports_file_count() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("b")).expect("Failed to create src");
        fs::write(src.join("a.txt"), b"a").expect("Failed to write a");
        fs::write(src.join("b").join("c.txt"), b"c").expect("Failed to write c");

        let dst = temp_dir.path().join("dst");
        let report = NativeAgent.copy(&request(&src, &dst)).expect("Failed to copy");

        assert_eq!(report.files_copied, Some(2));
        assert!(dst.join("b").join("c.txt").is_file());
    }
}
