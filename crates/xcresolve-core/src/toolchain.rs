//! Toolchain invocation: the `ToolchainRunner` contract and the real
//! `xcodebuild` implementation.
//!
//! The resolution core only depends on the trait; process execution,
//! timeouts, and retries live entirely in this module. Timeouts and retry
//! counts are tunable through the environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `XCRESOLVE_LIST_TIMEOUT` | 10 | Seconds per `-list` attempt |
//! | `XCRESOLVE_SETTINGS_TIMEOUT` | 10 | Seconds per `-showBuildSettings` attempt |
//! | `XCRESOLVE_SETTINGS_RETRIES` | 3 | Extra attempts after the first |
//!
//! A knob set to an empty or unparsable value reads as 0; a timeout of 0
//! disables the deadline for that invocation.

use std::ffi::OsString;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::env;
use crate::project::ProjectOptions;
use crate::types::Error;

pub const LIST_TIMEOUT_VAR: &str = "XCRESOLVE_LIST_TIMEOUT";
pub const SETTINGS_TIMEOUT_VAR: &str = "XCRESOLVE_SETTINGS_TIMEOUT";
pub const SETTINGS_RETRIES_VAR: &str = "XCRESOLVE_SETTINGS_RETRIES";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Contract between the resolution core and the external build toolchain.
///
/// Implementations return the raw text output on success and raise
/// [`Error::ToolchainTimeout`] once retries are exhausted. The core
/// memoizes results per project model, so implementations are invoked at
/// most once per query kind per model instance.
pub trait ToolchainRunner {
    /// Raw `-list` output for the given project or workspace.
    fn list(&self, options: &ProjectOptions) -> Result<String, Error>;

    /// Raw `-showBuildSettings` output for the given project or workspace.
    fn show_build_settings(&self, options: &ProjectOptions) -> Result<String, Error>;

    /// Toolchain version as a dotted numeric string, e.g. `"15.2"`.
    fn version(&self) -> Result<String, Error>;
}

/// Runs the real `xcodebuild` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct XcodebuildRunner;

impl XcodebuildRunner {
    pub fn new() -> Self {
        XcodebuildRunner
    }

    pub fn list_timeout() -> u64 {
        env::numeric(LIST_TIMEOUT_VAR, 10)
    }

    pub fn settings_timeout() -> u64 {
        env::numeric(SETTINGS_TIMEOUT_VAR, 10)
    }

    pub fn settings_retries() -> u64 {
        env::numeric(SETTINGS_RETRIES_VAR, 3)
    }

    fn list_args(options: &ProjectOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-list".into()];
        if let Some(workspace) = options.workspace_path() {
            args.push("-workspace".into());
            args.push(workspace.into());
        } else if let Some(project) = options.project_path() {
            args.push("-project".into());
            args.push(project.into());
        }
        args
    }

    fn settings_args(options: &ProjectOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-showBuildSettings".into()];
        if let Some(workspace) = options.workspace_path() {
            args.push("-workspace".into());
            args.push(workspace.into());
            if let Some(scheme) = &options.scheme {
                args.push("-scheme".into());
                args.push(scheme.into());
            }
        } else if let Some(project) = options.project_path() {
            args.push("-alltargets".into());
            args.push("-project".into());
            args.push(project.into());
        }
        if let Some(configuration) = &options.configuration {
            args.push("-configuration".into());
            args.push(configuration.into());
        }
        args
    }

    /// Runs one command line, retrying after each expired timeout.
    ///
    /// Every timed-out attempt kills the still-running child before the
    /// next attempt starts.
    fn run(
        &self,
        args: &[OsString],
        timeout_secs: u64,
        retries: u64,
        suppress_stderr: bool,
    ) -> Result<String, Error> {
        let command = display_command(args);
        let attempts = retries + 1;

        for attempt in 1..=attempts {
            debug!("running '{command}' (attempt {attempt}/{attempts})");
            match run_once(args, timeout_secs, suppress_stderr)? {
                Attempt::Completed(output) => return Ok(output),
                Attempt::TimedOut => {
                    debug!("'{command}' timed out after {timeout_secs}s, killed");
                }
            }
        }

        Err(Error::ToolchainTimeout {
            command,
            attempts,
            timeout_secs,
        })
    }
}

impl ToolchainRunner for XcodebuildRunner {
    fn list(&self, options: &ProjectOptions) -> Result<String, Error> {
        self.run(
            &Self::list_args(options),
            Self::list_timeout(),
            0,
            options.suppress_stderr,
        )
    }

    fn show_build_settings(&self, options: &ProjectOptions) -> Result<String, Error> {
        self.run(
            &Self::settings_args(options),
            Self::settings_timeout(),
            Self::settings_retries(),
            options.suppress_stderr,
        )
    }

    fn version(&self) -> Result<String, Error> {
        let output = Command::new("xcodebuild").arg("-version").output()?;
        if !output.status.success() {
            return Err(Error::ToolchainFailed {
                command: "xcodebuild -version".to_string(),
                status: output.status.code().unwrap_or(-1),
            });
        }
        // First line reads "Xcode 15.2"; keep the numeric part.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().last())
            .unwrap_or_default();
        Ok(version.to_string())
    }
}

enum Attempt {
    Completed(String),
    TimedOut,
}

fn run_once(args: &[OsString], timeout_secs: u64, suppress_stderr: bool) -> Result<Attempt, Error> {
    let mut command = Command::new("xcodebuild");
    command.args(args).stdin(Stdio::null()).stdout(Stdio::piped());
    command.stderr(if suppress_stderr {
        Stdio::null()
    } else {
        Stdio::inherit()
    });

    let mut child = command.spawn()?;

    // Drain stdout on a separate thread so a chatty child never blocks on
    // a full pipe while we poll for exit.
    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stdout.read_to_end(&mut buffer);
            buffer
        })
    });

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if timeout_secs > 0 && started.elapsed() >= Duration::from_secs(timeout_secs) {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = match reader {
        Some(handle) => handle.join().unwrap_or_default(),
        None => Vec::new(),
    };

    match status {
        Some(status) if status.success() => Ok(Attempt::Completed(
            String::from_utf8_lossy(&output).into_owned(),
        )),
        Some(status) => Err(Error::ToolchainFailed {
            command: display_command(args),
            status: status.code().unwrap_or(-1),
        }),
        None => Ok(Attempt::TimedOut),
    }
}

fn display_command(args: &[OsString]) -> String {
    let mut rendered = String::from("xcodebuild");
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

/// Compares two dotted numeric version strings segment by segment.
///
/// Missing segments count as 0, so `"9" >= "9.0"` holds. Non-numeric
/// segments compare as 0.
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|segment| segment.trim().parse().unwrap_or(0))
            .collect()
    };
    let version = parse(version);
    let minimum = parse(minimum);
    let len = version.len().max(minimum.len());
    for i in 0..len {
        let have = version.get(i).copied().unwrap_or(0);
        let want = minimum.get(i).copied().unwrap_or(0);
        if have != want {
            return have > want;
        }
    }
    true
}
