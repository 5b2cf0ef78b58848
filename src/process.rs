//! Running external tools.
//!
//! Every encoder invocation goes through the [`ToolRunner`] trait so the rest
//! of the crate never spawns processes directly. The production
//! implementation, [`ProcessRunner`], behaves as follows:
//!
//! - combined stdout/stderr is written to a fixed-name log file
//!   (`replicator-tool-log.txt` in the working directory by default)
//! - the call blocks until the tool exits, or fails once the timeout elapses
//!   or the interrupt flag is raised (the child is killed either way)
//! - a non-zero exit status is an error
//! - the log file is removed on success and left behind on failure so the
//!   operator can inspect what the tool complained about
//!
//! Nothing is retried. A failing tool almost always means a recipe flag the
//! tool does not understand, a missing codec, or resource exhaustion.

use crate::generate::Tool;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Default name of the tool log file.
pub const TOOL_LOG: &str = "replicator-tool-log.txt";

/// Default limit for a single tool invocation. Typically a tool finishes in a
/// few seconds; the limit catches recipes that forgot a frame or time limit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0} is not available")]
    Unavailable(Tool),
    #[error("Empty command")]
    EmptyCommand,
    #[error("Unable to start '{program}': {source}")]
    Spawn { program: String, source: io::Error },
    #[error("'{program}' failed ({status}), see '{log}'", log = .log.display())]
    Failed {
        program: String,
        status: String,
        log: PathBuf,
    },
    #[error(
        "'{program}' timed out after {secs}s, see '{log}'",
        secs = .timeout.as_secs(),
        log = .log.display()
    )]
    Timeout {
        program: String,
        timeout: Duration,
        log: PathBuf,
    },
    #[error("'{program}' interrupted")]
    Interrupted { program: String },
    #[error("Tool log error: {0}")]
    Io(#[from] io::Error),
}

/// Runs external tools on behalf of generators and template synthesis.
pub trait ToolRunner {
    /// Run an argv-style command to completion.
    fn run(&self, command: &[OsString]) -> Result<(), ToolError>;

    /// Whether `binary` can be resolved on the execution path.
    fn is_available(&self, binary: &str) -> bool;
}

/// [`ToolRunner`] backed by real subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    log_file: PathBuf,
    timeout: Duration,
    interrupt: Option<Arc<AtomicBool>>,
}

impl ProcessRunner {
    pub fn new(log_file: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            log_file: log_file.into(),
            timeout,
            interrupt: None,
        }
    }

    /// Kill the running tool as soon as `flag` is raised.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(TOOL_LOG, DEFAULT_TIMEOUT)
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, command: &[OsString]) -> Result<(), ToolError> {
        let (program, args) = command.split_first().ok_or(ToolError::EmptyCommand)?;
        let program_name = program.to_string_lossy().into_owned();
        debug!("running '{}'", display_command(command));

        let log = File::create(&self.log_file)?;
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                // nothing ran, so there is nothing to inspect
                let _ = std::fs::remove_file(&self.log_file);
                return Err(ToolError::Spawn {
                    program: program_name,
                    source,
                });
            }
        };

        let waited = wait_child(&mut child, self.timeout, self.interrupt.as_deref())?;
        if !matches!(waited, Wait::Exited(_)) {
            // best effort, the child may have exited in the meantime
            let _ = child.kill();
            let _ = child.wait();
        }
        match waited {
            Wait::TimedOut => Err(ToolError::Timeout {
                program: program_name,
                timeout: self.timeout,
                log: self.log_file.clone(),
            }),
            Wait::Interrupted => Err(ToolError::Interrupted {
                program: program_name,
            }),
            Wait::Exited(status) if !status.success() => Err(ToolError::Failed {
                program: program_name,
                status: status.to_string(),
                log: self.log_file.clone(),
            }),
            Wait::Exited(_) => {
                std::fs::remove_file(&self.log_file)?;
                Ok(())
            }
        }
    }

    fn is_available(&self, binary: &str) -> bool {
        is_on_path(binary)
    }
}

#[derive(Debug)]
enum Wait {
    Exited(ExitStatus),
    TimedOut,
    Interrupted,
}

/// Poll `child` until it exits, `timeout` elapses, or `interrupt` is raised.
fn wait_child(
    child: &mut Child,
    timeout: Duration,
    interrupt: Option<&AtomicBool>,
) -> io::Result<Wait> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Wait::Exited(status));
        }
        if interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            return Ok(Wait::Interrupted);
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(Wait::TimedOut);
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    }
}

/// Render a command for log output.
pub fn display_command(command: &[OsString]) -> String {
    command
        .iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check whether `binary` resolves to an executable on `PATH`.
pub fn is_on_path(binary: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|paths| find_in_paths(binary, &paths).is_some())
}

/// Resolve `binary` against a `PATH`-style list of directories.
pub fn find_in_paths(binary: &str, paths: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .flat_map(|dir| candidates(&dir, binary))
        .find(|candidate| is_executable(candidate))
}

fn candidates(dir: &Path, binary: &str) -> Vec<PathBuf> {
    let mut found = vec![dir.join(binary)];
    if cfg!(windows) {
        found.push(dir.join(format!("{binary}.exe")));
    }
    found
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
