use async_trait::async_trait;
use nix::unistd::{AccessFlags, access};
use std::io::ErrorKind;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::models::{Candidate, Verdict};

/// Flag appended to every validator invocation.
pub const VALIDATE_FLAG: &str = "--validate";

/// How long to wait for output pipes to close once the process group is gone
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("dirval not found: {0}")]
    NotFound(String),

    #[error("dirval not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("failed to start dirval {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for dirval on {}: {source}", .path.display())]
    Wait {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a single completed validator run.
#[derive(Debug, Clone)]
pub struct Validation {
    pub verdict: Verdict,
    /// Combined stdout and stderr, only kept for display
    pub output: String,
}

/// Decides whether one snapshot directory is sound.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Any `Err` means the validator itself is unusable, not that the
    /// candidate failed.
    async fn validate(&self, candidate: &Candidate) -> Result<Validation, ValidatorError>;
}

/// Resolve the configured command the way a shell would: anything with a
/// slash is a path, a bare name is looked up on `PATH`.
pub fn resolve_command(cmd: &str) -> Result<PathBuf, ValidatorError> {
    if cmd.contains('/') {
        let path = PathBuf::from(cmd);
        if !path.is_file() {
            return Err(ValidatorError::NotFound(cmd.to_string()));
        }
        if !is_executable(&path) {
            return Err(ValidatorError::NotExecutable(path));
        }
        return Ok(path);
    }

    let search = std::env::var_os("PATH").unwrap_or_default();
    let mut not_executable = None;
    for dir in std::env::split_paths(&search) {
        let path = dir.join(cmd);
        if !path.is_file() {
            continue;
        }
        if is_executable(&path) {
            return Ok(path);
        }
        not_executable.get_or_insert(path);
    }

    Err(match not_executable {
        Some(path) => ValidatorError::NotExecutable(path),
        None => ValidatorError::NotFound(cmd.to_string()),
    })
}

fn is_executable(path: &Path) -> bool {
    access(path, AccessFlags::X_OK).is_ok()
}

/// Runs the external `dirval` executable as `<program> <path> --validate`.
///
/// Each child gets its own process group so that a timeout takes down
/// anything the validator spawned, not just the direct child.
pub struct ProcessValidator {
    program: PathBuf,
    timeout: Duration,
}

impl ProcessValidator {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }
}

#[async_trait]
impl Validator for ProcessValidator {
    async fn validate(&self, candidate: &Candidate) -> Result<Validation, ValidatorError> {
        let started = Instant::now();

        let mut command = std::process::Command::new(&self.program);
        command
            .arg(&candidate.path)
            .arg(VALIDATE_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = Command::from(command)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => {
                    ValidatorError::NotFound(self.program.display().to_string())
                }
                ErrorKind::PermissionDenied => ValidatorError::NotExecutable(self.program.clone()),
                _ => ValidatorError::Spawn {
                    program: self.program.clone(),
                    source,
                },
            })?;

        let pid = child.id();
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;

        // Sweep the whole group whatever happened to the direct child
        kill_process_group(pid);

        let verdict = match waited {
            Ok(Ok(status)) if status.success() => Verdict::Valid,
            Ok(Ok(status)) => Verdict::Invalid {
                exit_code: status.code(),
            },
            Ok(Err(source)) => {
                let _ = child.kill().await;
                return Err(ValidatorError::Wait {
                    path: candidate.path.clone(),
                    source,
                });
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Timed out validator already gone");
                }
                Verdict::TimedOut
            }
        };

        let mut output = collect_output(stdout).await;
        output.push_str(&collect_output(stderr).await);

        let elapsed = started.elapsed();
        debug!(
            path = %candidate.path.display(),
            verdict = ?verdict,
            elapsed_ms = elapsed.as_millis() as u64,
            "Validator finished"
        );

        Ok(Validation { verdict, output })
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    })
}

async fn collect_output(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut handle) = reader else {
        return String::new();
    };

    match tokio::time::timeout(OUTPUT_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            debug!(error = %e, "Output reader failed");
            String::new()
        }
        Err(_) => {
            // A descendant escaped the process group and still holds the pipe
            handle.abort();
            String::new()
        }
    }
}

fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };

    #[allow(clippy::cast_possible_wrap)]
    let pgid = Pid::from_raw(pid as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "Failed to kill validator process group"),
    }
}
