use actix_web::web::Bytes;
use std::{
    ffi::OsStr,
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};
use tokio::process::{Child, Command};

use crate::{error_code::ErrorCode, future::WithTimeout};

#[cfg(test)]
pub(crate) mod fake;

pub(crate) type ArcRunner = std::sync::Arc<dyn ProcessRunner>;

/// Runs an external tool to completion and hands back everything it wrote to stdout
#[async_trait::async_trait(?Send)]
pub(crate) trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &str, args: &[&OsStr]) -> Result<Bytes, ProcessError>;
}

struct MetricsGuard {
    start: Instant,
    armed: bool,
    command: String,
}

impl MetricsGuard {
    fn guard(command: String) -> Self {
        metrics::counter!(crate::init_metrics::PROCESS_START, "command" => command.clone())
            .increment(1);

        Self {
            start: Instant::now(),
            armed: true,
            command,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        metrics::histogram!(
            crate::init_metrics::PROCESS_DURATION,
            "command" => self.command.clone(),
            "completed" => (!self.armed).to_string()
        )
        .record(self.start.elapsed().as_secs_f64());

        metrics::counter!(
            crate::init_metrics::PROCESS_END,
            "completed" => (!self.armed).to_string(),
            "command" => self.command.clone()
        )
        .increment(1);
    }
}

pub(crate) struct Process {
    command: String,
    child: Child,
    guard: MetricsGuard,
    timeout: Duration,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("command", &self.command)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProcessError {
    #[error("Required command {0} not found, make sure it exists in reelhost's $PATH")]
    NotFound(String),

    #[error("Cannot run command {0} due to invalid permissions on binary, make sure the reelhost user has permission to run it")]
    PermissionDenied(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("{0} Failed with {1}: {2}")]
    Status(String, ExitStatus, String),

    #[error("Unknown process error")]
    Other(#[source] std::io::Error),
}

impl ProcessError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::COMMAND_NOT_FOUND,
            Self::PermissionDenied(_) => ErrorCode::COMMAND_PERMISSION_DENIED,
            Self::Other(_) => ErrorCode::COMMAND_ERROR,
            Self::Timeout(_) => ErrorCode::COMMAND_TIMEOUT,
            Self::Status(_, _, _) => ErrorCode::COMMAND_FAILURE,
        }
    }
}

impl Process {
    pub(crate) fn run<T>(command: &str, args: &[T], timeout: u64) -> Result<Self, ProcessError>
    where
        T: AsRef<OsStr>,
    {
        let res = tracing::trace_span!(parent: None, "Create command", %command)
            .in_scope(|| Self::spawn(command, Command::new(command).args(args), timeout));

        match res {
            Ok(this) => Ok(this),
            Err(e) => match e.kind() {
                std::io::ErrorKind::NotFound => Err(ProcessError::NotFound(command.to_string())),
                std::io::ErrorKind::PermissionDenied => {
                    Err(ProcessError::PermissionDenied(command.to_string()))
                }
                _ => Err(ProcessError::Other(e)),
            },
        }
    }

    fn spawn(command: &str, cmd: &mut Command, timeout: u64) -> std::io::Result<Self> {
        tracing::trace_span!(parent: None, "Spawn command", %command).in_scope(|| {
            let guard = MetricsGuard::guard(command.into());

            let cmd = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            cmd.spawn().map(|child| Process {
                child,
                command: String::from(command),
                guard,
                timeout: Duration::from_secs(timeout),
            })
        })
    }

    /// Wait for the process to exit, collecting stdout
    ///
    /// stderr is only kept for diagnostics: it ends up in the error on a bad exit status
    #[tracing::instrument(skip(self), fields(command = %self.command))]
    pub(crate) async fn output(self) -> Result<Bytes, ProcessError> {
        let Process {
            command,
            child,
            guard,
            timeout,
        } = self;

        // wait_with_output consumes the child; kill_on_drop reaps it if the timeout fires
        let res = child.wait_with_output().with_timeout(timeout).await;

        match res {
            Ok(Ok(output)) if output.status.success() => {
                guard.disarm();

                if !output.stderr.is_empty() {
                    tracing::debug!(
                        "{command} stderr: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }

                Ok(Bytes::from(output.stdout))
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                tracing::warn!("{command} exited with {}: {stderr}", output.status);

                Err(ProcessError::Status(command, output.status, stderr))
            }
            Ok(Err(e)) => Err(ProcessError::Other(e)),
            Err(_) => Err(ProcessError::Timeout(command)),
        }
    }
}

/// Spawns real subprocesses, each bounded by the configured process timeout
#[derive(Clone, Copy, Debug)]
pub(crate) struct Executor {
    timeout: u64,
}

impl Executor {
    pub(crate) const fn new(timeout: u64) -> Self {
        Executor { timeout }
    }
}

#[async_trait::async_trait(?Send)]
impl ProcessRunner for Executor {
    async fn run(&self, command: &str, args: &[&OsStr]) -> Result<Bytes, ProcessError> {
        Process::run(command, args, self.timeout)?.output().await
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, ProcessError, ProcessRunner};
    use std::ffi::OsStr;

    #[tokio::test]
    async fn missing_command_is_not_found() {
        let res = Executor::new(5)
            .run("reelhost-command-that-does-not-exist", &[])
            .await;

        assert!(matches!(res, Err(ProcessError::NotFound(_))));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let output = Executor::new(5)
            .run("sh", &[OsStr::new("-c"), OsStr::new("printf hello")])
            .await
            .expect("sh runs");

        assert_eq!(&output[..], b"hello");
    }

    #[tokio::test]
    async fn bad_status_carries_stderr() {
        let res = Executor::new(5)
            .run(
                "sh",
                &[OsStr::new("-c"), OsStr::new("echo broken >&2; exit 3")],
            )
            .await;

        match res {
            Err(ProcessError::Status(command, status, stderr)) => {
                assert_eq!(command, "sh");
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("Expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let res = Executor::new(1)
            .run("sh", &[OsStr::new("-c"), OsStr::new("sleep 5")])
            .await;

        assert!(matches!(res, Err(ProcessError::Timeout(_))));
    }
}
