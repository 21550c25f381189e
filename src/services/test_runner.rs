//! Test artifact execution against a ready mock.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::cancellation::CancelSignal;
use super::process_group::{self, GroupSignal};
use crate::domain::errors::RunnerError;
use crate::domain::models::RunnerConfig;

/// Raw result of one test execution, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    /// `None` when the process was killed
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
}

impl TestOutcome {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Runs one test artifact to completion or timeout.
#[derive(Debug, Clone)]
pub struct TestRunner {
    config: RunnerConfig,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.timeout()
    }

    fn command_for(&self, artifact: &Path, host: &str, port: u16) -> Command {
        let mut cmd = match self.config.interpreter {
            Some(ref interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(artifact);
                cmd
            }
            None => Command::new(artifact),
        };
        cmd.arg(host)
            .arg(port.to_string())
            .env("UDPQA_TARGET_HOST", host)
            .env("UDPQA_TARGET_PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = artifact.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        process_group::isolate(&mut cmd);
        cmd
    }

    /// Execute `artifact` against `host:port`.
    ///
    /// A run exceeding `timeout` is killed and reported with `timed_out`
    /// set, along with whatever output it produced. Cancellation kills the
    /// run and returns [`RunnerError::Cancelled`].
    #[instrument(skip(self, cancel), fields(artifact = %artifact.display()))]
    pub async fn run(
        &self,
        artifact: &Path,
        host: &str,
        port: u16,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> Result<TestOutcome, RunnerError> {
        let artifact = std::path::absolute(artifact).unwrap_or_else(|_| artifact.to_path_buf());
        let started_at = Utc::now();
        let started = Instant::now();

        let mut child = self
            .command_for(&artifact, host, port)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                artifact: artifact.clone(),
                source,
            })?;
        let pid = child.id();

        let stdout = read_all(child.stdout.take().ok_or(RunnerError::Capture("stdout"))?);
        let stderr = read_all(child.stderr.take().ok_or(RunnerError::Capture("stderr"))?);

        let mut timed_out = false;
        let mut cancelled = false;
        let exit_code = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!(error = %err, "failed to wait for test process");
                    None
                }
            },
            () = tokio::time::sleep(timeout) => {
                warn!(timeout_ms = timeout.as_millis(), "test run timed out, killing");
                timed_out = true;
                None
            }
            () = cancel.cancelled() => {
                debug!("test run cancelled, killing");
                cancelled = true;
                None
            }
        };

        // Children of the test may still hold the pipes open.
        process_group::signal_group(pid, GroupSignal::Kill);
        if timed_out || cancelled {
            let _ = child.kill().await;
        }
        let elapsed = started.elapsed();

        let stdout = collect(stdout, DRAIN_TIMEOUT).await;
        let stderr = collect(stderr, DRAIN_TIMEOUT).await;

        if cancelled {
            return Err(RunnerError::Cancelled);
        }

        debug!(?exit_code, timed_out, elapsed_ms = elapsed.as_millis(), "test run finished");
        Ok(TestOutcome {
            exit_code,
            stdout,
            stderr,
            timed_out,
            elapsed,
            started_at,
        })
    }
}

/// How long to wait for the pipes to close once the test process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Output read so far, shared with the task still reading it.
struct Capture {
    bytes: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn read_all<R>(mut reader: R) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let bytes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&bytes);
    let task = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
                Err(err) => {
                    debug!(error = %err, "test output capture ended with error");
                    break;
                }
            }
        }
    });
    Capture { bytes, task }
}

async fn collect(mut capture: Capture, drain: Duration) -> String {
    match tokio::time::timeout(drain, &mut capture.task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "test output capture task failed"),
        Err(_) => {
            // A descendant outside the process group still holds the pipe.
            warn!(drain_ms = drain.as_millis(), "test output still open, keeping what was read");
            capture.task.abort();
        }
    }
    let bytes = capture.bytes.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::services::cancellation::cancellation;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("test.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn runner() -> TestRunner {
        TestRunner::new(RunnerConfig::default())
    }

    #[tokio::test]
    async fn test_captures_exit_code_and_streams() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo \"target $1:$2\"\necho oops >&2\nexit 4");

        let outcome = runner()
            .run(&script, "127.0.0.1", 41234, Duration::from_secs(5), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(4));
        assert_eq!(outcome.stdout, "target 127.0.0.1:41234\n");
        assert_eq!(outcome.stderr, "oops\n");
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo started\nexec sleep 30");

        let outcome = runner()
            .run(&script, "127.0.0.1", 1, Duration::from_millis(200), &CancelSignal::never())
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.stdout.contains("started"));
        assert!(outcome.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_returns_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exec sleep 30");
        let (handle, signal) = cancellation();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });
        let result = runner()
            .run(&script, "127.0.0.1", 1, Duration::from_secs(10), &signal)
            .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(RunnerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_collect_keeps_output_when_pipe_stays_open() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"FAIL: test_echo\n").await.unwrap();

        let text = collect(read_all(reader), Duration::from_millis(200)).await;
        assert_eq!(text, "FAIL: test_echo\n");
        drop(writer);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_spawn_error() {
        let result = runner()
            .run(
                Path::new("/nonexistent/test.sh"),
                "127.0.0.1",
                1,
                Duration::from_secs(1),
                &CancelSignal::never(),
            )
            .await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }
}
