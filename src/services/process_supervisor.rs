//! Mock listener process supervision.
//!
//! Starts a mock artifact bound to a leased port, observes readiness,
//! captures its combined output, and guarantees termination.

use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::log_buffer::{capture, LogBuffer, LogStream};
use super::process_group::{self, GroupSignal};
use crate::domain::errors::SupervisorError;
use crate::domain::models::{MockState, PortLease, ReadinessProbe, SupervisorConfig};

/// How long to wait for capture tasks to drain after the process is gone.
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle to one supervised mock process.
///
/// The log buffer outlives the process, so a crashed mock's output stays
/// available to the classifier. Dropping a handle that was never stopped
/// kills the whole process group.
#[derive(Debug)]
pub struct MockProcess {
    id: Uuid,
    pid: Option<u32>,
    host: String,
    port: u16,
    artifact: PathBuf,
    state: MockState,
    log: Arc<LogBuffer>,
    cursor: usize,
    child: Option<Child>,
    capture: Vec<JoinHandle<()>>,
    exit_code: Option<i32>,
    started_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
}

impl MockProcess {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> MockState {
        self.state
    }

    /// Index of the first log line not yet consumed by readiness detection
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn log(&self) -> Arc<LogBuffer> {
        Arc::clone(&self.log)
    }

    pub fn log_snapshot(&self) -> String {
        self.log.snapshot()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    /// Mark a ready mock as serving a test run.
    pub fn mark_running(&mut self) {
        if self.state == MockState::Ready {
            self.state = MockState::Running;
        }
    }

    /// Poll for an unexpected exit. A mock that exits on its own before
    /// being asked to stop has crashed.
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                if !self.state.is_terminal() && self.state != MockState::Stopping {
                    warn!(pid = ?self.pid, port = self.port, ?status, "mock exited unexpectedly");
                    self.state = MockState::Crashed;
                }
                self.exit_code = status.code();
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(pid = ?self.pid, error = %err, "failed to poll mock process");
                None
            }
        }
    }

    pub fn has_crashed(&mut self) -> bool {
        self.poll_exit();
        self.state == MockState::Crashed
    }
}

impl Drop for MockProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(pid = ?self.pid, artifact = %self.artifact.display(), "mock handle dropped without stop, killing process group");
            process_group::signal_group(self.pid, GroupSignal::Kill);
            let _ = child.start_kill();
        }
        for handle in self.capture.drain(..) {
            handle.abort();
        }
    }
}

/// Starts, observes and stops mock processes.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn bind_host(&self) -> &str {
        &self.config.bind_host
    }

    fn command_for(&self, artifact: &Path, port: u16) -> Command {
        let mut cmd = match self.config.interpreter {
            Some(ref interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(artifact);
                cmd
            }
            None => Command::new(artifact),
        };
        cmd.arg(&self.config.bind_host)
            .arg(port.to_string())
            .env("UDPQA_BIND_HOST", &self.config.bind_host)
            .env("UDPQA_BIND_PORT", port.to_string())
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

    /// Launch `artifact` bound to the leased port and start capturing its output.
    #[instrument(skip(self, lease), fields(port = lease.port, artifact = %artifact.display()))]
    pub fn start(&self, artifact: &Path, lease: &PortLease) -> Result<MockProcess, SupervisorError> {
        let artifact = std::path::absolute(artifact).unwrap_or_else(|_| artifact.to_path_buf());
        let mut child = self
            .command_for(&artifact, lease.port)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                artifact: artifact.clone(),
                source,
            })?;

        let pid = child.id();
        let log = Arc::new(LogBuffer::new());
        let label = format!("mock:{}", lease.port);

        let stdout = child.stdout.take().ok_or(SupervisorError::Capture("stdout"))?;
        let stderr = child.stderr.take().ok_or(SupervisorError::Capture("stderr"))?;
        let capture = vec![
            capture(stdout, LogStream::Stdout, Arc::clone(&log), label.clone()),
            capture(stderr, LogStream::Stderr, Arc::clone(&log), label),
        ];

        info!(?pid, "mock process started");

        Ok(MockProcess {
            id: Uuid::new_v4(),
            pid,
            host: self.config.bind_host.clone(),
            port: lease.port,
            artifact,
            state: MockState::Starting,
            log,
            cursor: 0,
            child: Some(child),
            capture,
            exit_code: None,
            started_at: Utc::now(),
            stopped_at: None,
        })
    }

    /// Wait until the mock is observed ready, it exits, or `deadline` passes.
    #[instrument(skip(self, handle), fields(pid = ?handle.pid, port = handle.port))]
    pub async fn await_ready(
        &self,
        handle: &mut MockProcess,
        deadline: Duration,
    ) -> Result<(), SupervisorError> {
        let started = Instant::now();
        let until = started + deadline;
        let use_marker = matches!(self.config.readiness, ReadinessProbe::Marker | ReadinessProbe::Any);
        let use_probe = matches!(self.config.readiness, ReadinessProbe::PortBound | ReadinessProbe::Any);

        loop {
            if use_marker {
                if let Some(next) = handle.log.find_from(handle.cursor, &self.config.ready_marker) {
                    handle.cursor = next;
                    handle.state = MockState::Ready;
                    debug!(elapsed_ms = started.elapsed().as_millis(), "mock ready (marker)");
                    return Ok(());
                }
            }
            if use_probe && self.port_is_bound(handle.port) && handle.poll_exit().is_none() {
                handle.state = MockState::Ready;
                debug!(elapsed_ms = started.elapsed().as_millis(), "mock ready (port bound)");
                return Ok(());
            }
            if let Some(status) = handle.poll_exit() {
                handle.state = MockState::Crashed;
                return Err(SupervisorError::ExitedBeforeReady {
                    exit_code: status.code(),
                });
            }

            let now = Instant::now();
            if now >= until {
                warn!(timeout_ms = deadline.as_millis(), "mock readiness timed out");
                return Err(SupervisorError::ReadinessTimeout {
                    timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                });
            }
            let wait = self.config.poll_interval().min(until - now);
            tokio::select! {
                () = handle.log.appended() => {}
                () = sleep(wait) => {}
            }
        }
    }

    /// Stop the mock: SIGTERM to its group, wait up to `grace`, then SIGKILL.
    ///
    /// Always leaves the handle `Stopped` or `Crashed` with the process reaped
    /// and capture drained. Idempotent.
    #[instrument(skip(self, handle), fields(pid = ?handle.pid, port = handle.port))]
    pub async fn stop(&self, handle: &mut MockProcess, grace: Duration) -> MockState {
        handle.poll_exit();
        let Some(mut child) = handle.child.take() else {
            return handle.state;
        };

        let exited_on_its_own = handle.state == MockState::Crashed;
        if !exited_on_its_own {
            handle.state = MockState::Stopping;
            if !process_group::signal_group(handle.pid, GroupSignal::Terminate) {
                let _ = child.start_kill();
            }

            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(?status, "mock exited after terminate");
                    handle.exit_code = status.code();
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "error waiting for mock to exit, forcing kill");
                    let _ = child.kill().await;
                }
                Err(_) => {
                    warn!(grace_ms = grace.as_millis(), "mock shutdown timeout, forcing kill");
                    process_group::signal_group(handle.pid, GroupSignal::Kill);
                    let _ = child.kill().await;
                }
            }
        }

        // Reap any stragglers left in the group, including after a crash.
        process_group::signal_group(handle.pid, GroupSignal::Kill);
        let _ = child.wait().await;

        for mut task in handle.capture.drain(..) {
            if timeout(CAPTURE_DRAIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }

        handle.state = if exited_on_its_own {
            MockState::Crashed
        } else {
            MockState::Stopped
        };
        handle.stopped_at = Some(Utc::now());
        info!(state = %handle.state, "mock process stopped");
        handle.state
    }

    fn port_is_bound(&self, port: u16) -> bool {
        matches!(
            UdpSocket::bind((self.config.bind_host.as_str(), port)),
            Err(ref err) if err.kind() == std::io::ErrorKind::AddrInUse
        )
    }
}
