//! Bounded repair loop for one service.
//!
//! Sequences supervisor, runner and classifier for each attempt, and on a
//! failed attempt asks the patch oracle what to change. The loop owns when
//! to re-execute; the oracle only decides content.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use super::cancellation::CancelSignal;
use super::outcome_classifier::{classify, classify_readiness_failure, ClassifierInput};
use super::port_allocator::{LeaseGuard, PortAllocator};
use super::process_supervisor::ProcessSupervisor;
use super::test_runner::{TestOutcome, TestRunner};
use crate::domain::errors::{ArtifactError, OracleError, PortError, RunnerError, SupervisorError};
use crate::domain::models::{
    Config, LoopState, PortLease, PortSubstitution, RepairOutcome, RunAttempt, ServiceRunResult,
    ServiceSpec, SessionVerdict,
};
use crate::domain::ports::{ArtifactStore, PatchOracle, RepairContext};

/// Timing and budget knobs for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    /// Repair attempts after the first run
    pub max_retries: u32,
    pub port_reserve_attempts: u32,
    pub port_retry_backoff: Duration,
    pub readiness_timeout: Duration,
    pub stop_grace: Duration,
    pub test_timeout: Duration,
    pub oracle_timeout: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.refinement.max_retries,
            port_reserve_attempts: config.refinement.port_reserve_attempts.max(1),
            port_retry_backoff: Duration::from_millis(config.refinement.port_retry_backoff_ms),
            readiness_timeout: config.supervisor.readiness_timeout(),
            stop_grace: config.supervisor.stop_grace(),
            test_timeout: config.runner.timeout(),
            oracle_timeout: config.oracle.timeout(),
        }
    }

    /// Upper bound on recorded attempts per session
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a session stopped without a content verdict.
#[derive(Debug, Error)]
enum Abort {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Runner(RunnerError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl From<RunnerError> for Abort {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Cancelled => Self::Cancelled,
            other => Self::Runner(other),
        }
    }
}

/// Current loop state; every move is recorded on the result.
#[derive(Debug)]
struct Tracker {
    state: LoopState,
    attempt: u32,
}

impl Tracker {
    const fn new() -> Self {
        Self {
            state: LoopState::Init,
            attempt: 0,
        }
    }

    fn advance(&mut self, result: &mut ServiceRunResult, next: LoopState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(attempt = self.attempt, from = %self.state, to = %next, "state transition");
        result.record_transition(self.attempt, self.state, next);
        self.state = next;
    }
}

/// Artifact content as the loop currently knows it.
#[derive(Debug, Clone)]
struct Artifacts {
    mock: String,
    test: String,
}

/// What happened between mock start and classification.
enum Execution {
    Tested(TestOutcome),
    NotReady(SupervisorError),
}

/// The per-service refinement state machine.
pub struct RefinementLoop {
    allocator: Arc<PortAllocator>,
    supervisor: Arc<ProcessSupervisor>,
    runner: Arc<TestRunner>,
    oracle: Arc<dyn PatchOracle>,
    store: Arc<dyn ArtifactStore>,
    settings: LoopSettings,
}

impl RefinementLoop {
    pub fn new(
        allocator: Arc<PortAllocator>,
        supervisor: Arc<ProcessSupervisor>,
        runner: Arc<TestRunner>,
        oracle: Arc<dyn PatchOracle>,
        store: Arc<dyn ArtifactStore>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            allocator,
            supervisor,
            runner,
            oracle,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn oracle(&self) -> &Arc<dyn PatchOracle> {
        &self.oracle
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn allocator(&self) -> &Arc<PortAllocator> {
        &self.allocator
    }

    /// Drive `spec` to a terminal state and seal `result`.
    ///
    /// Never fails: infrastructure problems and cancellation seal the
    /// result as `Aborted` with a reason.
    #[instrument(skip_all, fields(service_id = %spec.id, session_id = %result.session_id()))]
    pub async fn run(
        &self,
        spec: &ServiceSpec,
        result: &mut ServiceRunResult,
        cancel: &CancelSignal,
    ) -> SessionVerdict {
        let mut tracker = Tracker::new();
        let mut artifacts = None;

        let (verdict, abort_reason) =
            match self.drive(spec, result, cancel, &mut tracker, &mut artifacts).await {
                Ok(verdict) => (verdict, None),
                Err(abort) => {
                    warn!(reason = %abort, attempts = result.attempt_count(), "session aborted");
                    tracker.advance(result, LoopState::Aborted);
                    (SessionVerdict::Aborted, Some(abort.to_string()))
                }
            };

        let (mock, test) = artifacts.map_or((None, None), |a| (Some(a.mock), Some(a.test)));
        result.seal(verdict, abort_reason, mock, test);
        info!(%verdict, attempts = result.attempt_count(), "session sealed");
        verdict
    }

    async fn drive(
        &self,
        spec: &ServiceSpec,
        result: &mut ServiceRunResult,
        cancel: &CancelSignal,
        tracker: &mut Tracker,
        artifacts: &mut Option<Artifacts>,
    ) -> Result<SessionVerdict, Abort> {
        let mock = self.store.read(&spec.mock_artifact).await?;
        let test = self.store.read(&spec.test_artifact).await?;
        let current = artifacts.insert(Artifacts { mock, test });

        let max_attempts = self.settings.max_attempts();
        for number in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(Abort::Cancelled);
            }
            tracker.attempt = number;
            tracker.advance(result, LoopState::MockStarting);

            let mut attempt = self
                .execute(spec, number, result, cancel, tracker)
                .instrument(info_span!("attempt", attempt = number))
                .await?;
            info!(attempt = number, port = attempt.port, verdict = %attempt.verdict, "attempt classified");

            if attempt.verdict.is_pass() {
                result.record_attempt(attempt);
                tracker.advance(result, LoopState::Converged);
                return Ok(SessionVerdict::Converged);
            }
            if number >= max_attempts {
                result.record_attempt(attempt);
                tracker.advance(result, LoopState::Exhausted);
                return Ok(SessionVerdict::Exhausted);
            }

            tracker.advance(result, LoopState::Repairing);
            match self.repair(spec, current, &attempt, cancel).await {
                Ok(repair) => {
                    attempt.repair = repair;
                    result.record_attempt(attempt);
                }
                Err(abort) => {
                    result.record_attempt(attempt);
                    return Err(abort);
                }
            }
        }

        // max_attempts >= 1, so the loop always returns from inside.
        Ok(SessionVerdict::Exhausted)
    }

    /// Run one attempt up to classification. The mock is stopped and the
    /// port released before this returns, on every path.
    async fn execute(
        &self,
        spec: &ServiceSpec,
        number: u32,
        result: &mut ServiceRunResult,
        cancel: &CancelSignal,
        tracker: &mut Tracker,
    ) -> Result<RunAttempt, Abort> {
        let lease = self.reserve(spec.port, result.session_id(), cancel).await?;
        if lease.is_substituted() {
            result.record_substitution(PortSubstitution {
                attempt: number,
                requested: lease.requested_port,
                actual: lease.port,
            });
        }
        let mut guard = LeaseGuard::new(Arc::clone(&self.allocator), lease);
        let mut mock = self.supervisor.start(&spec.mock_artifact, guard.lease())?;
        let wait_started = Instant::now();

        let ready = tokio::select! {
            ready = self.supervisor.await_ready(&mut mock, self.settings.readiness_timeout) => ready,
            () = cancel.cancelled() => {
                self.supervisor.stop(&mut mock, Duration::ZERO).await;
                return Err(Abort::Cancelled);
            }
        };

        let execution = match ready {
            Ok(()) => {
                guard.mark_bound();
                mock.mark_running();
                tracker.advance(result, LoopState::MockReady);
                tracker.advance(result, LoopState::TestRunning);

                let run = self
                    .runner
                    .run(
                        &spec.test_artifact,
                        mock.host(),
                        mock.port(),
                        self.settings.test_timeout,
                        cancel,
                    )
                    .await;
                match run {
                    Ok(outcome) => Execution::Tested(outcome),
                    Err(err) => {
                        let grace = if matches!(err, RunnerError::Cancelled) {
                            Duration::ZERO
                        } else {
                            self.settings.stop_grace
                        };
                        self.supervisor.stop(&mut mock, grace).await;
                        return Err(err.into());
                    }
                }
            }
            Err(err) if err.is_infrastructure() => {
                self.supervisor.stop(&mut mock, Duration::ZERO).await;
                return Err(err.into());
            }
            Err(err) => {
                warn!(error = %err, "mock not ready, skipping test run");
                Execution::NotReady(err)
            }
        };

        let mock_crashed = mock.has_crashed();
        let final_state = self.supervisor.stop(&mut mock, self.settings.stop_grace).await;
        guard.release();
        tracker.advance(result, LoopState::Classify);

        let mock_log = mock.log_snapshot();
        let verdict = match execution {
            Execution::Tested(ref outcome) => {
                classify(&ClassifierInput::from_outcome(outcome, mock_crashed), &mock_log)
            }
            Execution::NotReady(ref err) => classify_readiness_failure(err),
        };
        let (exit_code, stdout, stderr, elapsed_ms, test_ran) = match execution {
            Execution::Tested(outcome) => {
                let elapsed_ms = outcome.elapsed_ms();
                (outcome.exit_code, outcome.stdout, outcome.stderr, elapsed_ms, true)
            }
            Execution::NotReady(_) => {
                let waited = u64::try_from(wait_started.elapsed().as_millis()).unwrap_or(u64::MAX);
                (None, String::new(), String::new(), waited, false)
            }
        };

        Ok(RunAttempt {
            number,
            port: mock.port(),
            exit_code,
            stdout,
            stderr,
            mock_log,
            elapsed_ms,
            verdict,
            test_ran,
            mock_started_at: mock.started_at(),
            mock_stopped_at: mock.stopped_at().unwrap_or_else(Utc::now),
            mock_final_state: final_state,
            repair: RepairOutcome::NotAttempted,
        })
    }

    /// Reserve a port, retrying with backoff while the range is exhausted.
    async fn reserve(
        &self,
        hint: u16,
        session_id: Uuid,
        cancel: &CancelSignal,
    ) -> Result<PortLease, Abort> {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.port_retry_backoff)
            .with_max_elapsed_time(None)
            .build();
        let mut tries = 0;
        loop {
            tries += 1;
            match self.allocator.reserve(hint, session_id) {
                Ok(lease) => return Ok(lease),
                Err(err) if tries >= self.settings.port_reserve_attempts => return Err(err.into()),
                Err(err) => {
                    let wait = backoff.next_backoff().unwrap_or(self.settings.port_retry_backoff);
                    debug!(tries, wait_ms = wait.as_millis(), error = %err, "port reservation failed, retrying");
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = cancel.cancelled() => return Err(Abort::Cancelled),
                    }
                }
            }
        }
    }

    /// Ask the oracle for a patch and apply whatever it returns.
    ///
    /// Oracle failures consume the attempt; only artifact store failures
    /// and cancellation abort.
    async fn repair(
        &self,
        spec: &ServiceSpec,
        current: &mut Artifacts,
        attempt: &RunAttempt,
        cancel: &CancelSignal,
    ) -> Result<RepairOutcome, Abort> {
        let context = RepairContext {
            service: spec.clone(),
            mock_artifact: current.mock.clone(),
            test_artifact: current.test.clone(),
            attempt: attempt.clone(),
            mock_log: attempt.mock_log.clone(),
        };
        let timeout_ms = u64::try_from(self.settings.oracle_timeout.as_millis()).unwrap_or(u64::MAX);

        let proposed = tokio::select! {
            proposed = tokio::time::timeout(self.settings.oracle_timeout, self.oracle.propose(&context)) => {
                proposed.unwrap_or_else(|_| Err(OracleError::Timeout(timeout_ms)))
            }
            () = cancel.cancelled() => return Err(Abort::Cancelled),
        };

        let patch = match proposed {
            Ok(patch) => patch,
            Err(err) => {
                warn!(oracle = self.oracle.name(), error = %err, "oracle failed, attempt consumed without change");
                return Ok(RepairOutcome::OracleFailed {
                    reason: err.to_string(),
                });
            }
        };

        let mock = self
            .apply(&spec.mock_artifact, &mut current.mock, patch.mock_artifact)
            .await?;
        let test = self
            .apply(&spec.test_artifact, &mut current.test, patch.test_artifact)
            .await?;

        if mock || test {
            info!(mock, test, "applied oracle patch");
            Ok(RepairOutcome::Applied { mock, test })
        } else {
            debug!(oracle = self.oracle.name(), "oracle proposed no change");
            Ok(RepairOutcome::NoChange)
        }
    }

    /// Write `proposed` over `handle` if it differs from what is there.
    async fn apply(
        &self,
        handle: &Path,
        current: &mut String,
        proposed: Option<String>,
    ) -> Result<bool, ArtifactError> {
        let Some(content) = proposed.filter(|content| content != &*current) else {
            return Ok(false);
        };
        self.store.write(handle, &content).await?;
        *current = content;
        Ok(true)
    }
}

impl std::fmt::Debug for RefinementLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementLoop")
            .field("oracle", &self.oracle.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
