//! Per-service run result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::RunAttempt;
use super::lease::PortSubstitution;
use super::loop_state::{LoopState, StateTransition};
use super::service::ServiceSpec;
use super::verdict::SessionVerdict;

/// Aggregate record of one session.
///
/// Created open when the session starts and sealed exactly once when the
/// refinement loop terminates. Recording methods are crate-private so the
/// attempt history can only grow while the session owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRunResult {
    session_id: Uuid,
    service: ServiceSpec,
    verdict: Option<SessionVerdict>,
    abort_reason: Option<String>,
    attempts: Vec<RunAttempt>,
    transitions: Vec<StateTransition>,
    port_substitutions: Vec<PortSubstitution>,
    final_mock_artifact: Option<String>,
    final_test_artifact: Option<String>,
    #[serde(default)]
    edge_cases: Vec<ServiceRunResult>,
    started_at: DateTime<Utc>,
    sealed_at: Option<DateTime<Utc>>,
}

impl ServiceRunResult {
    /// Open a result record for a session that is starting.
    pub fn open(session_id: Uuid, service: ServiceSpec) -> Self {
        Self {
            session_id,
            service,
            verdict: None,
            abort_reason: None,
            attempts: Vec::new(),
            transitions: Vec::new(),
            port_substitutions: Vec::new(),
            final_mock_artifact: None,
            final_test_artifact: None,
            edge_cases: Vec::new(),
            started_at: Utc::now(),
            sealed_at: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn service(&self) -> &ServiceSpec {
        &self.service
    }

    pub fn service_id(&self) -> &str {
        &self.service.id
    }

    /// Final verdict, `None` while the session is still open
    pub fn verdict(&self) -> Option<SessionVerdict> {
        self.verdict
    }

    pub fn is_sealed(&self) -> bool {
        self.verdict.is_some()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn attempts(&self) -> &[RunAttempt] {
        &self.attempts
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn last_attempt(&self) -> Option<&RunAttempt> {
        self.attempts.last()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn port_substitutions(&self) -> &[PortSubstitution] {
        &self.port_substitutions
    }

    pub fn final_mock_artifact(&self) -> Option<&str> {
        self.final_mock_artifact.as_deref()
    }

    pub fn final_test_artifact(&self) -> Option<&str> {
        self.final_test_artifact.as_deref()
    }

    /// Sealed results of edge-case sub-sessions
    pub fn edge_cases(&self) -> &[ServiceRunResult] {
        &self.edge_cases
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn sealed_at(&self) -> Option<DateTime<Utc>> {
        self.sealed_at
    }

    /// Whether every edge-case sub-session converged (vacuously true without any).
    pub fn edge_cases_converged(&self) -> bool {
        self.edge_cases
            .iter()
            .all(|edge| edge.verdict == Some(SessionVerdict::Converged))
    }

    pub(crate) fn record_attempt(&mut self, attempt: RunAttempt) {
        debug_assert!(!self.is_sealed(), "attempt recorded on sealed result");
        debug_assert_eq!(attempt.number as usize, self.attempts.len() + 1);
        self.attempts.push(attempt);
    }

    pub(crate) fn record_transition(&mut self, attempt: u32, from: LoopState, to: LoopState) {
        self.transitions.push(StateTransition {
            attempt,
            from,
            to,
            at: Utc::now(),
        });
    }

    pub(crate) fn record_substitution(&mut self, substitution: PortSubstitution) {
        self.port_substitutions.push(substitution);
    }

    /// Seal the record. A second call is ignored so the first verdict stands.
    pub(crate) fn seal(
        &mut self,
        verdict: SessionVerdict,
        abort_reason: Option<String>,
        final_mock_artifact: Option<String>,
        final_test_artifact: Option<String>,
    ) {
        if self.is_sealed() {
            return;
        }
        self.verdict = Some(verdict);
        self.abort_reason = abort_reason;
        self.final_mock_artifact = final_mock_artifact;
        self.final_test_artifact = final_test_artifact;
        self.sealed_at = Some(Utc::now());
    }

    /// Attach a sealed edge-case result. Allowed after sealing: it does not
    /// change this session's own verdict.
    pub(crate) fn attach_edge_case(&mut self, edge: ServiceRunResult) {
        debug_assert!(edge.is_sealed());
        self.edge_cases.push(edge);
    }
}
