//! Per-service session: one refinement loop plus the optional edge-case phase.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::cancellation::CancelSignal;
use super::refinement_loop::RefinementLoop;
use crate::domain::errors::OracleError;
use crate::domain::models::{EdgeCaseConfig, ServiceRunResult, ServiceSpec, SessionVerdict};
use crate::domain::ports::{EdgeCaseContext, EdgeCaseProposal};

/// Aggregate owning everything one service run needs.
///
/// Port leases and mock handles are acquired per attempt inside the loop,
/// so a session never holds more than one of either at a time.
#[derive(Debug)]
pub struct ServiceRunSession {
    id: Uuid,
    spec: ServiceSpec,
    refinement: Arc<RefinementLoop>,
    edge_cases: EdgeCaseConfig,
}

impl ServiceRunSession {
    pub fn new(spec: ServiceSpec, refinement: Arc<RefinementLoop>, edge_cases: EdgeCaseConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            refinement,
            edge_cases,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Run to a sealed result. Edge-case sub-sessions only run after
    /// convergence and are attached without touching the parent verdict.
    #[instrument(skip_all, fields(service_id = %self.spec.id, session_id = %self.id))]
    pub async fn run(self, cancel: CancelSignal) -> ServiceRunResult {
        let mut result = ServiceRunResult::open(self.id, self.spec.clone());
        let verdict = self.refinement.run(&self.spec, &mut result, &cancel).await;

        if verdict == SessionVerdict::Converged && self.edge_cases.enabled && !cancel.is_cancelled() {
            for edge in self.run_edge_cases(&result, &cancel).await {
                result.attach_edge_case(edge);
            }
        }
        result
    }

    async fn run_edge_cases(&self, parent: &ServiceRunResult, cancel: &CancelSignal) -> Vec<ServiceRunResult> {
        let (Some(mock), Some(test)) = (parent.final_mock_artifact(), parent.final_test_artifact()) else {
            return Vec::new();
        };
        let context = EdgeCaseContext {
            service: self.spec.clone(),
            mock_artifact: mock.to_string(),
            test_artifact: test.to_string(),
        };

        let proposals = match self.request_edge_cases(&context, cancel).await {
            Ok(proposals) => proposals,
            Err(err) => {
                warn!(error = %err, "edge-case proposal failed, skipping phase");
                return Vec::new();
            }
        };
        info!(count = proposals.len(), "running edge-case sub-sessions");

        let mut results = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            if cancel.is_cancelled() {
                break;
            }
            results.push(self.run_edge_case(&context, proposal, cancel).await);
        }
        results
    }

    async fn request_edge_cases(
        &self,
        context: &EdgeCaseContext,
        cancel: &CancelSignal,
    ) -> Result<Vec<EdgeCaseProposal>, OracleError> {
        let oracle = self.refinement.oracle();
        let limit = self.refinement.settings().oracle_timeout;
        tokio::select! {
            proposed = tokio::time::timeout(limit, oracle.propose_edge_cases(context)) => {
                proposed.unwrap_or_else(|_| {
                    Err(OracleError::Timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)))
                })
            }
            () = cancel.cancelled() => Ok(Vec::new()),
        }
    }

    /// Run one proposal as its own sealed sub-session on copied artifacts.
    async fn run_edge_case(
        &self,
        parent: &EdgeCaseContext,
        proposal: EdgeCaseProposal,
        cancel: &CancelSignal,
    ) -> ServiceRunResult {
        let name = sanitize(&proposal.name);
        let id = format!("{}::edge::{name}", self.spec.id);
        let work_dir = self.work_dir();
        let stem = id.replace(':', "_");
        let spec = ServiceSpec {
            id,
            port: self.spec.port,
            mock_artifact: work_dir.join(copy_name(&stem, "mock", &self.spec.mock_artifact)),
            test_artifact: work_dir.join(copy_name(&stem, "test", &self.spec.test_artifact)),
            description: format!("Edge case '{}' of {}", proposal.name, self.spec.id),
        };
        let mut result = ServiceRunResult::open(Uuid::new_v4(), spec.clone());

        let store = self.refinement.store();
        let mock = proposal.mock_artifact.unwrap_or_else(|| parent.mock_artifact.clone());
        let test = proposal.test_artifact.unwrap_or_else(|| parent.test_artifact.clone());
        if let Err(err) = tokio::fs::create_dir_all(&work_dir).await {
            warn!(dir = %work_dir.display(), error = %err, "cannot create edge-case work dir");
            result.seal(SessionVerdict::Aborted, Some(err.to_string()), Some(mock), Some(test));
            return result;
        }
        for (path, content) in [(&spec.mock_artifact, &mock), (&spec.test_artifact, &test)] {
            if let Err(err) = store.write(path, content).await {
                warn!(error = %err, "cannot write edge-case artifact");
                result.seal(
                    SessionVerdict::Aborted,
                    Some(err.to_string()),
                    Some(mock.clone()),
                    Some(test.clone()),
                );
                return result;
            }
        }

        let verdict = self.refinement.run(&spec, &mut result, cancel).await;
        info!(edge_case = %spec.id, %verdict, "edge-case sub-session sealed");
        result
    }

    fn work_dir(&self) -> PathBuf {
        self.edge_cases.work_dir.clone().unwrap_or_else(|| {
            self.spec
                .mock_artifact
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(".udpqa-edge")
        })
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// `<stem>.<role>[.<ext>]`, keeping the original extension for interpreters that care.
fn copy_name(stem: &str, role: &str, original: &Path) -> String {
    match original.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{stem}.{role}.{ext}"),
        None => format!("{stem}.{role}"),
    }
}
