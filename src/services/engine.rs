//! Engine driver: runs one session per service on a bounded worker pool.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cancellation::{cancellation, CancelSignal};
use super::port_allocator::PortAllocator;
use super::process_supervisor::ProcessSupervisor;
use super::refinement_loop::{LoopSettings, RefinementLoop};
use super::session::ServiceRunSession;
use super::test_runner::TestRunner;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::{Config, EdgeCaseConfig, ServiceRunResult, ServiceSpec, SessionVerdict};
use crate::domain::ports::{ArtifactStore, PatchOracle};
use crate::infrastructure::history::HistoryWriter;

/// Process exit codes of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunExitCode {
    /// Every service converged
    Success,
    /// At least one service exhausted its retries, none aborted
    Exhausted,
    /// Bad arguments, configuration, or service specs
    Usage,
    /// At least one session could not be executed
    Aborted,
}

impl RunExitCode {
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Exhausted => 1,
            Self::Usage => 2,
            Self::Aborted => 3,
        }
    }
}

/// One service's sealed result and where its history was written.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub result: ServiceRunResult,
    pub history_path: Option<PathBuf>,
}

/// Results for every submitted service, in submission order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineReport {
    pub services: Vec<ServiceReport>,
}

impl EngineReport {
    pub fn count(&self, verdict: SessionVerdict) -> usize {
        self.services
            .iter()
            .filter(|report| report.result.verdict() == Some(verdict))
            .count()
    }

    pub fn all_converged(&self) -> bool {
        self.count(SessionVerdict::Converged) == self.services.len()
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceReport> {
        self.services
            .iter()
            .find(|report| report.result.service_id() == service_id)
    }

    /// Exit code for the run. Failing edge cases only count when `gate_edge_cases` is set.
    pub fn exit_code(&self, gate_edge_cases: bool) -> RunExitCode {
        if self.count(SessionVerdict::Aborted) > 0 {
            return RunExitCode::Aborted;
        }
        if !self.all_converged() {
            return RunExitCode::Exhausted;
        }
        if gate_edge_cases
            && self
                .services
                .iter()
                .any(|report| !report.result.edge_cases_converged())
        {
            return RunExitCode::Exhausted;
        }
        RunExitCode::Success
    }
}

/// Runs service sessions concurrently, bounded by `max_concurrency`.
#[derive(Debug)]
pub struct Engine {
    refinement: Arc<RefinementLoop>,
    max_concurrency: usize,
    global_deadline: Option<Duration>,
    edge_cases: EdgeCaseConfig,
    history: Option<HistoryWriter>,
}

impl Engine {
    pub fn new(refinement: Arc<RefinementLoop>, max_concurrency: usize) -> Self {
        Self {
            refinement,
            max_concurrency: max_concurrency.max(1),
            global_deadline: None,
            edge_cases: EdgeCaseConfig::default(),
            history: None,
        }
    }

    /// Wire the full component graph from configuration.
    pub fn from_config(
        config: &Config,
        oracle: Arc<dyn PatchOracle>,
        store: Arc<dyn ArtifactStore>,
    ) -> EngineResult<Self> {
        let allocator = Arc::new(PortAllocator::from_config(
            config.supervisor.bind_host.clone(),
            &config.ports,
        )?);
        let refinement = RefinementLoop::new(
            allocator,
            Arc::new(ProcessSupervisor::new(config.supervisor.clone())),
            Arc::new(TestRunner::new(config.runner.clone())),
            oracle,
            store,
            LoopSettings::from_config(config),
        );

        Ok(Self::new(Arc::new(refinement), config.engine.max_concurrency)
            .with_global_deadline(config.engine.global_deadline())
            .with_edge_cases(config.edge_cases.clone())
            .with_history(HistoryWriter::new(config.history.dir.clone())))
    }

    #[must_use]
    pub fn with_global_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.global_deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_edge_cases(mut self, edge_cases: EdgeCaseConfig) -> Self {
        self.edge_cases = edge_cases;
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: HistoryWriter) -> Self {
        self.history = Some(history);
        self
    }

    pub fn refinement(&self) -> &Arc<RefinementLoop> {
        &self.refinement
    }

    pub fn allocator(&self) -> &Arc<PortAllocator> {
        self.refinement.allocator()
    }

    /// Reject specs that are malformed or share an id.
    pub fn validate(specs: &[ServiceSpec]) -> EngineResult<()> {
        let mut seen = HashSet::with_capacity(specs.len());
        let mut stems: HashMap<String, &str> = HashMap::with_capacity(specs.len());
        for spec in specs {
            spec.validate()?;
            if !seen.insert(spec.id.as_str()) {
                return Err(EngineError::DuplicateService(spec.id.clone()));
            }
            let stem = spec.file_stem();
            if let Some(first) = stems.get(&stem) {
                return Err(EngineError::HistoryCollision {
                    first: (*first).to_string(),
                    second: spec.id.clone(),
                    stem,
                });
            }
            stems.insert(stem, spec.id.as_str());
        }
        Ok(())
    }

    /// Run every service to a sealed result.
    ///
    /// Only invalid input fails; a session that cannot execute still
    /// yields an `Aborted` result. `cancel` and the global deadline both
    /// cancel every running session.
    pub async fn run(&self, specs: Vec<ServiceSpec>, cancel: CancelSignal) -> EngineResult<EngineReport> {
        Self::validate(&specs)?;
        info!(
            services = specs.len(),
            max_concurrency = self.max_concurrency,
            "starting engine run"
        );

        let (handle, signal) = cancellation();
        let link = handle.link(cancel, self.global_deadline);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let session = ServiceRunSession::new(
                spec.clone(),
                Arc::clone(&self.refinement),
                self.edge_cases.clone(),
            );
            let session_id = session.id();
            let semaphore = Arc::clone(&semaphore);
            let signal = signal.clone();

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                session.run(signal).await
            });
            handles.push((spec, session_id, task));
        }

        let mut report = EngineReport::default();
        for (spec, session_id, task) in handles {
            let result = match task.await {
                Ok(result) => result,
                Err(err) => {
                    error!(service_id = %spec.id, error = %err, "session task failed");
                    failed_session(session_id, spec, &err.to_string())
                }
            };
            let history_path = self.persist(&result).await;
            report.services.push(ServiceReport {
                result,
                history_path,
            });
        }
        link.abort();

        info!(
            converged = report.count(SessionVerdict::Converged),
            exhausted = report.count(SessionVerdict::Exhausted),
            aborted = report.count(SessionVerdict::Aborted),
            "engine run finished"
        );
        Ok(report)
    }

    async fn persist(&self, result: &ServiceRunResult) -> Option<PathBuf> {
        let history = self.history.as_ref()?;
        match history.write(result).await {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(service_id = %result.service_id(), error = %err, "failed to write attempt history");
                None
            }
        }
    }
}

fn failed_session(session_id: Uuid, spec: ServiceSpec, reason: &str) -> ServiceRunResult {
    let mut result = ServiceRunResult::open(session_id, spec);
    result.seal(
        SessionVerdict::Aborted,
        Some(format!("session task failed: {reason}")),
        None,
        None,
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(id: &str, verdict: SessionVerdict) -> ServiceReport {
        let mut result = ServiceRunResult::open(Uuid::new_v4(), ServiceSpec::new(id, 1, "m", "t"));
        result.seal(verdict, None, None, None);
        ServiceReport {
            result,
            history_path: None,
        }
    }

    #[test]
    fn test_exit_codes() {
        let report = EngineReport {
            services: vec![sealed("a", SessionVerdict::Converged)],
        };
        assert_eq!(report.exit_code(false), RunExitCode::Success);

        let report = EngineReport {
            services: vec![
                sealed("a", SessionVerdict::Converged),
                sealed("b", SessionVerdict::Exhausted),
            ],
        };
        assert_eq!(report.exit_code(false).code(), 1);

        let report = EngineReport {
            services: vec![
                sealed("a", SessionVerdict::Exhausted),
                sealed("b", SessionVerdict::Aborted),
            ],
        };
        assert_eq!(report.exit_code(false).code(), 3);
    }

    #[test]
    fn test_edge_cases_gate_only_when_enabled() {
        let mut parent = sealed("a", SessionVerdict::Converged);
        let mut edge = ServiceRunResult::open(Uuid::new_v4(), ServiceSpec::new("a::edge::x", 1, "m", "t"));
        edge.seal(SessionVerdict::Exhausted, None, None, None);
        parent.result.attach_edge_case(edge);
        let report = EngineReport {
            services: vec![parent],
        };

        assert_eq!(report.exit_code(false), RunExitCode::Success);
        assert_eq!(report.exit_code(true), RunExitCode::Exhausted);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let specs = vec![
            ServiceSpec::new("dns", 53, "m", "t"),
            ServiceSpec::new("dns", 5353, "m2", "t2"),
        ];
        assert!(matches!(
            Engine::validate(&specs),
            Err(EngineError::DuplicateService(id)) if id == "dns"
        ));
    }

    #[test]
    fn test_validate_rejects_colliding_history_files() {
        let specs = vec![
            ServiceSpec::new("chat:edge", 53, "m", "t"),
            ServiceSpec::new("chat_edge", 5353, "m2", "t2"),
        ];
        assert!(matches!(
            Engine::validate(&specs),
            Err(EngineError::HistoryCollision { first, second, stem })
                if first == "chat:edge" && second == "chat_edge" && stem == "chat_edge"
        ));
    }

    #[test]
    fn test_failed_session_is_aborted() {
        let result = failed_session(Uuid::new_v4(), ServiceSpec::new("svc", 1, "m", "t"), "panic");
        assert_eq!(result.verdict(), Some(SessionVerdict::Aborted));
        assert!(result.abort_reason().is_some_and(|r| r.contains("panic")));
    }
}
