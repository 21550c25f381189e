//! Common test utilities for integration tests
//!
//! Provides shell-script artifacts, a scripted patch oracle and builders
//! for engines wired the same way the CLI wires them.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use udpqa::adapters::FsArtifactStore;
use udpqa::domain::ports::{
    ArtifactPatch, EdgeCaseContext, EdgeCaseProposal, PatchOracle, RepairContext,
};
use udpqa::services::{cancellation, Engine, LoopSettings, PortAllocator, ProcessSupervisor, RefinementLoop, TestRunner};
use udpqa::{Config, OracleError, ServiceRunResult, ServiceSpec};

/// Mock that signals readiness immediately and then idles.
pub const READY_MOCK: &str = "echo READY\nexec sleep 30\n";

/// Mock that never prints the ready marker.
pub const SILENT_MOCK: &str = "exec sleep 30\n";

pub const PASSING_TEST: &str = "exit 0\n";

pub const FAILING_TEST: &str = "echo 'AssertionError: expected pong, got nothing' >&2\nexit 1\n";

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Write a shell script artifact and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("Failed to write script");
    path
}

/// Write a mock/test pair for `id` and return its spec.
pub fn service(dir: &Path, id: &str, port: u16, mock: &str, test: &str) -> ServiceSpec {
    let mock_path = write_script(dir, &format!("{id}.mock.sh"), mock);
    let test_path = write_script(dir, &format!("{id}.test.sh"), test);
    ServiceSpec::new(id, port, mock_path, test_path)
}

/// Fast-timing config running artifacts through `sh`.
///
/// Each test passes its own fallback range so parallel tests never
/// compete for ports.
pub fn test_config(dir: &Path, fallback_start: u16, fallback_end: u16) -> Config {
    let mut config = Config::default();
    config.supervisor.interpreter = Some("sh".to_string());
    config.supervisor.readiness_timeout_ms = 3000;
    config.supervisor.stop_grace_ms = 300;
    config.runner.interpreter = Some("sh".to_string());
    config.runner.timeout_ms = 10_000;
    config.ports.fallback_start = fallback_start;
    config.ports.fallback_end = fallback_end;
    config.ports.release_cooldown_ms = 0;
    config.refinement.port_retry_backoff_ms = 10;
    config.oracle.timeout_ms = 2000;
    config.history.dir = dir.join("history");
    config
}

/// Build a refinement loop from `config` around `oracle`.
pub fn build_loop(config: &Config, oracle: Arc<dyn PatchOracle>) -> Arc<RefinementLoop> {
    let allocator = PortAllocator::from_config(config.supervisor.bind_host.clone(), &config.ports)
        .expect("Invalid port range");
    Arc::new(RefinementLoop::new(
        Arc::new(allocator),
        Arc::new(ProcessSupervisor::new(config.supervisor.clone())),
        Arc::new(TestRunner::new(config.runner.clone())),
        oracle,
        Arc::new(FsArtifactStore::new()),
        LoopSettings::from_config(config),
    ))
}

/// Build an engine exactly as the `run` command does.
pub fn build_engine(config: &Config, oracle: Arc<dyn PatchOracle>) -> Engine {
    Engine::from_config(config, oracle, Arc::new(FsArtifactStore::new())).expect("Failed to build engine")
}

/// Run one spec through `engine` and return its sealed result.
pub async fn run_one(engine: &Engine, spec: ServiceSpec) -> ServiceRunResult {
    let (_handle, signal) = cancellation();
    let mut report = engine.run(vec![spec], signal).await.expect("Engine run failed");
    report.services.remove(0).result
}

/// One scripted oracle reply.
#[derive(Debug, Clone)]
pub enum OracleStep {
    Patch(ArtifactPatch),
    /// Sleep before answering with no change
    Stall(Duration),
    Fail(String),
}

/// Oracle that replays a fixed script, then proposes no change.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    steps: Mutex<VecDeque<OracleStep>>,
    edge_cases: Vec<EdgeCaseProposal>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<RepairContext>>,
}

impl ScriptedOracle {
    pub fn new(steps: Vec<OracleStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_edge_cases(mut self, edge_cases: Vec<EdgeCaseProposal>) -> Self {
        self.edge_cases = edge_cases;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Repair contexts seen so far, in call order.
    pub fn contexts(&self) -> Vec<RepairContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PatchOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn propose(&self, context: &RepairContext) -> Result<ArtifactPatch, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(OracleStep::Patch(patch)) => Ok(patch),
            Some(OracleStep::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(ArtifactPatch::none())
            }
            Some(OracleStep::Fail(reason)) => Err(OracleError::Unavailable(reason)),
            None => Ok(ArtifactPatch::none()),
        }
    }

    async fn propose_edge_cases(
        &self,
        _context: &EdgeCaseContext,
    ) -> Result<Vec<EdgeCaseProposal>, OracleError> {
        Ok(self.edge_cases.clone())
    }
}
