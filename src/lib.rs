//! udpqa - Mock-Service Test Orchestration Engine
//!
//! udpqa takes a set of declared network services, each with a mock server
//! artifact and a test-client artifact, and drives every service to a
//! verdict: it reserves a port, starts the mock, waits for readiness, runs the
//! test against it, classifies the outcome and, on failure, asks a patch
//! oracle for repaired artifacts before trying again.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, error taxonomy and port traits
//! - **Service Layer** (`services`): port allocation, process supervision,
//!   test execution, classification, the refinement loop and the engine
//! - **Adapters** (`adapters`): patch oracles and file-system artifacts
//! - **Infrastructure Layer** (`infrastructure`): config, logging, history
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use udpqa::adapters::{FsArtifactStore, NullOracle};
//! use udpqa::services::{cancellation, Engine};
//! use udpqa::{Config, ServiceSpec};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let engine = Engine::from_config(
//!         &config,
//!         Arc::new(NullOracle::new()),
//!         Arc::new(FsArtifactStore::new()),
//!     )?;
//!     let (_handle, signal) = cancellation();
//!     let spec = ServiceSpec::new("echo", 9999, "mocks/echo.py", "tests/echo.py");
//!     let report = engine.run(vec![spec], signal).await?;
//!     println!("all converged: {}", report.all_converged());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{
    ArtifactError, EngineError, EngineResult, OracleError, PortError, RunnerError,
    SupervisorError,
};
pub use domain::models::{
    Config, CrashCause, LoopState, RunAttempt, ServiceRunResult, ServiceSpec, SessionVerdict,
    Verdict,
};
pub use domain::ports::{ArtifactStore, PatchOracle};
pub use services::{Engine, EngineReport, RefinementLoop, RunExitCode, ServiceRunSession};
