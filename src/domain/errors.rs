//! Domain errors for the udpqa orchestration engine.
//!
//! Each component has its own error enum. `is_infrastructure` encodes the
//! escalation policy: infrastructure failures seal a session as `Aborted`,
//! everything else is a content failure that feeds the repair loop.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the port allocator.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Port {requested} unavailable and fallback range {start}-{end} exhausted")]
    Unavailable { requested: u16, start: u16, end: u16 },

    #[error("Invalid fallback range: {start}-{end}")]
    InvalidRange { start: u16, end: u16 },
}

/// Errors raised by the process supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn mock artifact {}: {source}", artifact.display())]
    Spawn {
        artifact: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mock did not become ready within {timeout_ms}ms")]
    ReadinessTimeout { timeout_ms: u64 },

    #[error("Mock exited before becoming ready (exit code: {exit_code:?})")]
    ExitedBeforeReady { exit_code: Option<i32> },

    #[error("Failed to capture {0} of mock process")]
    Capture(&'static str),
}

impl SupervisorError {
    /// Spawn and capture failures mean the environment cannot run mocks at all.
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Capture(_))
    }
}

/// Errors raised by the test runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn test artifact {}: {source}", artifact.display())]
    Spawn {
        artifact: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture {0} of test process")]
    Capture(&'static str),

    #[error("Test run cancelled")]
    Cancelled,
}

/// Errors raised by a patch oracle.
///
/// None of these abort a session: the attempt is consumed with no artifact change.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle timed out after {0}ms")]
    Timeout(u64),

    #[error("Oracle returned malformed output: {0}")]
    MalformedOutput(String),
}

/// Errors raised by an artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that escalate past a session boundary to the engine driver.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid service spec: {0}")]
    InvalidSpec(String),

    #[error("Duplicate service id: {0}")]
    DuplicateService(String),

    #[error("Service ids '{first}' and '{second}' share the history file '{stem}.json'")]
    HistoryCollision {
        first: String,
        second: String,
        stem: String,
    },

    #[error(transparent)]
    Port(#[from] PortError),
}

/// Result alias for engine-level operations.
pub type EngineResult<T> = Result<T, EngineError>;
