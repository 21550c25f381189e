//! Domain models for the orchestration engine

pub mod attempt;
pub mod config;
pub mod lease;
pub mod loop_state;
pub mod process;
pub mod result;
pub mod service;
pub mod verdict;

pub use attempt::{RepairOutcome, RunAttempt};
pub use config::{
    Config, EdgeCaseConfig, EngineConfig, HistoryConfig, LogFormat, LoggingConfig, OracleConfig,
    OracleKind, PortsConfig, ReadinessProbe, RefinementConfig, RunnerConfig, SupervisorConfig,
};
pub use lease::{LeaseState, PortLease, PortSubstitution};
pub use loop_state::{LoopState, StateTransition};
pub use process::MockState;
pub use result::ServiceRunResult;
pub use service::ServiceSpec;
pub use verdict::{CrashCause, SessionVerdict, Verdict};
