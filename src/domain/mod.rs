//! Domain layer for the udpqa orchestration engine
//!
//! This module contains the data model, error taxonomy and the ports
//! through which the engine talks to its external collaborators.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    ArtifactError, EngineError, EngineResult, OracleError, PortError, RunnerError,
    SupervisorError,
};
