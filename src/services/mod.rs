//! Orchestration services: the components that own process lifecycles.

pub mod cancellation;
pub mod engine;
pub mod log_buffer;
pub mod outcome_classifier;
pub mod port_allocator;
pub(crate) mod process_group;
pub mod process_supervisor;
pub mod refinement_loop;
pub mod session;
pub mod test_runner;

pub use cancellation::{cancellation, CancelHandle, CancelSignal};
pub use engine::{Engine, EngineReport, RunExitCode, ServiceReport};
pub use log_buffer::{LogBuffer, LogLine, LogStream};
pub use outcome_classifier::{classify, classify_readiness_failure, failing_cases, ClassifierInput};
pub use port_allocator::{AllocatorSnapshot, LeaseGuard, PortAllocator};
pub use process_supervisor::{MockProcess, ProcessSupervisor};
pub use refinement_loop::{LoopSettings, RefinementLoop};
pub use session::ServiceRunSession;
pub use test_runner::{TestOutcome, TestRunner};
