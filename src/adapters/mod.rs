//! Adapters for the external collaborators: oracles and artifact storage.

pub mod artifacts;
pub mod oracle;

pub use artifacts::FsArtifactStore;
pub use oracle::{build_oracle, CommandOracle, HttpOracle, NullOracle, RateLimitedOracle};
