//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces the engine consumes:
//! - PatchOracle: proposes replacement artifacts after a failed attempt
//! - ArtifactStore: reads and writes artifact content
//!
//! Adapters for both live in `crate::adapters`.

pub mod artifact_store;
pub mod patch_oracle;

pub use artifact_store::ArtifactStore;
pub use patch_oracle::{
    ArtifactPatch, EdgeCaseContext, EdgeCaseProposal, PatchOracle, RepairContext,
};
