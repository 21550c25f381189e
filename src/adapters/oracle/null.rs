//! Oracle that never proposes a change.
//!
//! Used when no oracle is configured: failed attempts are retried on
//! unchanged artifacts until the budget runs out.

use async_trait::async_trait;

use crate::domain::errors::OracleError;
use crate::domain::ports::{ArtifactPatch, PatchOracle, RepairContext};

#[derive(Debug, Clone, Default)]
pub struct NullOracle;

impl NullOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PatchOracle for NullOracle {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn propose(&self, _context: &RepairContext) -> Result<ArtifactPatch, OracleError> {
        Ok(ArtifactPatch::none())
    }
}
