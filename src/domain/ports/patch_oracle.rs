//! Patch oracle port - the external collaborator that decides what should change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::OracleError;
use crate::domain::models::{RunAttempt, ServiceSpec};

/// Replacement content proposed by an oracle.
///
/// Two named slots rather than a free-form map: `None` means "no change
/// proposed for this artifact", which the refinement loop reasons about
/// explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_artifact: Option<String>,
}

impl ArtifactPatch {
    /// A patch that proposes nothing
    pub const fn none() -> Self {
        Self {
            mock_artifact: None,
            test_artifact: None,
        }
    }

    pub fn mock(content: impl Into<String>) -> Self {
        Self {
            mock_artifact: Some(content.into()),
            test_artifact: None,
        }
    }

    pub fn test(content: impl Into<String>) -> Self {
        Self {
            mock_artifact: None,
            test_artifact: Some(content.into()),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.mock_artifact.is_none() && self.test_artifact.is_none()
    }
}

/// Everything an oracle sees when asked to repair a failed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RepairContext {
    pub service: ServiceSpec,
    pub mock_artifact: String,
    pub test_artifact: String,
    pub attempt: RunAttempt,
    pub mock_log: String,
}

/// Context for the proactive edge-case phase after convergence.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeCaseContext {
    pub service: ServiceSpec,
    pub mock_artifact: String,
    pub test_artifact: String,
}

/// One oracle-suggested edge-case scenario, run as its own sub-session.
///
/// Slots left `None` reuse the converged parent artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCaseProposal {
    pub name: String,
    #[serde(default)]
    pub mock_artifact: Option<String>,
    #[serde(default)]
    pub test_artifact: Option<String>,
}

/// Trait for patch oracle implementations.
///
/// The engine owns how and when to re-execute; the oracle only decides
/// what content should change. Failures never crash the loop: they are
/// recorded and consume the attempt.
#[async_trait]
pub trait PatchOracle: Send + Sync {
    /// Oracle implementation name, for logs
    fn name(&self) -> &'static str;

    /// Propose replacement artifacts for a failed attempt.
    async fn propose(&self, context: &RepairContext) -> Result<ArtifactPatch, OracleError>;

    /// Propose edge-case scenarios for a converged service.
    async fn propose_edge_cases(
        &self,
        _context: &EdgeCaseContext,
    ) -> Result<Vec<EdgeCaseProposal>, OracleError> {
        Ok(Vec::new())
    }
}
