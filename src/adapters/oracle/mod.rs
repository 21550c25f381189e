//! Patch oracle adapters.

pub mod command;
pub mod http;
pub mod null;
pub mod prompt;
pub mod response;

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

pub use command::CommandOracle;
pub use http::HttpOracle;
pub use null::NullOracle;

use crate::domain::errors::OracleError;
use crate::domain::models::{OracleConfig, OracleKind};
use crate::domain::ports::{
    ArtifactPatch, EdgeCaseContext, EdgeCaseProposal, PatchOracle, RepairContext,
};

/// Shares one call budget between all sessions using the inner oracle.
pub struct RateLimitedOracle {
    inner: Arc<dyn PatchOracle>,
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitedOracle {
    pub fn new(inner: Arc<dyn PatchOracle>, per_minute: NonZeroU32) -> Self {
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }
}

impl std::fmt::Debug for RateLimitedOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedOracle")
            .field("inner", &self.inner.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PatchOracle for RateLimitedOracle {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn propose(&self, context: &RepairContext) -> Result<ArtifactPatch, OracleError> {
        self.limiter.until_ready().await;
        self.inner.propose(context).await
    }

    async fn propose_edge_cases(
        &self,
        context: &EdgeCaseContext,
    ) -> Result<Vec<EdgeCaseProposal>, OracleError> {
        self.limiter.until_ready().await;
        self.inner.propose_edge_cases(context).await
    }
}

/// Build the oracle selected by configuration.
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn PatchOracle>, OracleError> {
    let oracle: Arc<dyn PatchOracle> = match config.kind {
        OracleKind::None => return Ok(Arc::new(NullOracle::new())),
        OracleKind::Command => {
            let program = config
                .command
                .clone()
                .ok_or_else(|| OracleError::Unavailable("oracle.command is not set".to_string()))?;
            Arc::new(CommandOracle::new(program, config.args.clone()))
        }
        OracleKind::Http => {
            let url = config
                .url
                .clone()
                .ok_or_else(|| OracleError::Unavailable("oracle.url is not set".to_string()))?;
            Arc::new(HttpOracle::new(url, config.model.clone(), config.timeout())?)
        }
    };

    Ok(match NonZeroU32::new(config.requests_per_minute) {
        Some(per_minute) => Arc::new(RateLimitedOracle::new(oracle, per_minute)),
        None => oracle,
    })
}
