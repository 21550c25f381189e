//! Oracle backed by an Ollama-style `/api/generate` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::prompt::{edge_case_prompt, repair_prompt};
use super::response::{parse_edge_case_response, parse_patch_response};
use crate::domain::errors::OracleError;
use crate::domain::ports::{
    ArtifactPatch, EdgeCaseContext, EdgeCaseProposal, PatchOracle, RepairContext,
};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_k: 40,
            top_p: 0.9,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Sends prompts to a text-generation HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    url: String,
    model: String,
    timeout: Duration,
}

impl HttpOracle {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| OracleError::Unavailable(format!("cannot build HTTP client: {err}")))?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            timeout,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions::default(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.transport_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!("HTTP {status}: {}", body.trim())));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|err| OracleError::MalformedOutput(format!("invalid generate response: {err}")))?;
        debug!(model = %self.model, bytes = body.response.len(), "oracle replied");
        Ok(body.response)
    }

    fn transport_error(&self, err: &reqwest::Error) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            OracleError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl PatchOracle for HttpOracle {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip_all, fields(url = %self.url, attempt = context.attempt.number))]
    async fn propose(&self, context: &RepairContext) -> Result<ArtifactPatch, OracleError> {
        let reply = self.generate(&repair_prompt(context)).await?;
        parse_patch_response(&reply)
    }

    async fn propose_edge_cases(
        &self,
        context: &EdgeCaseContext,
    ) -> Result<Vec<EdgeCaseProposal>, OracleError> {
        let reply = self.generate(&edge_case_prompt(context)).await?;
        parse_edge_case_response(&reply)
    }
}
