//! Oracle backed by an external command.
//!
//! The command receives one JSON request on stdin and answers on stdout,
//! either with a JSON patch or the marker text format.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::prompt::{edge_case_prompt, repair_prompt};
use super::response::{parse_edge_case_response, parse_patch_response};
use crate::domain::errors::OracleError;
use crate::domain::ports::{
    ArtifactPatch, EdgeCaseContext, EdgeCaseProposal, PatchOracle, RepairContext,
};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Request<'a> {
    Repair {
        prompt: String,
        context: &'a RepairContext,
    },
    EdgeCases {
        prompt: String,
        context: &'a EdgeCaseContext,
    },
}

/// Runs `program args...` once per oracle call.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn call(&self, request: &Request<'_>) -> Result<String, OracleError> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| OracleError::Unavailable(format!("cannot encode request: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| OracleError::Unavailable(format!("cannot start '{}': {err}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that exits without reading its input still gets judged by its exit status.
            if let Err(err) = stdin.write_all(&payload).await {
                debug!(error = %err, "oracle command did not consume its request");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| OracleError::Unavailable(format!("oracle command failed: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::Unavailable(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let reply = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = reply.len(), "oracle command replied");
        Ok(reply)
    }
}

#[async_trait]
impl PatchOracle for CommandOracle {
    fn name(&self) -> &'static str {
        "command"
    }

    #[instrument(skip_all, fields(program = %self.program, attempt = context.attempt.number))]
    async fn propose(&self, context: &RepairContext) -> Result<ArtifactPatch, OracleError> {
        let reply = self
            .call(&Request::Repair {
                prompt: repair_prompt(context),
                context,
            })
            .await?;
        parse_patch_response(&reply)
    }

    async fn propose_edge_cases(
        &self,
        context: &EdgeCaseContext,
    ) -> Result<Vec<EdgeCaseProposal>, OracleError> {
        let reply = self
            .call(&Request::EdgeCases {
                prompt: edge_case_prompt(context),
                context,
            })
            .await?;
        parse_edge_case_response(&reply)
    }
}
