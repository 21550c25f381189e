//! Parsing of free-form oracle replies into patches and proposals.
//!
//! Two reply shapes are accepted: a JSON document, or plain text with
//! `Updated Mock Code:` / `Updated Test Script Code:` section markers.
//! Markdown code fences around either are stripped.

use serde::Deserialize;

use crate::domain::errors::OracleError;
use crate::domain::ports::{ArtifactPatch, EdgeCaseProposal};

pub const MOCK_MARKER: &str = "Updated Mock Code:";
pub const TEST_MARKER: &str = "Updated Test Script Code:";
pub const NO_CHANGE_MARKER: &str = "NO CHANGE";

/// Unwrap a leading Markdown code fence, with or without a language tag.
///
/// Only the fenced body is kept; anything after the closing fence line is
/// commentary and is dropped. Text that does not open with a fence is
/// returned trimmed.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("python", "sh", ...) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let mut end = body.len();
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.trim() == "```" {
            end = offset;
            break;
        }
        offset += line.len();
    }
    let body = body[..end].trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn section<'a>(text: &'a str, marker: &str, other: &str) -> Option<&'a str> {
    let (_, after) = text.split_once(marker)?;
    let body = after.split_once(other).map_or(after, |(body, _)| body);
    // An unfenced section may still end with the fence closing the whole reply.
    let body = strip_fences(body);
    let body = body.strip_suffix("```").map_or(body, str::trim_end);
    (!body.is_empty()).then_some(body)
}

/// Parse a repair reply.
pub fn parse_patch_response(reply: &str) -> Result<ArtifactPatch, OracleError> {
    let unfenced = strip_fences(reply);
    if unfenced.starts_with('{') {
        return serde_json::from_str(unfenced)
            .map_err(|err| OracleError::MalformedOutput(format!("invalid patch JSON: {err}")));
    }

    // Sections carry their own fences, so they are cut from the raw reply.
    let text = reply.trim();

    let mock = section(text, MOCK_MARKER, TEST_MARKER);
    let test = section(text, TEST_MARKER, MOCK_MARKER);
    if mock.is_some() || test.is_some() {
        return Ok(ArtifactPatch {
            mock_artifact: mock.map(str::to_string),
            test_artifact: test.map(str::to_string),
        });
    }
    if text.to_ascii_uppercase().contains(NO_CHANGE_MARKER) {
        return Ok(ArtifactPatch::none());
    }

    Err(OracleError::MalformedOutput(format!(
        "reply has neither a JSON patch nor '{MOCK_MARKER}' / '{TEST_MARKER}' sections"
    )))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EdgeCaseReply {
    List(Vec<EdgeCaseProposal>),
    Wrapped { edge_cases: Vec<EdgeCaseProposal> },
}

/// Parse an edge-case reply: a JSON list of proposals, or `{"edge_cases": [...]}`.
pub fn parse_edge_case_response(reply: &str) -> Result<Vec<EdgeCaseProposal>, OracleError> {
    let text = strip_fences(reply);
    let parsed: EdgeCaseReply = serde_json::from_str(text)
        .map_err(|err| OracleError::MalformedOutput(format!("invalid edge-case JSON: {err}")))?;
    let proposals = match parsed {
        EdgeCaseReply::List(proposals) | EdgeCaseReply::Wrapped { edge_cases: proposals } => proposals,
    };
    Ok(proposals
        .into_iter()
        .filter(|proposal| !proposal.name.trim().is_empty())
        .collect())
}
