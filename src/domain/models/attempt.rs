//! Run attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::MockState;
use super::verdict::Verdict;

/// What the repair step did after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// Attempt passed, or the retry budget was already spent
    NotAttempted,
    /// At least one artifact was replaced
    Applied { mock: bool, test: bool },
    /// The oracle answered but proposed nothing new
    NoChange,
    /// The oracle failed, timed out, or returned malformed output
    OracleFailed { reason: String },
}

impl RepairOutcome {
    pub const fn changed_artifacts(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// One sealed execution attempt.
///
/// Attempts accumulate in order on a [`super::ServiceRunResult`] and are
/// never rewritten after being recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAttempt {
    /// 1-based attempt number
    pub number: u32,
    /// Port the mock was bound to
    pub port: u16,
    /// Test process exit code; `None` if killed or never run
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Mock log captured for this attempt, including output after stop
    pub mock_log: String,
    /// Test run duration in milliseconds, or the readiness wait if the test never ran
    pub elapsed_ms: u64,
    pub verdict: Verdict,
    /// Whether the test artifact was executed at all
    pub test_ran: bool,
    pub mock_started_at: DateTime<Utc>,
    pub mock_stopped_at: DateTime<Utc>,
    /// Final state of the mock after stop
    pub mock_final_state: MockState,
    pub repair: RepairOutcome,
}
