//! Attempt and session verdicts.

use serde::{Deserialize, Serialize};

/// Why an attempt was classified as a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashCause {
    /// The test process failed without recognizable test-framework markers
    TestErrored,
    /// The mock process died, or logged a crash, during the attempt
    MockCrashed,
    /// The mock never signalled readiness before the deadline
    ReadinessTimeout,
    /// The mock exited before signalling readiness
    MockExitedBeforeReady,
}

impl CrashCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestErrored => "test_errored",
            Self::MockCrashed => "mock_crashed",
            Self::ReadinessTimeout => "readiness_timeout",
            Self::MockExitedBeforeReady => "mock_exited_before_ready",
        }
    }
}

/// Classified outcome of a single test execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    AssertionFailure {
        /// Failing test case identifiers, in order of first appearance
        failing_cases: Vec<String>,
    },
    Timeout,
    Crash {
        cause: CrashCause,
    },
}

impl Verdict {
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::AssertionFailure { .. } => "assertion_failure",
            Self::Timeout => "timeout",
            Self::Crash { .. } => "crash",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crash { cause } => write!(f, "crash ({})", cause.as_str()),
            Self::AssertionFailure { failing_cases } if !failing_cases.is_empty() => {
                write!(f, "assertion_failure [{}]", failing_cases.join(", "))
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Terminal verdict of a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionVerdict {
    /// An attempt passed
    Converged,
    /// The retry budget ran out; the artifacts are wrong
    Exhausted,
    /// The environment could not execute an attempt at all
    Aborted,
}

impl SessionVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for SessionVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
