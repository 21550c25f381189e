//! Refinement loop state machine states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// States of the refinement loop.
///
/// `Init -> MockStarting -> MockReady -> TestRunning -> Classify ->
/// {Converged | Repairing -> MockStarting | Exhausted | Aborted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Init,
    MockStarting,
    MockReady,
    TestRunning,
    Classify,
    Repairing,
    Converged,
    Exhausted,
    Aborted,
}

impl LoopState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted | Self::Aborted)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use LoopState::{
            Aborted, Classify, Converged, Exhausted, Init, MockReady, MockStarting, Repairing,
            TestRunning,
        };

        if self.is_terminal() {
            return false;
        }
        // Cancellation and infrastructure failures may abort from any live state.
        if next == Aborted {
            return true;
        }
        matches!(
            (self, next),
            (Init, MockStarting)
                | (MockStarting, MockReady)
                // readiness failure skips the test and goes straight to classification
                | (MockStarting, Classify)
                | (MockReady, TestRunning)
                | (TestRunning, Classify)
                | (Classify, Converged | Repairing | Exhausted)
                | (Repairing, MockStarting)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::MockStarting => "mock_starting",
            Self::MockReady => "mock_ready",
            Self::TestRunning => "test_running",
            Self::Classify => "classify",
            Self::Repairing => "repairing",
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub attempt: u32,
    pub from: LoopState,
    pub to: LoopState,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            LoopState::Init,
            LoopState::MockStarting,
            LoopState::MockReady,
            LoopState::TestRunning,
            LoopState::Classify,
            LoopState::Converged,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_repair_cycle() {
        assert!(LoopState::Classify.can_transition_to(LoopState::Repairing));
        assert!(LoopState::Repairing.can_transition_to(LoopState::MockStarting));
        assert!(!LoopState::Repairing.can_transition_to(LoopState::TestRunning));
    }

    #[test]
    fn test_readiness_failure_skips_test() {
        assert!(LoopState::MockStarting.can_transition_to(LoopState::Classify));
        assert!(!LoopState::MockStarting.can_transition_to(LoopState::TestRunning));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [LoopState::Converged, LoopState::Exhausted, LoopState::Aborted] {
            assert!(!terminal.can_transition_to(LoopState::MockStarting));
            assert!(!terminal.can_transition_to(LoopState::Aborted));
        }
    }

    #[test]
    fn test_abort_allowed_from_live_states() {
        for state in [
            LoopState::Init,
            LoopState::MockStarting,
            LoopState::MockReady,
            LoopState::TestRunning,
            LoopState::Classify,
            LoopState::Repairing,
        ] {
            assert!(state.can_transition_to(LoopState::Aborted));
        }
    }
}
