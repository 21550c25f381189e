//! Mock process state model.

use serde::{Deserialize, Serialize};

/// Observed lifecycle state of a supervised mock process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockState {
    Starting,
    Ready,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

impl MockState {
    /// `Stopped` and `Crashed` are terminal; nothing is listening any more.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for MockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(MockState::Stopped.is_terminal());
        assert!(MockState::Crashed.is_terminal());
        for state in [
            MockState::Starting,
            MockState::Ready,
            MockState::Running,
            MockState::Stopping,
        ] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
    }
}
