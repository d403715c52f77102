//! Run lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `Idle → Dispatched → Streaming → {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Dispatched,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatched => "dispatched",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Dispatched) => true,
            (Dispatched, Streaming) => true,
            (Dispatched | Streaming, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(!RunState::Streaming.is_terminal());
        assert!(!RunState::Idle.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(RunState::Idle.can_transition_to(RunState::Dispatched));
        assert!(RunState::Dispatched.can_transition_to(RunState::Cancelled));
        assert!(RunState::Streaming.can_transition_to(RunState::Completed));
        assert!(!RunState::Idle.can_transition_to(RunState::Streaming));
        assert!(!RunState::Completed.can_transition_to(RunState::Failed));
        assert!(!RunState::Cancelled.can_transition_to(RunState::Streaming));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_value(RunState::Cancelled).unwrap(),
            serde_json::json!("cancelled")
        );
    }
}
