//! Actor lifecycle state machine.
//!
//! ```text
//! STARTING → STARTED → CLOSING → CLOSED
//!     ↑                             │
//!     └──────── resubmission ───────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one actor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleState {
    Starting,
    Started,
    Closing,
    Closed,
}

impl LifecycleState {
    /// Check if this is a terminal state for the current run.
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Closed
    }

    /// Check if timers, conditions, blocking polls and channel consumers may
    /// be registered.
    pub fn allows_deferred_primitives(self) -> bool {
        self == LifecycleState::Started
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        matches!(
            (self, to),
            (LifecycleState::Starting, LifecycleState::Started)
                | (LifecycleState::Started, LifecycleState::Closing)
                | (LifecycleState::Closing, LifecycleState::Closed)
                // Resubmission
                | (LifecycleState::Closed, LifecycleState::Starting)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Starting => "STARTING",
            LifecycleState::Started => "STARTED",
            LifecycleState::Closing => "CLOSING",
            LifecycleState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(LifecycleState::Starting.can_transition_to(LifecycleState::Started));
        assert!(LifecycleState::Started.can_transition_to(LifecycleState::Closing));
        assert!(LifecycleState::Closing.can_transition_to(LifecycleState::Closed));
        assert!(LifecycleState::Closed.can_transition_to(LifecycleState::Starting));
    }

    #[test]
    fn test_no_skipping_phases() {
        assert!(!LifecycleState::Starting.can_transition_to(LifecycleState::Closing));
        assert!(!LifecycleState::Started.can_transition_to(LifecycleState::Closed));
        assert!(!LifecycleState::Closed.can_transition_to(LifecycleState::Started));
        assert!(!LifecycleState::Closing.can_transition_to(LifecycleState::Started));
    }

    #[test]
    fn test_only_started_allows_deferred_primitives() {
        assert!(LifecycleState::Started.allows_deferred_primitives());
        assert!(!LifecycleState::Starting.allows_deferred_primitives());
        assert!(!LifecycleState::Closing.allows_deferred_primitives());
        assert!(!LifecycleState::Closed.allows_deferred_primitives());
    }

    #[test]
    fn test_display_and_serde_are_uppercase() {
        assert_eq!(LifecycleState::Closing.to_string(), "CLOSING");
        assert_eq!(
            serde_json::to_value(LifecycleState::Started).unwrap(),
            serde_json::json!("STARTED")
        );
    }
}
