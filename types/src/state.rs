//! Node lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle of a node. Transitions only move forward:
/// `Running` → `Stopping` → `Stopped`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum RunState {
    #[default]
    Running,
    Stopping,
    Stopped,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(&self, next: RunState) -> bool {
        next > *self
    }

    /// Numeric form used by the run-state gauge.
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Running => 0,
            Self::Stopping => 1,
            Self::Stopped => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        assert!(RunState::Running.can_advance_to(RunState::Stopping));
        assert!(RunState::Running.can_advance_to(RunState::Stopped));
        assert!(RunState::Stopping.can_advance_to(RunState::Stopped));
        assert!(!RunState::Stopping.can_advance_to(RunState::Running));
        assert!(!RunState::Stopped.can_advance_to(RunState::Stopping));
        assert!(!RunState::Stopped.can_advance_to(RunState::Stopped));
    }
}
