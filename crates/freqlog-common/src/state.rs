//! Run state machine for an acquisition run.
//!
//! NOT_STARTED → RUNNING → { COMPLETED | INTERRUPTED | FAILED }
//!
//! An interrupt or failure may also end a run before its first cycle.

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Instrument is open, no cycle has begun.
    #[default]
    NotStarted,
    /// Cycles are executing.
    Running,
    /// All configured cycles finished.
    Completed,
    /// Stopped by an interrupt signal.
    Interrupted,
    /// Stopped by an unrecovered error.
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Interrupted => write!(f, "INTERRUPTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl RunState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: RunState) -> bool {
        use RunState::{Completed, Failed, Interrupted, NotStarted, Running};

        matches!(
            (self, target),
            (NotStarted, Running)
                | (NotStarted, Interrupted)
                | (NotStarted, Failed)
                | (Running, Completed)
                | (Running, Interrupted)
                | (Running, Failed)
        )
    }

    /// Returns true once the run can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }

    /// Whether this terminal state maps to a successful process exit.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }
}

/// State machine wrapper with transition history tracking.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: RunState,
    previous: Option<RunState>,
    transition_count: u64,
}

impl StateMachine {
    /// Create a new state machine in NOT_STARTED.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.current
    }

    /// Get the previous state, if any transition occurred.
    #[must_use]
    pub fn previous_state(&self) -> Option<RunState> {
        self.previous
    }

    /// Get total number of transitions.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt a state transition.
    pub fn transition(&mut self, target: RunState) -> Result<(), StateError> {
        if self.current.can_transition_to(target) {
            self.previous = Some(self.current);
            self.current = target;
            self.transition_count += 1;
            Ok(())
        } else {
            Err(StateError {
                from: self.current.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Move to FAILED unless the run already ended.
    pub fn enter_failed(&mut self) {
        if self.current.can_transition_to(RunState::Failed) {
            self.previous = Some(self.current);
            self.current = RunState::Failed;
            self.transition_count += 1;
        }
    }
}
