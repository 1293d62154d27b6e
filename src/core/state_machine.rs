//! State machine for the publish run
//!
//! `Idle → Dispatching → Awaiting → {Succeeded | Failed}`. Held in memory
//! only; a run is never resumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Orchestrator state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Dispatching,
    Awaiting,
    Succeeded,
    Failed,
}

impl RunState {
    fn can_transition_to(&self, to: RunState) -> bool {
        matches!(
            (self, to),
            (RunState::Idle, RunState::Dispatching)
                | (RunState::Dispatching, RunState::Awaiting)
                | (RunState::Awaiting, RunState::Succeeded)
                | (RunState::Awaiting, RunState::Failed)
        )
    }
}

/// Rejected state change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid run state transition: {from:?} → {to:?}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: RunState,
    pub to: RunState,
    pub timestamp: DateTime<Utc>,
}

/// Tracks the run through its states
#[derive(Debug)]
pub struct RunStateMachine {
    current_state: RunState,
    started_at: DateTime<Utc>,
    transitions: Vec<StateTransition>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: RunState::Idle,
            started_at: Utc::now(),
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state
    pub fn transition(&mut self, to: RunState) -> Result<(), InvalidTransition> {
        if !self.current_state.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.current_state,
                to,
            });
        }

        self.transitions.push(StateTransition {
            from: self.current_state,
            to,
            timestamp: Utc::now(),
        });
        self.current_state = to;

        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.current_state
    }

    /// Milliseconds between construction and the latest transition
    pub fn elapsed_ms(&self) -> i64 {
        self.transitions
            .last()
            .map(|t| (t.timestamp - self.started_at).num_milliseconds())
            .unwrap_or(0)
    }

    /// Get transition history as human-readable string
    pub fn history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| format!("{}: {:?} → {:?}", t.timestamp.to_rfc3339(), t.from, t.to))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_machine() {
        let state_machine = RunStateMachine::new();

        assert_eq!(state_machine.state(), RunState::Idle);
        assert!(state_machine.history().is_empty());
        assert_eq!(state_machine.elapsed_ms(), 0);
    }

    #[test]
    fn test_success_path() {
        let mut state_machine = RunStateMachine::new();

        state_machine.transition(RunState::Dispatching).unwrap();
        state_machine.transition(RunState::Awaiting).unwrap();
        state_machine.transition(RunState::Succeeded).unwrap();

        assert_eq!(state_machine.state(), RunState::Succeeded);
        assert_eq!(state_machine.history().lines().count(), 3);
    }

    #[test]
    fn test_failure_path() {
        let mut state_machine = RunStateMachine::new();

        state_machine.transition(RunState::Dispatching).unwrap();
        state_machine.transition(RunState::Awaiting).unwrap();
        state_machine.transition(RunState::Failed).unwrap();

        assert_eq!(state_machine.state(), RunState::Failed);
    }

    #[test]
    fn test_cannot_skip_awaiting() {
        let mut state_machine = RunStateMachine::new();
        state_machine.transition(RunState::Dispatching).unwrap();

        let err = state_machine.transition(RunState::Succeeded).unwrap_err();
        assert_eq!(err.from, RunState::Dispatching);
        assert_eq!(err.to, RunState::Succeeded);
        assert_eq!(state_machine.state(), RunState::Dispatching);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut state_machine = RunStateMachine::new();
        state_machine.transition(RunState::Dispatching).unwrap();
        state_machine.transition(RunState::Awaiting).unwrap();
        state_machine.transition(RunState::Failed).unwrap();

        assert!(state_machine.transition(RunState::Succeeded).is_err());
        assert!(state_machine.transition(RunState::Dispatching).is_err());
    }

    #[test]
    fn test_history() {
        let mut state_machine = RunStateMachine::new();
        state_machine.transition(RunState::Dispatching).unwrap();
        state_machine.transition(RunState::Awaiting).unwrap();

        let history = state_machine.history();
        assert!(history.contains("Idle → Dispatching"));
        assert!(history.contains("Dispatching → Awaiting"));
    }
}
