//! Controller-owned run state
//!
//! One `AutoExecutionState` snapshot describes the whole state machine:
//! Idle (`is_auto_executing == false`), Running, or Paused. The controller
//! is the only writer; everything else reads snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a run was suspended or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Explicit pause() from the caller
    UserRequested,
    /// Cumulative token budget reached
    TokenBudgetReached,
    /// Step-count ceiling reached
    MaxStepsReached,
    /// Too many consecutive step failures
    ErrorThreshold,
    /// Reserved for distinct timeout handling; timeouts currently fold
    /// into the generic failure path
    StepTimeout,
    /// Dangerous action detected and not confirmed
    DangerousAction,
    /// No pending steps remain
    PlanComplete,
}

impl PauseReason {
    /// Whether this reason ends the run when passed to `pause_with`
    /// (as opposed to a true, resumable suspension)
    pub fn ends_run(&self) -> bool {
        matches!(
            self,
            PauseReason::PlanComplete
                | PauseReason::MaxStepsReached
                | PauseReason::TokenBudgetReached
        )
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::UserRequested => write!(f, "paused by user"),
            PauseReason::TokenBudgetReached => write!(f, "token budget reached"),
            PauseReason::MaxStepsReached => write!(f, "maximum step count reached"),
            PauseReason::ErrorThreshold => write!(f, "consecutive error threshold reached"),
            PauseReason::StepTimeout => write!(f, "step execution timed out"),
            PauseReason::DangerousAction => write!(f, "dangerous action requires confirmation"),
            PauseReason::PlanComplete => write!(f, "plan complete"),
        }
    }
}

/// Snapshot of the execution controller's run state
///
/// Created fresh (zeroed) at `start()`; persists across pause/resume
/// within one continuous run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoExecutionState {
    /// Run is active (may be paused)
    pub is_auto_executing: bool,

    /// Run is active but not currently advancing
    pub is_paused: bool,

    /// Set only while a step is in flight
    pub current_step_start_time: Option<DateTime<Utc>>,

    /// Tokens consumed by completed steps this run
    pub total_tokens_used: u64,

    /// Steps completed this run
    pub steps_executed: u32,

    /// Failures since the last success
    pub consecutive_errors: u32,

    /// Most recent step failure message
    pub last_error: Option<String>,

    /// Why the run is suspended, when it is
    pub pause_reason: Option<PauseReason>,
}

impl AutoExecutionState {
    /// True when no run is active at all
    pub fn is_idle(&self) -> bool {
        !self.is_auto_executing && !self.is_paused
    }

    /// True when a run is active and advancing
    pub fn is_running(&self) -> bool {
        self.is_auto_executing && !self.is_paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let state = AutoExecutionState::default();
        assert!(state.is_idle());
        assert!(!state.is_running());
        assert_eq!(state.steps_executed, 0);
        assert_eq!(state.total_tokens_used, 0);
        assert_eq!(state.consecutive_errors, 0);
        assert!(state.last_error.is_none());
        assert!(state.pause_reason.is_none());
        assert!(state.current_step_start_time.is_none());
    }

    #[test]
    fn test_run_ending_reasons() {
        assert!(PauseReason::PlanComplete.ends_run());
        assert!(PauseReason::MaxStepsReached.ends_run());
        assert!(PauseReason::TokenBudgetReached.ends_run());

        assert!(!PauseReason::UserRequested.ends_run());
        assert!(!PauseReason::DangerousAction.ends_run());
        assert!(!PauseReason::ErrorThreshold.ends_run());
        assert!(!PauseReason::StepTimeout.ends_run());
    }

    #[test]
    fn test_pause_reason_serializes_snake_case() {
        let json = serde_json::to_string(&PauseReason::TokenBudgetReached).unwrap();
        assert_eq!(json, "\"token_budget_reached\"");

        let back: PauseReason = serde_json::from_str("\"dangerous_action\"").unwrap();
        assert_eq!(back, PauseReason::DangerousAction);
    }

    #[test]
    fn test_pause_reason_display() {
        assert_eq!(PauseReason::PlanComplete.to_string(), "plan complete");
        assert_eq!(
            PauseReason::ErrorThreshold.to_string(),
            "consecutive error threshold reached"
        );
    }
}
