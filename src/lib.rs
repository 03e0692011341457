//! Sleipnir: autonomous multi-step plan execution engine
//!
//! Takes an approved, ordered sequence of plan steps and drives their
//! execution without per-step human approval, while enforcing safety
//! budgets (step count, token spend, consecutive-error thresholds),
//! supporting pause/resume/stop, and pausing automatically before steps
//! classified as dangerous.

pub mod config;
pub mod confirmation;
pub mod controller;
pub mod danger;
pub mod history;
pub mod plan;
pub mod state;

pub use config::{AutoExecutionConfig, ConfigError};
pub use confirmation::{
    ConfirmationDecision, ConfirmationGate, TOKEN_ESTIMATE_CONFIRMATION_THRESHOLD,
};
pub use controller::{
    AutoExecutionController, ConfirmationPrompter, ProgressObserver, StepExecutor, StepOutcome,
    STEP_TIMEOUT_ERROR,
};
pub use danger::{DangerCategory, DangerClassifier};
pub use history::{ExecutionHistoryEntry, ExecutionStatistics, StepRecordStatus};
pub use plan::{MemoryPlanStore, PlanStep, PlanStore, StepStatus};
pub use state::{AutoExecutionState, PauseReason};

use async_trait::async_trait;
use uuid::Uuid;

/// Always-approve prompter (for testing)
#[derive(Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPrompter for AutoApprove {
    async fn confirm(&self, _step: &PlanStep, _reasons: &str) -> bool {
        true
    }
}

/// Always-deny prompter (for testing)
#[derive(Clone, Copy)]
pub struct AutoDeny;

#[async_trait]
impl ConfirmationPrompter for AutoDeny {
    async fn confirm(&self, _step: &PlanStep, _reasons: &str) -> bool {
        false
    }
}

/// No-op progress observer (for testing)
#[derive(Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_transition(&self, _state: &AutoExecutionState, _current_step: Option<&PlanStep>) {}
}

/// Generate a unique run identifier
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}
