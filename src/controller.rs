//! Execution controller
//!
//! The state machine driving one plan: select the lowest-indexed pending
//! step, run the confirmation gate, execute with a timeout race, account
//! for the result, notify the observer, and loop until a termination or
//! pause condition fires.
//!
//! Public control methods never return errors and never panic; all
//! failure information surfaces through the state snapshot and the
//! per-run history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AutoExecutionConfig;
use crate::confirmation::ConfirmationGate;
use crate::history::{ExecutionHistoryEntry, ExecutionStatistics, StepRecordStatus};
use crate::plan::{PlanStep, PlanStore};
use crate::state::{AutoExecutionState, PauseReason};

/// Error message synthesized when the timeout race wins
pub const STEP_TIMEOUT_ERROR: &str = "Step execution timeout";

/// Result of one step execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub success: bool,
    pub tokens_used: u64,
    pub error: Option<String>,
}

impl StepOutcome {
    /// Successful attempt consuming `tokens_used` tokens
    pub fn succeeded(tokens_used: u64) -> Self {
        Self {
            success: true,
            tokens_used,
            error: None,
        }
    }

    /// Expected failure with an error message
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tokens_used: 0,
            error: Some(error.into()),
        }
    }
}

/// Performs the work for one plan step
///
/// The controller treats this as an opaque, potentially slow, potentially
/// failing operation.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute one step.
    ///
    /// Expected failures are reported as `StepOutcome { success: false, .. }`;
    /// `Err` is reserved for harness breakage and ends the run immediately.
    /// `cancel` fires when the controller stops waiting (timeout race lost);
    /// work the executor spawned should stand down when it does.
    async fn execute(
        &self,
        step: &PlanStep,
        index: usize,
        cancel: CancellationToken,
    ) -> anyhow::Result<StepOutcome>;
}

/// Requests user approval for a gated step
///
/// Invoked only when the confirmation gate requires it. The controller
/// blocks the run until the prompter resolves.
#[async_trait]
pub trait ConfirmationPrompter: Send + Sync {
    /// `reasons` is the gate's reason list joined by "; ".
    /// Returns true if the user approves, false if denied.
    async fn confirm(&self, step: &PlanStep, reasons: &str) -> bool;
}

/// Receives a state snapshot after every transition
///
/// Synchronous and fire-and-forget: never awaited, must not block, must
/// not panic.
pub trait ProgressObserver: Send + Sync {
    fn on_transition(&self, state: &AutoExecutionState, current_step: Option<&PlanStep>);
}

enum StepDisposition {
    Continue,
    Halt,
}

/// Autonomous execution controller
///
/// Owns run state, config, and history; constructed once per active plan
/// and shared by reference with whatever UI layer needs it. Exactly one
/// control loop runs at a time, enforced by an internal guard.
pub struct AutoExecutionController {
    plan: Arc<dyn PlanStore>,
    executor: Arc<dyn StepExecutor>,
    prompter: Option<Arc<dyn ConfirmationPrompter>>,
    observer: Option<Arc<dyn ProgressObserver>>,
    gate: ConfirmationGate,
    config: RwLock<AutoExecutionConfig>,
    state: RwLock<AutoExecutionState>,
    history: RwLock<Vec<ExecutionHistoryEntry>>,
    run_id: RwLock<Option<String>>,
    loop_active: AtomicBool,
}

impl AutoExecutionController {
    /// Create a controller over an approved plan store and step executor
    pub fn new(
        plan: Arc<dyn PlanStore>,
        executor: Arc<dyn StepExecutor>,
        config: AutoExecutionConfig,
    ) -> Self {
        Self {
            plan,
            executor,
            prompter: None,
            observer: None,
            gate: ConfirmationGate::new(),
            config: RwLock::new(config),
            state: RwLock::new(AutoExecutionState::default()),
            history: RwLock::new(Vec::new()),
            run_id: RwLock::new(None),
            loop_active: AtomicBool::new(false),
        }
    }

    /// Attach a confirmation prompter
    ///
    /// Without one, steps that require confirmation pause the run.
    pub fn with_prompter(mut self, prompter: Arc<dyn ConfirmationPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Attach a progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    // --- control methods ---

    /// Begin a fresh run over the approved plan
    ///
    /// Zeroes counters and history, then drives the control loop until a
    /// termination or pause condition fires. Ignored (with a warning) when
    /// no approved plan exists or a run is already in progress.
    pub async fn start(&self) {
        if self.loop_active.load(Ordering::Acquire) {
            warn!("start() ignored: a run is already in progress");
            return;
        }
        if !self.plan.is_approved() {
            warn!("start() ignored: no approved plan");
            return;
        }

        {
            let mut state = self.state.write().await;
            *state = AutoExecutionState {
                is_auto_executing: true,
                ..AutoExecutionState::default()
            };
        }
        self.history.write().await.clear();

        let run_id = crate::generate_run_id();
        info!(%run_id, "starting autonomous execution");
        *self.run_id.write().await = Some(run_id);

        self.notify(None).await;
        self.run_loop().await;
    }

    /// Suspend the run at the next loop evaluation
    pub async fn pause(&self) {
        self.pause_with(PauseReason::UserRequested).await;
    }

    /// Suspend the run with an explicit reason
    ///
    /// Run-ending reasons (`plan_complete`, `max_steps_reached`,
    /// `token_budget_reached`) also deactivate the run. Safe to call at
    /// any time; with no step in flight it simply prevents the next loop
    /// iteration from proceeding.
    pub async fn pause_with(&self, reason: PauseReason) {
        {
            let mut state = self.state.write().await;
            state.is_paused = true;
            state.pause_reason = Some(reason);
            if reason.ends_run() {
                state.is_auto_executing = false;
            }
        }
        info!(%reason, "execution paused");
        self.notify(None).await;
    }

    /// Resume a paused run
    ///
    /// No-op (with a warning) when not paused. A fully ended run is
    /// reactivated; the loop re-selects the lowest-indexed pending step.
    pub async fn resume(&self) {
        {
            let mut state = self.state.write().await;
            if !state.is_paused {
                warn!("resume() ignored: not paused");
                return;
            }
            state.is_paused = false;
            state.pause_reason = None;
            state.is_auto_executing = true;
        }
        info!("resuming autonomous execution");
        self.notify(None).await;
        self.run_loop().await;
    }

    /// End the run, preserving cumulative counters for reporting
    ///
    /// Cooperative: an in-flight step finishes its race first; the loop
    /// then exits before scheduling another step.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            state.is_auto_executing = false;
            state.is_paused = false;
            state.pause_reason = None;
            state.consecutive_errors = 0;
            state.last_error = None;
            state.current_step_start_time = None;
        }
        info!("autonomous execution stopped");
        self.notify(None).await;
    }

    /// Zero every counter and clear history, for switching plans
    pub async fn reset(&self) {
        *self.state.write().await = AutoExecutionState::default();
        self.history.write().await.clear();
        *self.run_id.write().await = None;
        debug!("controller state reset");
        self.notify(None).await;
    }

    // --- configuration ---

    /// Replace the whole configuration; takes effect at the next loop
    /// evaluation, never retroactively
    pub async fn update_config(&self, config: AutoExecutionConfig) {
        *self.config.write().await = config;
    }

    /// Set the per-run step ceiling
    pub async fn set_max_steps(&self, max_steps: u32) {
        self.config.write().await.max_steps = max_steps;
    }

    /// Set the cumulative token budget
    pub async fn set_token_budget(&self, max_total_tokens: u64) {
        self.config.write().await.max_total_tokens = max_total_tokens;
    }

    /// Auto-approve dangerous actions (inverse of
    /// `pause_on_dangerous_actions`)
    pub async fn set_auto_approve(&self, auto_approve: bool) {
        self.config.write().await.pause_on_dangerous_actions = !auto_approve;
    }

    // --- read access ---

    /// Snapshot of the run state
    pub async fn state(&self) -> AutoExecutionState {
        self.state.read().await.clone()
    }

    /// Snapshot of the per-run history
    pub async fn history(&self) -> Vec<ExecutionHistoryEntry> {
        self.history.read().await.clone()
    }

    /// Aggregate statistics over the current run's history
    pub async fn statistics(&self) -> ExecutionStatistics {
        ExecutionStatistics::from_entries(&self.history.read().await)
    }

    /// Snapshot of the configuration
    pub async fn config(&self) -> AutoExecutionConfig {
        self.config.read().await.clone()
    }

    /// Identifier of the current run, if one has started
    pub async fn run_id(&self) -> Option<String> {
        self.run_id.read().await.clone()
    }

    // --- control loop ---

    async fn run_loop(&self) {
        if self
            .loop_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("control loop already active");
            return;
        }

        loop {
            let snapshot = self.state.read().await.clone();
            if !snapshot.is_auto_executing || snapshot.is_paused || !self.plan.is_approved() {
                break;
            }

            let config = self.config.read().await.clone();
            if snapshot.steps_executed >= config.max_steps {
                self.suspend(PauseReason::MaxStepsReached, true).await;
                break;
            }
            if snapshot.total_tokens_used >= config.max_total_tokens {
                self.suspend(PauseReason::TokenBudgetReached, true).await;
                break;
            }
            let Some((index, step)) = self.plan.next_pending() else {
                self.suspend(PauseReason::PlanComplete, true).await;
                break;
            };

            let decision = self.gate.evaluate(&step, &config);
            if decision.required {
                let approved = match &self.prompter {
                    Some(prompter) => prompter.confirm(&step, &decision.reasons_joined()).await,
                    None => {
                        warn!(
                            step_id = %step.id,
                            "confirmation required but no prompter registered"
                        );
                        false
                    }
                };
                if !approved {
                    info!(
                        step_id = %step.id,
                        reasons = %decision.reasons_joined(),
                        "confirmation declined, pausing"
                    );
                    self.suspend(PauseReason::DangerousAction, false).await;
                    break;
                }
            }

            match self.execute_step(index, step).await {
                StepDisposition::Continue => {}
                StepDisposition::Halt => break,
            }
        }

        self.loop_active.store(false, Ordering::Release);
    }

    async fn execute_step(&self, index: usize, step: PlanStep) -> StepDisposition {
        // The store may have been mutated externally between selection and
        // execution (manual skip); re-check before claiming the step.
        if !self.plan.mark_started(&step.id) {
            debug!(step_id = %step.id, "selected step no longer pending, reselecting");
            return StepDisposition::Continue;
        }

        {
            let mut state = self.state.write().await;
            state.current_step_start_time = Some(Utc::now());
        }
        let entry_index = {
            let mut history = self.history.write().await;
            history.push(ExecutionHistoryEntry::running(&step.id, index, &step.title));
            history.len() - 1
        };
        self.notify(Some(&step)).await;

        let timeout = self.config.read().await.step_timeout();
        let cancel = CancellationToken::new();
        info!(step_id = %step.id, index, "executing step");

        let raced = tokio::time::timeout(
            timeout,
            self.executor.execute(&step, index, cancel.child_token()),
        )
        .await;

        let outcome = match raced {
            Ok(outcome) => outcome,
            Err(_) => {
                // The timer won: the executor future is dropped and any
                // work it spawned is told to stand down. Its result can no
                // longer affect state.
                cancel.cancel();
                warn!(
                    step_id = %step.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "step timed out"
                );
                Ok(StepOutcome::failed(STEP_TIMEOUT_ERROR))
            }
        };

        match outcome {
            Ok(outcome) if outcome.success => {
                self.plan.mark_completed(&step.id, outcome.tokens_used);
                {
                    let mut state = self.state.write().await;
                    state.steps_executed += 1;
                    state.total_tokens_used += outcome.tokens_used;
                    state.consecutive_errors = 0;
                    state.last_error = None;
                    state.current_step_start_time = None;
                }
                self.finish_entry(entry_index, StepRecordStatus::Success, outcome.tokens_used, None)
                    .await;
                info!(step_id = %step.id, tokens = outcome.tokens_used, "step complete");
                self.notify(Some(&step)).await;
                StepDisposition::Continue
            }
            Ok(outcome) => {
                let message = outcome
                    .error
                    .unwrap_or_else(|| "step failed without an error message".to_string());
                let threshold_hit = self.record_failure(&step, &message).await;
                self.finish_entry(
                    entry_index,
                    StepRecordStatus::Error,
                    outcome.tokens_used,
                    Some(&message),
                )
                .await;

                if threshold_hit {
                    warn!(step_id = %step.id, error = %message, "error threshold reached");
                    self.suspend(PauseReason::ErrorThreshold, true).await;
                    StepDisposition::Halt
                } else {
                    warn!(step_id = %step.id, error = %message, "step failed, continuing");
                    self.notify(Some(&step)).await;
                    StepDisposition::Continue
                }
            }
            Err(error) => {
                // The executor harness itself broke, not the step's work.
                // Maximally severe: end the run regardless of the threshold.
                let message = error.to_string();
                self.record_failure(&step, &message).await;
                self.finish_entry(entry_index, StepRecordStatus::Error, 0, Some(&message))
                    .await;
                warn!(step_id = %step.id, error = %message, "unexpected executor error, ending run");
                self.suspend(PauseReason::ErrorThreshold, true).await;
                StepDisposition::Halt
            }
        }
    }

    /// Record a step failure; returns true when the consecutive-error
    /// threshold has been reached
    async fn record_failure(&self, step: &PlanStep, message: &str) -> bool {
        self.plan.mark_failed(&step.id, message);

        let threshold = self.config.read().await.error_threshold;
        let mut state = self.state.write().await;
        state.consecutive_errors += 1;
        state.last_error = Some(message.to_string());
        state.current_step_start_time = None;
        state.consecutive_errors >= threshold
    }

    async fn suspend(&self, reason: PauseReason, ends_run: bool) {
        {
            let mut state = self.state.write().await;
            state.is_paused = true;
            state.pause_reason = Some(reason);
            if ends_run {
                state.is_auto_executing = false;
            }
        }
        info!(%reason, ends_run, "run suspended");
        self.notify(None).await;
    }

    async fn finish_entry(
        &self,
        index: usize,
        status: StepRecordStatus,
        tokens_used: u64,
        error: Option<&str>,
    ) {
        let mut history = self.history.write().await;
        if let Some(entry) = history.get_mut(index) {
            entry.end_time = Some(Utc::now());
            entry.status = status;
            entry.tokens_used = tokens_used;
            entry.error = error.map(str::to_string);
        }
    }

    async fn notify(&self, current_step: Option<&PlanStep>) {
        if let Some(observer) = &self.observer {
            let snapshot = self.state.read().await.clone();
            observer.on_transition(&snapshot, current_step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{MemoryPlanStore, StepStatus};

    struct FixedExecutor {
        tokens: u64,
    }

    #[async_trait]
    impl StepExecutor for FixedExecutor {
        async fn execute(
            &self,
            _step: &PlanStep,
            _index: usize,
            _cancel: CancellationToken,
        ) -> anyhow::Result<StepOutcome> {
            Ok(StepOutcome::succeeded(self.tokens))
        }
    }

    fn plan_steps(n: usize) -> Vec<PlanStep> {
        (0..n)
            .map(|i| PlanStep::new(format!("s{i}"), format!("Step {i}"), "tidy the docs"))
            .collect()
    }

    fn controller_over(
        store: Arc<MemoryPlanStore>,
        config: AutoExecutionConfig,
    ) -> AutoExecutionController {
        AutoExecutionController::new(store, Arc::new(FixedExecutor { tokens: 10 }), config)
    }

    #[tokio::test]
    async fn test_start_without_approved_plan_is_noop() {
        let store = Arc::new(MemoryPlanStore::new(plan_steps(2)));
        let controller = controller_over(store.clone(), AutoExecutionConfig::default());

        controller.start().await;

        let state = controller.state().await;
        assert!(state.is_idle());
        assert!(controller.run_id().await.is_none());
        assert_eq!(store.step("s0").unwrap().status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_run_completes_plan_and_marks_steps() {
        let store = Arc::new(MemoryPlanStore::approved(plan_steps(3)));
        let controller = controller_over(store.clone(), AutoExecutionConfig::default());

        controller.start().await;

        let state = controller.state().await;
        assert!(!state.is_auto_executing);
        assert!(state.is_paused);
        assert_eq!(state.pause_reason, Some(PauseReason::PlanComplete));
        assert_eq!(state.steps_executed, 3);
        assert_eq!(state.total_tokens_used, 30);
        assert!(controller.run_id().await.is_some());

        for step in store.steps() {
            assert_eq!(step.status, StepStatus::Complete);
            assert_eq!(step.actual_tokens, Some(10));
        }
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let store = Arc::new(MemoryPlanStore::approved(plan_steps(1)));
        let controller = controller_over(store, AutoExecutionConfig::default());

        controller.pause().await;
        let once = controller.state().await;
        controller.pause().await;
        let twice = controller.state().await;

        assert_eq!(once, twice);
        assert!(twice.is_paused);
        assert_eq!(twice.pause_reason, Some(PauseReason::UserRequested));
    }

    #[tokio::test]
    async fn test_resume_ignored_when_not_paused() {
        let store = Arc::new(MemoryPlanStore::approved(plan_steps(1)));
        let controller = controller_over(store, AutoExecutionConfig::default());

        let before = controller.state().await;
        controller.resume().await;
        let after = controller.state().await;

        assert_eq!(before, after);
        assert!(after.is_idle());
    }

    #[tokio::test]
    async fn test_stop_preserves_cumulative_counters() {
        let store = Arc::new(MemoryPlanStore::approved(plan_steps(2)));
        let controller = controller_over(store, AutoExecutionConfig::default());

        controller.start().await;
        controller.stop().await;

        let state = controller.state().await;
        assert!(!state.is_auto_executing);
        assert!(!state.is_paused);
        assert!(state.pause_reason.is_none());
        assert!(state.last_error.is_none());
        assert_eq!(state.consecutive_errors, 0);
        // Preserved for final reporting until reset()
        assert_eq!(state.steps_executed, 2);
        assert_eq!(state.total_tokens_used, 20);
    }

    #[tokio::test]
    async fn test_reset_zeroes_everything() {
        let store = Arc::new(MemoryPlanStore::approved(plan_steps(2)));
        let controller = controller_over(store, AutoExecutionConfig::default());

        controller.start().await;
        controller.reset().await;

        assert_eq!(controller.state().await, AutoExecutionState::default());
        assert!(controller.history().await.is_empty());
        assert!(controller.run_id().await.is_none());
    }

    #[tokio::test]
    async fn test_set_auto_approve_inverts_master_switch() {
        let store = Arc::new(MemoryPlanStore::approved(plan_steps(1)));
        let controller = controller_over(store, AutoExecutionConfig::default());

        controller.set_auto_approve(true).await;
        assert!(!controller.config().await.pause_on_dangerous_actions);

        controller.set_auto_approve(false).await;
        assert!(controller.config().await.pause_on_dangerous_actions);
    }

    #[tokio::test]
    async fn test_config_mutators_replace_fields() {
        let store = Arc::new(MemoryPlanStore::approved(plan_steps(1)));
        let controller = controller_over(store, AutoExecutionConfig::default());

        controller.set_max_steps(42).await;
        controller.set_token_budget(9_000).await;

        let config = controller.config().await;
        assert_eq!(config.max_steps, 42);
        assert_eq!(config.max_total_tokens, 9_000);
    }
}
