//! Plan data model and the store boundary the engine executes against
//!
//! The plan store is the single source of truth for step state. The engine
//! only reads "next pending step" and writes status transitions; plan
//! CRUD, approval UI and rendering live outside this crate.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Status of a single plan step
///
/// Exactly one step may be `InProgress` at a time across the whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
    Skipped,
}

/// Single step in an approved plan
///
/// `description` is the only field the danger classifier inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique step identifier
    pub id: String,

    /// Short human-readable title
    pub title: String,

    /// Full description of the work (danger classification input)
    pub description: String,

    /// Current status
    pub status: StepStatus,

    /// Token estimate for budgeting and confirmation gating
    pub estimated_tokens: Option<u64>,

    /// Actual tokens consumed, populated on completion
    pub actual_tokens: Option<u64>,

    /// Failure message, populated when the step fails
    pub error: Option<String>,
}

impl PlanStep {
    /// Create a pending step
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: StepStatus::Pending,
            estimated_tokens: None,
            actual_tokens: None,
            error: None,
        }
    }

    /// Attach a token estimate
    pub fn with_estimate(mut self, tokens: u64) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }
}

/// Read/mutate access to the plan backing a run
///
/// External UI code may mutate the store concurrently (e.g. a manual
/// skip), so the engine re-checks `mark_started` before executing a step
/// it selected.
pub trait PlanStore: Send + Sync {
    /// Whether an approved plan is loaded
    fn is_approved(&self) -> bool;

    /// Lowest-indexed pending step, with its index
    fn next_pending(&self) -> Option<(usize, PlanStep)>;

    /// Transition a step to in-progress
    ///
    /// Returns false if the step is no longer pending (skipped or removed
    /// between selection and execution).
    fn mark_started(&self, step_id: &str) -> bool;

    /// Transition a step to complete, recording actual token usage
    fn mark_completed(&self, step_id: &str, actual_tokens: u64);

    /// Transition a step to failed with an error message
    fn mark_failed(&self, step_id: &str, error: &str);
}

/// In-memory plan store with an approval workflow
///
/// Reference implementation used by tests and single-process embedders.
pub struct MemoryPlanStore {
    inner: RwLock<PlanInner>,
}

struct PlanInner {
    steps: Vec<PlanStep>,
    approved: bool,
}

impl MemoryPlanStore {
    /// Create a store holding an unapproved plan
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            inner: RwLock::new(PlanInner {
                steps,
                approved: false,
            }),
        }
    }

    /// Create a store holding an already approved plan
    pub fn approved(steps: Vec<PlanStep>) -> Self {
        let store = Self::new(steps);
        store.approve();
        store
    }

    /// Approve the plan for execution
    pub fn approve(&self) {
        self.inner.write().expect("plan store lock").approved = true;
    }

    /// Reject the plan, blocking execution
    pub fn reject(&self) {
        self.inner.write().expect("plan store lock").approved = false;
    }

    /// Snapshot of all steps
    pub fn steps(&self) -> Vec<PlanStep> {
        self.inner.read().expect("plan store lock").steps.clone()
    }

    /// Snapshot of a single step by id
    pub fn step(&self, step_id: &str) -> Option<PlanStep> {
        self.inner
            .read()
            .expect("plan store lock")
            .steps
            .iter()
            .find(|s| s.id == step_id)
            .cloned()
    }

    /// Skip a pending step (external mutator, e.g. from UI)
    pub fn skip(&self, step_id: &str) {
        let mut inner = self.inner.write().expect("plan store lock");
        if let Some(step) = inner.steps.iter_mut().find(|s| s.id == step_id) {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Skipped;
            }
        }
    }
}

impl PlanStore for MemoryPlanStore {
    fn is_approved(&self) -> bool {
        let inner = self.inner.read().expect("plan store lock");
        inner.approved && !inner.steps.is_empty()
    }

    fn next_pending(&self) -> Option<(usize, PlanStep)> {
        self.inner
            .read()
            .expect("plan store lock")
            .steps
            .iter()
            .enumerate()
            .find(|(_, s)| s.status == StepStatus::Pending)
            .map(|(i, s)| (i, s.clone()))
    }

    fn mark_started(&self, step_id: &str) -> bool {
        let mut inner = self.inner.write().expect("plan store lock");
        match inner.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) if step.status == StepStatus::Pending => {
                step.status = StepStatus::InProgress;
                true
            }
            _ => false,
        }
    }

    fn mark_completed(&self, step_id: &str, actual_tokens: u64) {
        let mut inner = self.inner.write().expect("plan store lock");
        if let Some(step) = inner.steps.iter_mut().find(|s| s.id == step_id) {
            step.status = StepStatus::Complete;
            step.actual_tokens = Some(actual_tokens);
            step.error = None;
        }
    }

    fn mark_failed(&self, step_id: &str, error: &str) {
        let mut inner = self.inner.write().expect("plan store lock");
        if let Some(step) = inner.steps.iter_mut().find(|s| s.id == step_id) {
            step.status = StepStatus::Failed;
            step.error = Some(error.to_string());
        }
    }
}
