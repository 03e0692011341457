//! Confirmation gate
//!
//! Decides whether a step needs explicit human confirmation before it
//! runs, combining danger classification with the configured category
//! allow-list and a fixed token-estimate ceiling.

use crate::config::AutoExecutionConfig;
use crate::danger::{DangerCategory, DangerClassifier};
use crate::plan::PlanStep;

/// Token estimate above which a step always requires confirmation
pub const TOKEN_ESTIMATE_CONFIRMATION_THRESHOLD: u64 = 5_000;

/// Outcome of the confirmation gate for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationDecision {
    pub required: bool,
    /// Human-readable reasons for UI display; empty when not required
    pub reasons: Vec<String>,
}

impl ConfirmationDecision {
    pub fn not_required() -> Self {
        Self {
            required: false,
            reasons: Vec::new(),
        }
    }

    /// Reasons joined for the confirmation prompter
    pub fn reasons_joined(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Decision function combining the danger classifier with config thresholds
pub struct ConfirmationGate {
    classifier: DangerClassifier,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self {
            classifier: DangerClassifier::new(),
        }
    }

    /// Whether `step` requires explicit confirmation under `config`
    pub fn evaluate(&self, step: &PlanStep, config: &AutoExecutionConfig) -> ConfirmationDecision {
        let mut reasons = Vec::new();

        if config.pause_on_dangerous_actions {
            let matched = self.classifier.classify(&step.description);
            let mut gated: Vec<DangerCategory> = matched
                .intersection(&config.require_confirmation_for)
                .copied()
                .collect();
            gated.sort();

            for category in gated {
                reasons.push(format!("Dangerous action detected: {}", category.label()));
            }
        }

        if let Some(estimate) = step.estimated_tokens {
            if estimate > TOKEN_ESTIMATE_CONFIRMATION_THRESHOLD {
                reasons.push(format!(
                    "Estimated {} tokens exceeds the {} token confirmation threshold",
                    estimate, TOKEN_ESTIMATE_CONFIRMATION_THRESHOLD
                ));
            }
        }

        ConfirmationDecision {
            required: !reasons.is_empty(),
            reasons,
        }
    }
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}
