//! Safety configuration for autonomous execution
//!
//! Defines the budgets and gates that bound one continuous run:
//! - Step-count ceiling (runaway plans)
//! - Cumulative token budget (cost overruns)
//! - Consecutive-error threshold (broken executors)
//! - Per-step wall-clock timeout (hung executors)
//! - Dangerous-action confirmation gating

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::danger::DangerCategory;

/// Configuration for one autonomous run
///
/// Persists across runs until explicitly updated. All limits are failsafe:
/// when exceeded, the run pauses with an inspectable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoExecutionConfig {
    /// Hard ceiling on steps executed in one continuous run
    pub max_steps: u32,

    /// Cumulative token budget for the run
    pub max_total_tokens: u64,

    /// Master switch for the dangerous-action confirmation gate
    pub pause_on_dangerous_actions: bool,

    /// Consecutive step failures that force a pause
    pub error_threshold: u32,

    /// Wall-clock limit per step execution, in milliseconds
    pub step_timeout_ms: u64,

    /// Detected categories that actually trigger confirmation
    /// (others are merely logged)
    pub require_confirmation_for: HashSet<DangerCategory>,
}

impl Default for AutoExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_total_tokens: 100_000,
            pause_on_dangerous_actions: true,
            error_threshold: 3,
            step_timeout_ms: 120_000, // 2 minutes
            require_confirmation_for: DangerCategory::ALL.into_iter().collect(),
        }
    }
}

impl AutoExecutionConfig {
    /// Per-step timeout as a `Duration`
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Restrictive configuration for safety-critical contexts
    pub fn restrictive() -> Self {
        Self {
            max_steps: 3,
            max_total_tokens: 20_000,
            pause_on_dangerous_actions: true,
            error_threshold: 1,
            step_timeout_ms: 30_000, // 30 seconds
            require_confirmation_for: DangerCategory::ALL.into_iter().collect(),
        }
    }

    /// Validate that configuration values are in acceptable range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        if self.error_threshold == 0 {
            return Err(ConfigError::ZeroErrorThreshold);
        }
        if self.step_timeout_ms == 0 {
            return Err(ConfigError::ZeroStepTimeout);
        }
        Ok(())
    }
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_steps must be at least 1")]
    ZeroMaxSteps,

    #[error("error_threshold must be at least 1")]
    ZeroErrorThreshold,

    #[error("step_timeout_ms must be greater than 0")]
    ZeroStepTimeout,
}
