//! Per-run execution history
//!
//! One entry per step attempt, appended when the step starts and finished
//! in place (index lookup-and-replace) when it resolves. The history is
//! cleared at `start()` and `reset()`, never persisted across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one recorded step attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepRecordStatus {
    Running,
    Success,
    Error,
    Skipped,
    Paused,
}

/// One step attempt in the per-run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    pub step_id: String,
    pub step_index: usize,
    pub title: String,
    pub start_time: DateTime<Utc>,
    /// None while the attempt is still running
    pub end_time: Option<DateTime<Utc>>,
    pub tokens_used: u64,
    pub status: StepRecordStatus,
    pub error: Option<String>,
}

impl ExecutionHistoryEntry {
    /// Create a running entry for a step attempt starting now
    pub fn running(step_id: impl Into<String>, step_index: usize, title: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            step_index,
            title: title.into(),
            start_time: Utc::now(),
            end_time: None,
            tokens_used: 0,
            status: StepRecordStatus::Running,
            error: None,
        }
    }

    /// Attempt duration, if the entry has finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// Aggregate statistics over one run's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExecutionStatistics {
    /// Finished attempts (running entries excluded)
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    /// successes / attempts, 0.0 when nothing finished
    pub success_rate: f64,
    /// Mean duration of finished attempts in milliseconds
    pub average_duration_ms: f64,
    /// Tokens recorded across all attempts
    pub total_tokens: u64,
}

impl ExecutionStatistics {
    pub fn from_entries(entries: &[ExecutionHistoryEntry]) -> Self {
        let finished: Vec<&ExecutionHistoryEntry> =
            entries.iter().filter(|e| e.end_time.is_some()).collect();

        let successes = finished
            .iter()
            .filter(|e| e.status == StepRecordStatus::Success)
            .count();
        let failures = finished
            .iter()
            .filter(|e| e.status == StepRecordStatus::Error)
            .count();

        let attempts = finished.len();
        let success_rate = if attempts > 0 {
            successes as f64 / attempts as f64
        } else {
            0.0
        };

        let total_duration: i64 = finished.iter().filter_map(|e| e.duration_ms()).sum();
        let average_duration_ms = if attempts > 0 {
            total_duration as f64 / attempts as f64
        } else {
            0.0
        };

        let total_tokens = entries.iter().map(|e| e.tokens_used).sum();

        Self {
            attempts,
            successes,
            failures,
            success_rate,
            average_duration_ms,
            total_tokens,
        }
    }
}
