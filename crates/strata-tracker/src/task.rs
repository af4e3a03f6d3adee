//! Worker task status: a strict started-then-finished state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::summary::RecordsProcessedSummary;

/// Terminal details for a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFinished {
    /// When the task finished.
    pub finish_time: DateTime<Utc>,
    /// How many job runs the task executed.
    pub job_runs: usize,
    /// Total records read across all job runs.
    pub records_read: u64,
    /// Total records written across all job runs.
    pub records_written: u64,
}

impl TaskFinished {
    /// Aggregates per-job summaries into task totals.
    #[must_use]
    pub fn from_job_summaries(
        finish_time: DateTime<Utc>,
        summaries: &[RecordsProcessedSummary],
    ) -> Self {
        Self {
            finish_time,
            job_runs: summaries.len(),
            records_read: summaries.iter().map(|s| s.records_read).sum(),
            records_written: summaries.iter().map(|s| s.records_written).sum(),
        }
    }
}

/// The status of one worker task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// The task id.
    pub task_id: String,
    /// When the task started.
    pub started_time: DateTime<Utc>,
    /// Terminal details; `None` while the task runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<TaskFinished>,
}

impl TaskStatus {
    /// Creates a started, unfinished task status.
    #[must_use]
    pub fn started(task_id: impl Into<String>, started_time: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            started_time,
            finished: None,
        }
    }

    /// Returns true if the task has no terminal event.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        self.finished.is_none()
    }
}
