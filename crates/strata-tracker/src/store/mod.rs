//! Pluggable storage for job and task status.
//!
//! Both stores are append-only from the writer's perspective; every read
//! is derived from the full update history, never from a mutated summary
//! row. Trackers are intentionally independent of the state store: a job
//! that fails its state-store commit still gets a terminal status event.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::job::{JobCreated, JobStatus};
use crate::summary::RecordsProcessedSummary;
use crate::task::TaskStatus;

/// Append-only store of job status updates.
///
/// ## Sequencing
///
/// `job_started` requires a prior `job_created`; `job_finished` requires
/// an open run started by the same task. Re-runs are legal: each
/// `job_started` opens a fresh run, and an earlier run left open by a dead
/// task stays open in the history.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Records that a job was created.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TrackerError::JobLifecycleViolation`] if the job
    /// was already created.
    async fn job_created(&self, job: JobCreated) -> Result<()>;

    /// Records that a task started running a job.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TrackerError::JobLifecycleViolation`] if the job
    /// has no creation record.
    async fn job_started(
        &self,
        job_id: &str,
        task_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<()>;

    /// Records a terminal event for a job run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TrackerError::JobLifecycleViolation`] if no open
    /// run exists for `task_id` - each run finishes at most once.
    async fn job_finished(
        &self,
        job_id: &str,
        task_id: &str,
        summary: RecordsProcessedSummary,
    ) -> Result<()>;

    /// Returns the derived status of one job, if any updates exist.
    async fn get_job(&self, job_id: &str) -> Result<Option<JobStatus>>;

    /// Returns jobs for a table whose update history overlaps `[start, end)`.
    async fn get_jobs_in_time_period(
        &self,
        table_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JobStatus>>;

    /// Returns jobs for a table whose latest run has no terminal event.
    async fn get_unfinished_jobs(&self, table_name: &str) -> Result<Vec<JobStatus>>;

    /// Returns all jobs for a table.
    async fn get_all_jobs(&self, table_name: &str) -> Result<Vec<JobStatus>>;
}

/// Store of worker task statuses.
///
/// ## Sequencing
///
/// Strictly once each: a task cannot start twice, cannot finish without
/// starting, and cannot start again after finishing. Violations are hard
/// errors, never silent overwrites.
#[async_trait]
pub trait TaskStatusStore: Send + Sync {
    /// Records that a task started.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TrackerError::TaskLifecycleViolation`] if the task
    /// was already started or already finished.
    async fn task_started(&self, task_id: &str, start_time: DateTime<Utc>) -> Result<()>;

    /// Records that a task finished, with its per-job summaries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TrackerError::TaskLifecycleViolation`] if the task
    /// never started or already finished.
    async fn task_finished(
        &self,
        task_id: &str,
        finish_time: DateTime<Utc>,
        job_summaries: Vec<RecordsProcessedSummary>,
    ) -> Result<()>;

    /// Returns the status of one task.
    async fn get_task(&self, task_id: &str) -> Result<Option<TaskStatus>>;

    /// Returns all tasks.
    async fn get_all_tasks(&self) -> Result<Vec<TaskStatus>>;

    /// Returns tasks that started but have not finished.
    async fn get_tasks_in_progress(&self) -> Result<Vec<TaskStatus>>;
}
