//! The worker task loop: pull job messages, execute, report.
//!
//! One runner is one worker task. Coordination with other workers happens
//! entirely through the state store's conditional writes; the runner holds
//! no shared in-process state.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use strata_core::observability::task_span;
use strata_core::MessageQueue;
use strata_statestore::{StateStore, StateStoreError};
use strata_tracker::{RecordsProcessedSummary, TaskStatusStore};
use tracing::Instrument;

use crate::error::{CompactionError, Result};
use crate::executor::CompactionExecutor;
use crate::job::CompactionJob;

/// Runner tuning knobs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How long to wait after an empty receive before polling again.
    pub poll_interval: Duration,
    /// Consecutive empty receives before the task shuts down.
    pub max_consecutive_empty_polls: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_consecutive_empty_polls: 3,
        }
    }
}

/// Totals for one completed task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRunOutcome {
    /// Jobs executed to completion.
    pub jobs_executed: usize,
    /// Jobs skipped because another job held their input files.
    pub jobs_skipped: usize,
    /// Total records read across executed jobs.
    pub records_read: u64,
    /// Total records written across executed jobs.
    pub records_written: u64,
}

/// Pulls compaction job messages from a queue and drives the executor.
pub struct CompactionRunner {
    task_id: String,
    queue: Arc<dyn MessageQueue>,
    state_store: Arc<dyn StateStore>,
    task_status: Arc<dyn TaskStatusStore>,
    executor: CompactionExecutor,
    config: RunnerConfig,
}

impl CompactionRunner {
    /// Creates a runner for one worker task.
    pub fn new(
        task_id: impl Into<String>,
        queue: Arc<dyn MessageQueue>,
        state_store: Arc<dyn StateStore>,
        task_status: Arc<dyn TaskStatusStore>,
        executor: CompactionExecutor,
        config: RunnerConfig,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            queue,
            state_store,
            task_status,
            executor,
            config,
        }
    }

    /// Runs the task to completion: started event, job loop, finished event.
    ///
    /// The loop ends after `max_consecutive_empty_polls` empty receives.
    ///
    /// # Errors
    ///
    /// Returns an error if the status store rejects the task lifecycle
    /// events or the queue fails.
    pub async fn run(&self) -> Result<TaskRunOutcome> {
        let span = task_span(&self.task_id);
        self.run_task().instrument(span).await
    }

    async fn run_task(&self) -> Result<TaskRunOutcome> {
        self.task_status
            .task_started(&self.task_id, Utc::now())
            .await?;
        tracing::info!("compaction task started");

        let mut summaries: Vec<RecordsProcessedSummary> = Vec::new();
        let mut jobs_skipped = 0_usize;
        let mut empty_polls = 0_u32;

        while empty_polls < self.config.max_consecutive_empty_polls {
            let message = self
                .queue
                .receive()
                .await
                .map_err(|e| CompactionError::Queue {
                    message: e.to_string(),
                })?;

            let Some(message) = message else {
                empty_polls += 1;
                if !self.config.poll_interval.is_zero() {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                continue;
            };
            empty_polls = 0;

            let job: CompactionJob = match serde_json::from_str(&message.body) {
                Ok(job) => job,
                Err(e) => {
                    // A malformed message would loop forever if left on the
                    // queue; drop it and leave the evidence in the log.
                    tracing::error!(error = %e, body = %message.body, "unparseable job message");
                    self.delete(&message.handle).await?;
                    continue;
                }
            };

            match self.process(&job).await {
                Ok(Some(summary)) => {
                    summaries.push(summary);
                    self.delete(&message.handle).await?;
                }
                Ok(None) => {
                    jobs_skipped += 1;
                    self.delete(&message.handle).await?;
                }
                Err(error) => {
                    // Leave the message in flight: a real queue redelivers
                    // it after the visibility timeout so the job can retry
                    // on another task.
                    tracing::error!(job_id = %job.id, error = %error, "job execution failed");
                }
            }
        }

        self.task_status
            .task_finished(&self.task_id, Utc::now(), summaries.clone())
            .await?;

        let outcome = TaskRunOutcome {
            jobs_executed: summaries.len(),
            jobs_skipped,
            records_read: summaries.iter().map(|s| s.records_read).sum(),
            records_written: summaries.iter().map(|s| s.records_written).sum(),
        };
        tracing::info!(
            jobs_executed = outcome.jobs_executed,
            jobs_skipped = outcome.jobs_skipped,
            records_read = outcome.records_read,
            "compaction task finished"
        );
        Ok(outcome)
    }

    /// Reserves the job's inputs and executes it.
    ///
    /// Returns `Ok(None)` if another job already holds an input file - a
    /// benign race; this job is skipped and the holder proceeds.
    async fn process(&self, job: &CompactionJob) -> Result<Option<RecordsProcessedSummary>> {
        match self
            .state_store
            .assign_job_to_files(&job.id, &job.input_files)
            .await
        {
            Ok(()) => {}
            Err(StateStoreError::JobAssignmentConflict {
                filename,
                assigned_to,
            }) => {
                tracing::info!(
                    job_id = %job.id,
                    filename = %filename,
                    assigned_to = %assigned_to,
                    "input file already reserved, skipping job"
                );
                return Ok(None);
            }
            Err(other) => return Err(other.into()),
        }

        let summary = self.executor.run(job, &self.task_id).await?;
        Ok(Some(summary))
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        self.queue
            .delete(handle)
            .await
            .map_err(|e| CompactionError::Queue {
                message: e.to_string(),
            })
    }
}
