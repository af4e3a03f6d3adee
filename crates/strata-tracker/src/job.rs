//! Job status records and the views derived from them.
//!
//! The stored form is an append-only sequence of [`JobStatusRecord`]s per
//! job. Nothing is ever mutated in place: a retried job simply appends
//! another started/finished pair, and readers fold the full sequence into
//! a [`JobStatus`] with one [`JobRun`] per attempt. This keeps reads
//! correct no matter how many retries occurred.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::summary::RecordsProcessedSummary;

/// Details captured when a job is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreated {
    /// The job id.
    pub job_id: String,
    /// The table the job belongs to.
    pub table_name: String,
    /// The partition the job compacts.
    pub partition_id: String,
    /// How many input files the job consumes.
    pub input_file_count: usize,
    /// True if the job writes into two child partitions.
    pub splitting: bool,
}

/// One status update, the unit of the append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatusUpdate {
    /// The job was created and enqueued.
    Created(JobCreated),
    /// A worker task picked the job up.
    Started {
        /// The worker task running this attempt.
        task_id: String,
        /// When the attempt started.
        start_time: DateTime<Utc>,
    },
    /// An attempt reached a terminal state.
    Finished {
        /// The worker task that ran the attempt.
        task_id: String,
        /// Counts and timing for the attempt.
        summary: RecordsProcessedSummary,
    },
}

/// A stored status update with its server-assigned times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusRecord {
    /// The job this update belongs to.
    pub job_id: String,
    /// When the store accepted the update.
    pub update_time: DateTime<Utc>,
    /// When the storage layer may drop the record.
    pub expiry_time: DateTime<Utc>,
    /// The update itself.
    pub update: JobStatusUpdate,
}

/// One attempt at running a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    /// The worker task that ran (or is running) this attempt.
    pub task_id: String,
    /// When the attempt started.
    pub start_time: DateTime<Utc>,
    /// The terminal summary; `None` while the attempt is in progress.
    pub finished: Option<RecordsProcessedSummary>,
}

impl JobRun {
    /// Returns true if this attempt has no terminal event yet.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        self.finished.is_none()
    }
}

/// The derived view of one job's full history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    /// The job id.
    pub job_id: String,
    /// Creation details; `None` if the creation record expired.
    pub created: Option<JobCreated>,
    /// All attempts in the order they started.
    pub runs: Vec<JobRun>,
    /// Update times seen while folding, used for time-window queries.
    pub first_update_time: DateTime<Utc>,
    /// The most recent update time.
    pub last_update_time: DateTime<Utc>,
}

impl JobStatus {
    /// Folds an append-only update sequence into a derived status.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::JobLifecycleViolation`] if a finished update
    /// has no matching unfinished run; the write path prevents this, so
    /// hitting it on read means the log was corrupted.
    pub fn from_records(job_id: &str, records: &[JobStatusRecord]) -> Result<Option<Self>> {
        let mut created = None;
        let mut runs: Vec<JobRun> = Vec::new();
        let mut first_update_time = None;
        let mut last_update_time = None;

        for record in records.iter().filter(|r| r.job_id == job_id) {
            first_update_time.get_or_insert(record.update_time);
            last_update_time = Some(record.update_time);
            match &record.update {
                JobStatusUpdate::Created(info) => created = Some(info.clone()),
                JobStatusUpdate::Started {
                    task_id,
                    start_time,
                } => runs.push(JobRun {
                    task_id: task_id.clone(),
                    start_time: *start_time,
                    finished: None,
                }),
                JobStatusUpdate::Finished { task_id, summary } => {
                    let run = runs
                        .iter_mut()
                        .rev()
                        .find(|run| run.task_id == *task_id && run.is_in_progress())
                        .ok_or_else(|| {
                            TrackerError::job_violation(
                                job_id,
                                format!("finished update from task '{task_id}' has no open run"),
                            )
                        })?;
                    run.finished = Some(*summary);
                }
            }
        }

        match (first_update_time, last_update_time) {
            (Some(first), Some(last)) => Ok(Some(Self {
                job_id: job_id.to_string(),
                created,
                runs,
                first_update_time: first,
                last_update_time: last,
            })),
            _ => Ok(None),
        }
    }

    /// Returns true if the latest run (if any) has no terminal event.
    ///
    /// A job with no runs at all counts as unfinished: it was created but
    /// never picked up.
    #[must_use]
    pub fn is_unfinished(&self) -> bool {
        self.runs.last().map_or(true, JobRun::is_in_progress)
    }

    /// Returns true if the update history overlaps `[start, end)`.
    #[must_use]
    pub fn overlaps_period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.first_update_time < end && self.last_update_time >= start
    }
}
