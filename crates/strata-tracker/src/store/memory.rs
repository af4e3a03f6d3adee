//! In-memory status stores.
//!
//! Used by tests and local runs; a durable deployment plugs a
//! conditional-write database behind the same traits. The job store keeps
//! the raw update log and derives every answer from it, the same way a
//! durable implementation reads its append-only table.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::error::{Result, TrackerError};
use crate::job::{JobCreated, JobStatus, JobStatusRecord, JobStatusUpdate};
use crate::store::{JobStatusStore, TaskStatusStore};
use crate::summary::RecordsProcessedSummary;
use crate::task::{TaskFinished, TaskStatus};

/// How long stored records advertise themselves as valid.
const DEFAULT_RECORD_TTL_DAYS: i64 = 7;

/// In-memory append-only job status store.
#[derive(Debug, Default)]
pub struct InMemoryJobStatusStore {
    records: RwLock<Vec<JobStatusRecord>>,
}

impl InMemoryJobStatusStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(job_id: &str, update: JobStatusUpdate) -> JobStatusRecord {
        let update_time = Utc::now();
        JobStatusRecord {
            job_id: job_id.to_string(),
            update_time,
            expiry_time: update_time + Duration::days(DEFAULT_RECORD_TTL_DAYS),
            update,
        }
    }

    fn with_records<T>(&self, f: impl FnOnce(&[JobStatusRecord]) -> Result<T>) -> Result<T> {
        let records = self.records.read().map_err(|_| TrackerError::Storage {
            message: "lock poisoned".into(),
        })?;
        f(&records)
    }

    /// Validates and appends under one lock, so a concurrent writer cannot
    /// slip between the sequencing check and the append.
    fn append_checked(
        &self,
        job_id: &str,
        update: JobStatusUpdate,
        check: impl FnOnce(Option<&JobStatus>) -> Result<()>,
    ) -> Result<()> {
        let mut records = self.records.write().map_err(|_| TrackerError::Storage {
            message: "lock poisoned".into(),
        })?;
        let status = JobStatus::from_records(job_id, &records)?;
        check(status.as_ref())?;
        records.push(Self::stamp(job_id, update));
        Ok(())
    }

    fn derive(&self, job_id: &str) -> Result<Option<JobStatus>> {
        self.with_records(|records| JobStatus::from_records(job_id, records))
    }

    fn derive_for_table(&self, table_name: &str) -> Result<Vec<JobStatus>> {
        self.with_records(|records| {
            // Jobs belong to a table through their creation record.
            let job_ids: BTreeSet<&str> = records
                .iter()
                .filter_map(|r| match &r.update {
                    JobStatusUpdate::Created(info) if info.table_name == table_name => {
                        Some(r.job_id.as_str())
                    }
                    _ => None,
                })
                .collect();
            let mut jobs = Vec::with_capacity(job_ids.len());
            for job_id in job_ids {
                if let Some(status) = JobStatus::from_records(job_id, records)? {
                    jobs.push(status);
                }
            }
            Ok(jobs)
        })
    }
}

#[async_trait]
impl JobStatusStore for InMemoryJobStatusStore {
    async fn job_created(&self, job: JobCreated) -> Result<()> {
        let job_id = job.job_id.clone();
        self.append_checked(
            &job_id,
            JobStatusUpdate::Created(job),
            |status| match status {
                Some(existing) if existing.created.is_some() => {
                    Err(TrackerError::job_violation(&job_id, "job already created"))
                }
                _ => Ok(()),
            },
        )
    }

    async fn job_started(
        &self,
        job_id: &str,
        task_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<()> {
        self.append_checked(
            job_id,
            JobStatusUpdate::Started {
                task_id: task_id.to_string(),
                start_time,
            },
            |status| {
                if status.and_then(|s| s.created.as_ref()).is_none() {
                    return Err(TrackerError::job_violation(
                        job_id,
                        "started before any creation record",
                    ));
                }
                Ok(())
            },
        )
    }

    async fn job_finished(
        &self,
        job_id: &str,
        task_id: &str,
        summary: RecordsProcessedSummary,
    ) -> Result<()> {
        self.append_checked(
            job_id,
            JobStatusUpdate::Finished {
                task_id: task_id.to_string(),
                summary,
            },
            |status| {
                let has_open_run = status.is_some_and(|status| {
                    status
                        .runs
                        .iter()
                        .any(|run| run.task_id == task_id && run.is_in_progress())
                });
                if !has_open_run {
                    return Err(TrackerError::job_violation(
                        job_id,
                        format!("no open run for task '{task_id}' to finish"),
                    ));
                }
                Ok(())
            },
        )
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobStatus>> {
        self.derive(job_id)
    }

    async fn get_jobs_in_time_period(
        &self,
        table_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JobStatus>> {
        Ok(self
            .derive_for_table(table_name)?
            .into_iter()
            .filter(|job| job.overlaps_period(start, end))
            .collect())
    }

    async fn get_unfinished_jobs(&self, table_name: &str) -> Result<Vec<JobStatus>> {
        Ok(self
            .derive_for_table(table_name)?
            .into_iter()
            .filter(JobStatus::is_unfinished)
            .collect())
    }

    async fn get_all_jobs(&self, table_name: &str) -> Result<Vec<JobStatus>> {
        self.derive_for_table(table_name)
    }
}

/// One stored task update.
#[derive(Debug, Clone)]
enum TaskUpdate {
    Started {
        task_id: String,
        start_time: DateTime<Utc>,
    },
    Finished {
        task_id: String,
        finished: TaskFinished,
    },
}

/// In-memory task status store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStatusStore {
    updates: RwLock<Vec<TaskUpdate>>,
}

impl InMemoryTaskStatusStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn derive_all(updates: &[TaskUpdate]) -> Vec<TaskStatus> {
        let mut tasks: Vec<TaskStatus> = Vec::new();
        for update in updates {
            match update {
                TaskUpdate::Started {
                    task_id,
                    start_time,
                } => tasks.push(TaskStatus::started(task_id.clone(), *start_time)),
                TaskUpdate::Finished { task_id, finished } => {
                    if let Some(task) = tasks.iter_mut().find(|t| t.task_id == *task_id) {
                        task.finished = Some(*finished);
                    }
                }
            }
        }
        tasks
    }

    fn with_updates<T>(&self, f: impl FnOnce(&mut Vec<TaskUpdate>) -> Result<T>) -> Result<T> {
        let mut updates = self.updates.write().map_err(|_| TrackerError::Storage {
            message: "lock poisoned".into(),
        })?;
        f(&mut updates)
    }
}

#[async_trait]
impl TaskStatusStore for InMemoryTaskStatusStore {
    async fn task_started(&self, task_id: &str, start_time: DateTime<Utc>) -> Result<()> {
        self.with_updates(|updates| {
            let existing = Self::derive_all(updates)
                .into_iter()
                .find(|t| t.task_id == task_id);
            match existing {
                Some(task) if task.is_in_progress() => {
                    Err(TrackerError::task_violation(task_id, "task already started"))
                }
                Some(_) => Err(TrackerError::task_violation(
                    task_id,
                    "task already finished; a finished task cannot restart",
                )),
                None => {
                    updates.push(TaskUpdate::Started {
                        task_id: task_id.to_string(),
                        start_time,
                    });
                    Ok(())
                }
            }
        })
    }

    async fn task_finished(
        &self,
        task_id: &str,
        finish_time: DateTime<Utc>,
        job_summaries: Vec<RecordsProcessedSummary>,
    ) -> Result<()> {
        self.with_updates(|updates| {
            let existing = Self::derive_all(updates)
                .into_iter()
                .find(|t| t.task_id == task_id);
            match existing {
                None => Err(TrackerError::task_violation(
                    task_id,
                    "task finished before it started",
                )),
                Some(task) if !task.is_in_progress() => {
                    Err(TrackerError::task_violation(task_id, "task already finished"))
                }
                Some(_) => {
                    updates.push(TaskUpdate::Finished {
                        task_id: task_id.to_string(),
                        finished: TaskFinished::from_job_summaries(finish_time, &job_summaries),
                    });
                    Ok(())
                }
            }
        })
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        self.with_updates(|updates| {
            Ok(Self::derive_all(updates)
                .into_iter()
                .find(|t| t.task_id == task_id))
        })
    }

    async fn get_all_tasks(&self) -> Result<Vec<TaskStatus>> {
        self.with_updates(|updates| Ok(Self::derive_all(updates)))
    }

    async fn get_tasks_in_progress(&self) -> Result<Vec<TaskStatus>> {
        self.with_updates(|updates| {
            Ok(Self::derive_all(updates)
                .into_iter()
                .filter(TaskStatus::is_in_progress)
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap()
    }

    fn created(job_id: &str, table: &str) -> JobCreated {
        JobCreated {
            job_id: job_id.to_string(),
            table_name: table.to_string(),
            partition_id: "root".into(),
            input_file_count: 2,
            splitting: false,
        }
    }

    fn summary(read: u64, written: u64) -> RecordsProcessedSummary {
        RecordsProcessedSummary::new(read, written, at(0), at(1))
    }

    // --- job store ---

    #[tokio::test]
    async fn job_lifecycle_happy_path() {
        let store = InMemoryJobStatusStore::new();
        store.job_created(created("job-1", "events")).await.expect("created");
        store
            .job_started("job-1", "task-a", at(1))
            .await
            .expect("started");
        store
            .job_finished("job-1", "task-a", summary(200, 200))
            .await
            .expect("finished");

        let job = store.get_job("job-1").await.expect("get").expect("status");
        assert_eq!(job.runs.len(), 1);
        assert!(!job.is_unfinished());
    }

    #[tokio::test]
    async fn job_started_requires_creation() {
        let store = InMemoryJobStatusStore::new();
        let result = store.job_started("ghost", "task-a", at(1)).await;
        assert!(matches!(
            result,
            Err(TrackerError::JobLifecycleViolation { .. })
        ));
    }

    #[tokio::test]
    async fn job_finishes_at_most_once_per_run() {
        let store = InMemoryJobStatusStore::new();
        store.job_created(created("job-1", "events")).await.expect("created");
        store
            .job_started("job-1", "task-a", at(1))
            .await
            .expect("started");
        store
            .job_finished("job-1", "task-a", summary(10, 10))
            .await
            .expect("finished");

        let result = store.job_finished("job-1", "task-a", summary(10, 10)).await;
        assert!(matches!(
            result,
            Err(TrackerError::JobLifecycleViolation { .. })
        ));
    }

    #[tokio::test]
    async fn rerun_opens_a_second_run() {
        let store = InMemoryJobStatusStore::new();
        store.job_created(created("job-1", "events")).await.expect("created");
        store
            .job_started("job-1", "task-a", at(1))
            .await
            .expect("first attempt");
        store
            .job_started("job-1", "task-b", at(2))
            .await
            .expect("retry is legal");
        store
            .job_finished("job-1", "task-b", summary(100, 100))
            .await
            .expect("retry finishes");

        let job = store.get_job("job-1").await.expect("get").expect("status");
        assert_eq!(job.runs.len(), 2);
        assert!(job.runs[0].is_in_progress(), "dead attempt preserved");
        assert!(!job.is_unfinished());
    }

    #[tokio::test]
    async fn unfinished_query_tracks_latest_run() {
        let store = InMemoryJobStatusStore::new();
        store.job_created(created("job-1", "events")).await.expect("created");
        store.job_created(created("job-2", "events")).await.expect("created");
        store
            .job_started("job-1", "task-a", at(1))
            .await
            .expect("started");
        store
            .job_finished("job-1", "task-a", summary(10, 10))
            .await
            .expect("finished");

        let unfinished = store.get_unfinished_jobs("events").await.expect("query");
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].job_id, "job-2");
    }

    #[tokio::test]
    async fn time_period_query_filters_by_update_history() {
        let store = InMemoryJobStatusStore::new();
        store.job_created(created("job-1", "events")).await.expect("created");

        let now = Utc::now();
        let hour = Duration::hours(1);

        let hit = store
            .get_jobs_in_time_period("events", now - hour, now + hour)
            .await
            .expect("query");
        assert_eq!(hit.len(), 1);

        let miss = store
            .get_jobs_in_time_period("events", now + hour, now + hour * 2)
            .await
            .expect("query");
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn jobs_scoped_to_table() {
        let store = InMemoryJobStatusStore::new();
        store.job_created(created("job-1", "events")).await.expect("created");
        store.job_created(created("job-2", "clicks")).await.expect("created");

        let events = store.get_all_jobs("events").await.expect("query");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job_id, "job-1");
    }

    // --- task store ---

    #[tokio::test]
    async fn task_lifecycle_happy_path() {
        let store = InMemoryTaskStatusStore::new();
        store.task_started("task-a", at(0)).await.expect("started");

        let in_progress = store.get_tasks_in_progress().await.expect("query");
        assert_eq!(in_progress.len(), 1);

        store
            .task_finished("task-a", at(5), vec![summary(100, 90), summary(50, 50)])
            .await
            .expect("finished");

        let task = store.get_task("task-a").await.expect("get").expect("status");
        let finished = task.finished.expect("finished");
        assert_eq!(finished.job_runs, 2);
        assert_eq!(finished.records_read, 150);
        assert_eq!(finished.records_written, 140);
        assert!(store.get_tasks_in_progress().await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn task_cannot_start_twice() {
        let store = InMemoryTaskStatusStore::new();
        store.task_started("task-a", at(0)).await.expect("started");

        let result = store.task_started("task-a", at(1)).await;
        assert!(matches!(
            result,
            Err(TrackerError::TaskLifecycleViolation { .. })
        ));
    }

    #[tokio::test]
    async fn task_cannot_finish_before_starting() {
        let store = InMemoryTaskStatusStore::new();
        let result = store.task_finished("task-a", at(1), vec![]).await;
        assert!(matches!(
            result,
            Err(TrackerError::TaskLifecycleViolation { .. })
        ));
    }

    #[tokio::test]
    async fn finished_task_cannot_restart() {
        let store = InMemoryTaskStatusStore::new();
        store.task_started("task-a", at(0)).await.expect("started");
        store
            .task_finished("task-a", at(1), vec![])
            .await
            .expect("finished");

        let result = store.task_started("task-a", at(2)).await;
        assert!(matches!(
            result,
            Err(TrackerError::TaskLifecycleViolation { .. })
        ));
    }

    #[tokio::test]
    async fn task_cannot_finish_twice() {
        let store = InMemoryTaskStatusStore::new();
        store.task_started("task-a", at(0)).await.expect("started");
        store
            .task_finished("task-a", at(1), vec![])
            .await
            .expect("finished");

        let result = store.task_finished("task-a", at(2), vec![]).await;
        assert!(matches!(
            result,
            Err(TrackerError::TaskLifecycleViolation { .. })
        ));
    }
}
