//! Pending file requests and the batcher's own store.
//!
//! The batcher tracks arriving files in its own store, separate from the
//! table state store: a request is "pending" until it is assigned to an
//! ingest job. Assignment happens *before* the job is enqueued, so a crash
//! between the two steps cannot duplicate a file into two jobs - the
//! failure mode is an assigned-but-never-sent job needing reconciliation,
//! which is logged, not hidden.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::error::{IngestError, Result};

/// One file waiting to be ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIngestRequest {
    /// Path of the file to ingest.
    pub file: String,
    /// The table the file belongs to.
    pub table_name: String,
    /// File size in bytes, used for byte-budget packing.
    pub file_size_bytes: u64,
    /// When the request was received; drives oldest-first ordering and the
    /// max-age flush.
    pub received_time: DateTime<Utc>,
}

/// The batcher's request store.
#[async_trait]
pub trait BatcherStore: Send + Sync {
    /// Records an arriving file. A repeated request for the same pending
    /// file replaces the earlier one.
    async fn add_file_request(&self, request: FileIngestRequest) -> Result<()>;

    /// Returns unassigned requests, oldest received first.
    async fn pending_oldest_first(&self) -> Result<Vec<FileIngestRequest>>;

    /// Marks a set of pending requests as assigned to a job.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::AlreadyAssigned`] if any file already belongs
    /// to a job, or [`IngestError::RequestNotFound`] if a file has no
    /// pending request. On error nothing is assigned.
    async fn assign_job(&self, job_id: &str, files: &[FileIngestRequest]) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredRequest {
    request: FileIngestRequest,
    job_id: Option<String>,
}

/// In-memory batcher store for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryBatcherStore {
    requests: RwLock<Vec<StoredRequest>>,
}

impl InMemoryBatcherStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns requests assigned to the given job, for test assertions and
    /// reconciliation tooling.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] if the store lock is poisoned.
    pub fn assigned_to(&self, job_id: &str) -> Result<Vec<FileIngestRequest>> {
        let requests = self.requests.read().map_err(|_| IngestError::Store {
            message: "lock poisoned".into(),
        })?;
        Ok(requests
            .iter()
            .filter(|r| r.job_id.as_deref() == Some(job_id))
            .map(|r| r.request.clone())
            .collect())
    }
}

#[async_trait]
impl BatcherStore for InMemoryBatcherStore {
    async fn add_file_request(&self, request: FileIngestRequest) -> Result<()> {
        let mut requests = self.requests.write().map_err(|_| IngestError::Store {
            message: "lock poisoned".into(),
        })?;
        let existing = requests.iter_mut().find(|r| {
            r.job_id.is_none()
                && r.request.file == request.file
                && r.request.table_name == request.table_name
        });
        match existing {
            Some(stored) => stored.request = request,
            None => requests.push(StoredRequest {
                request,
                job_id: None,
            }),
        }
        Ok(())
    }

    async fn pending_oldest_first(&self) -> Result<Vec<FileIngestRequest>> {
        let requests = self.requests.read().map_err(|_| IngestError::Store {
            message: "lock poisoned".into(),
        })?;
        let mut pending: Vec<_> = requests
            .iter()
            .filter(|r| r.job_id.is_none())
            .map(|r| r.request.clone())
            .collect();
        pending.sort_by(|a, b| {
            a.received_time
                .cmp(&b.received_time)
                .then_with(|| a.file.cmp(&b.file))
        });
        Ok(pending)
    }

    async fn assign_job(&self, job_id: &str, files: &[FileIngestRequest]) -> Result<()> {
        let mut requests = self.requests.write().map_err(|_| IngestError::Store {
            message: "lock poisoned".into(),
        })?;
        // Validate the full set before touching anything.
        for file in files {
            let stored = requests
                .iter()
                .find(|r| r.request.file == file.file && r.request.table_name == file.table_name)
                .ok_or_else(|| IngestError::RequestNotFound {
                    file: file.file.clone(),
                })?;
            if let Some(holder) = &stored.job_id {
                return Err(IngestError::AlreadyAssigned {
                    file: file.file.clone(),
                    job_id: holder.clone(),
                });
            }
        }
        for file in files {
            if let Some(stored) = requests
                .iter_mut()
                .find(|r| r.request.file == file.file && r.request.table_name == file.table_name)
            {
                stored.job_id = Some(job_id.to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(file: &str, minutes_ago: i64) -> FileIngestRequest {
        FileIngestRequest {
            file: file.to_string(),
            table_name: "events".into(),
            file_size_bytes: 1024,
            received_time: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn pending_is_oldest_first() {
        let store = InMemoryBatcherStore::new();
        store.add_file_request(request("new", 1)).await.expect("add");
        store.add_file_request(request("old", 60)).await.expect("add");

        let pending = store.pending_oldest_first().await.expect("pending");
        assert_eq!(pending[0].file, "old");
        assert_eq!(pending[1].file, "new");
    }

    #[tokio::test]
    async fn repeated_request_replaces_pending_entry() {
        let store = InMemoryBatcherStore::new();
        store.add_file_request(request("f", 10)).await.expect("add");
        let mut updated = request("f", 0);
        updated.file_size_bytes = 4096;
        store.add_file_request(updated).await.expect("add again");

        let pending = store.pending_oldest_first().await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_size_bytes, 4096);
    }

    #[tokio::test]
    async fn assignment_removes_from_pending() {
        let store = InMemoryBatcherStore::new();
        let file = request("f", 1);
        store.add_file_request(file.clone()).await.expect("add");

        store.assign_job("job-1", &[file.clone()]).await.expect("assign");
        assert!(store.pending_oldest_first().await.expect("pending").is_empty());
        assert_eq!(store.assigned_to("job-1").expect("assigned").len(), 1);

        // The same file cannot land in a second job.
        let result = store.assign_job("job-2", &[file]).await;
        assert!(matches!(result, Err(IngestError::AlreadyAssigned { .. })));
    }

    #[tokio::test]
    async fn assigning_unknown_file_fails_without_side_effects() {
        let store = InMemoryBatcherStore::new();
        let known = request("known", 1);
        store.add_file_request(known.clone()).await.expect("add");

        let result = store
            .assign_job("job-1", &[known.clone(), request("ghost", 1)])
            .await;
        assert!(matches!(result, Err(IngestError::RequestNotFound { .. })));

        // The known file must still be pending.
        assert_eq!(store.pending_oldest_first().await.expect("pending").len(), 1);
    }
}
