//! Ingest jobs and per-table batching configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// One ingest job: a batch of files for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJob {
    /// Unique job id.
    pub id: String,
    /// The target table.
    pub table_name: String,
    /// The files in this batch.
    pub files: Vec<String>,
}

impl IngestJob {
    /// Generates a fresh job id.
    #[must_use]
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// How a table's batches are ingested.
///
/// Standard ingest runs on the ordinary worker fleet; the bulk-import
/// variants hand the batch to one of the heavyweight import backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestMode {
    /// Ordinary streaming ingest.
    StandardIngest,
    /// Bulk import on an on-demand cluster.
    BulkImportEmr,
    /// Bulk import on a persistent cluster.
    BulkImportPersistentEmr,
    /// Bulk import on Kubernetes.
    BulkImportEks,
}

impl IngestMode {
    /// Returns true if this mode routes to the bulk-import queue.
    #[must_use]
    pub const fn is_bulk_import(&self) -> bool {
        !matches!(self, Self::StandardIngest)
    }
}

/// Per-table thresholds controlling when and how batches are emitted.
#[derive(Debug, Clone)]
pub struct TableBatchConfig {
    /// Minimum pending files before a batch may be emitted.
    pub min_files: usize,
    /// Maximum files per job.
    pub max_files: usize,
    /// Minimum pending bytes before a batch may be emitted.
    pub min_bytes: u64,
    /// Maximum bytes per job.
    pub max_bytes: u64,
    /// A pending file older than this forces a flush regardless of size.
    pub max_file_age: Duration,
    /// Which ingest backend receives this table's jobs.
    pub ingest_mode: IngestMode,
}

impl Default for TableBatchConfig {
    fn default() -> Self {
        Self {
            min_files: 1,
            max_files: 100,
            min_bytes: 0,
            max_bytes: 5 * 1024 * 1024 * 1024,
            max_file_age: Duration::minutes(5),
            ingest_mode: IngestMode::StandardIngest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_wire_format_is_camel_case() {
        let job = IngestJob {
            id: "job-1".into(),
            table_name: "events".into(),
            files: vec!["f1".into()],
        };
        let json = serde_json::to_string(&job).expect("serialize");
        assert!(json.contains("\"tableName\":\"events\""));
    }

    #[test]
    fn bulk_import_modes_route_together() {
        assert!(!IngestMode::StandardIngest.is_bulk_import());
        assert!(IngestMode::BulkImportEmr.is_bulk_import());
        assert!(IngestMode::BulkImportPersistentEmr.is_bulk_import());
        assert!(IngestMode::BulkImportEks.is_bulk_import());
    }
}
