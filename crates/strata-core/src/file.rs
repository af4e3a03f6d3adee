//! File metadata records tracked by the state store.
//!
//! A [`FileReference`] describes one physical sorted file: where it lives,
//! which partition it belongs to, its key bounds, and its lifecycle status.
//! The physical bytes live in the blob store; only metadata is held here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Lifecycle status of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Valid input for queries and compaction.
    Active,
    /// Superseded by a compaction output; awaiting physical deletion.
    ReadyForGarbageCollection,
}

/// Metadata for one sorted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    /// Path of the file in the blob store; unique across the table.
    pub filename: String,
    /// The partition this file's keys fall in.
    pub partition_id: String,
    /// Lifecycle status.
    pub status: FileStatus,
    /// The compaction job currently consuming this file as input, if any.
    ///
    /// At most one job may hold a file; an assigned file is reserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Minimum row key present in the file; `None` for empty files.
    pub min_key: Option<Key>,
    /// Maximum row key present in the file; `None` for empty files.
    pub max_key: Option<Key>,
    /// Number of records in the file.
    pub record_count: u64,
    /// When this record last changed.
    pub last_update_time: DateTime<Utc>,
}

impl FileReference {
    /// Creates a new active, unassigned file record.
    #[must_use]
    pub fn active(
        filename: impl Into<String>,
        partition_id: impl Into<String>,
        min_key: Key,
        max_key: Key,
        record_count: u64,
    ) -> Self {
        Self {
            filename: filename.into(),
            partition_id: partition_id.into(),
            status: FileStatus::Active,
            job_id: None,
            min_key: Some(min_key),
            max_key: Some(max_key),
            record_count,
            last_update_time: Utc::now(),
        }
    }

    /// Creates a new active record for a file with no records.
    ///
    /// A splitting compaction whose input all falls on one side of the
    /// boundary still publishes the other side's (empty) output file.
    #[must_use]
    pub fn active_empty(filename: impl Into<String>, partition_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            partition_id: partition_id.into(),
            status: FileStatus::Active,
            job_id: None,
            min_key: None,
            max_key: None,
            record_count: 0,
            last_update_time: Utc::now(),
        }
    }

    /// Returns true if the file is active and not reserved by any job.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == FileStatus::Active && self.job_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyValue;

    #[test]
    fn new_file_is_available() {
        let file = FileReference::active(
            "data/f1.sorted",
            "root",
            Key::of(0_i64),
            Key::of(99_i64),
            100,
        );
        assert!(file.is_available());
        assert_eq!(file.status, FileStatus::Active);
        assert!(file.job_id.is_none());
    }

    #[test]
    fn assigned_file_is_not_available() {
        let mut file = FileReference::active(
            "data/f1.sorted",
            "root",
            Key::of(0_i64),
            Key::of(99_i64),
            100,
        );
        file.job_id = Some("job-1".into());
        assert!(!file.is_available());
    }

    #[test]
    fn wire_format_uses_camel_case_and_status_constants() {
        let file = FileReference::active(
            "data/f1.sorted",
            "root",
            Key::new(vec![KeyValue::Int64(0)]),
            Key::new(vec![KeyValue::Int64(9)]),
            10,
        );
        let json = serde_json::to_string(&file).expect("serialize");
        assert!(json.contains("\"partitionId\""));
        assert!(json.contains("\"recordCount\""));
        assert!(json.contains("\"ACTIVE\""));
    }
}
