//! The state store contract.
//!
//! The state store is the sole authority on which files exist, their
//! status, and the partition structure. Implementations must back every
//! mutation with conditional-write semantics: the durable store rejects
//! the write if the state changed since it was read. That discipline is
//! what gives exactly-once application of a compaction's output despite
//! concurrent workers and retried invocations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use strata_core::{FileReference, Partition};

use crate::error::Result;

/// Authoritative store for file and partition state.
///
/// Reads are point-in-time snapshots; no cross-call consistency is
/// guaranteed beyond what the backing store provides. Mutations either
/// apply atomically or fail with a [`crate::StateStoreError`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Seeds the partition tree. May be called exactly once per table.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StateStoreError::AlreadyInitialised`] if a tree
    /// exists.
    async fn initialise(&self, partitions: Vec<Partition>) -> Result<()>;

    /// Inserts new active file records.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StateStoreError::Conflict`] if any filename
    /// collides with an existing record, or if any record is not an
    /// unassigned active file.
    async fn add_files(&self, files: Vec<FileReference>) -> Result<()>;

    /// Returns all active files (assigned or not).
    async fn get_active_files(&self) -> Result<Vec<FileReference>>;

    /// Returns active files belonging to one partition.
    async fn get_active_files_for_partition(
        &self,
        partition_id: &str,
    ) -> Result<Vec<FileReference>>;

    /// Returns files ready for garbage collection whose last update is
    /// older than the given instant.
    ///
    /// The delay lets the external collector avoid deleting files still
    /// referenced by in-flight queries.
    async fn get_ready_for_gc_files(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<FileReference>>;

    /// Reserves a set of active, unassigned files for a job.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StateStoreError::JobAssignmentConflict`] if any
    /// file is already held by a job, or
    /// [`crate::StateStoreError::Conflict`] if any file is missing or not
    /// active. On error, no file is reserved.
    async fn assign_job_to_files(&self, job_id: &str, filenames: &[String]) -> Result<()>;

    /// Atomically retires a compaction's input files and publishes its
    /// outputs.
    ///
    /// Preconditions, checked at apply time: every input file is active
    /// and either unassigned or assigned to `job_id`; no output filename
    /// collides with an existing record. Effects, applied indivisibly:
    /// inputs become ready-for-GC with their job reservation cleared;
    /// outputs are inserted active and unassigned.
    ///
    /// This operation is deliberately not idempotent: repeating it after
    /// success finds the inputs already retired and fails with
    /// [`crate::StateStoreError::Conflict`]. Callers must treat a conflict
    /// as a fatal, non-retryable job failure; silently retrying could
    /// double-apply the compaction.
    async fn atomically_update_files_to_ready_for_gc_and_create_new_active_files(
        &self,
        job_id: Option<&str>,
        input_files: &[String],
        output_files: Vec<FileReference>,
    ) -> Result<()>;

    /// Returns all partitions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StateStoreError::NotInitialised`] if
    /// [`StateStore::initialise`] has not been called.
    async fn get_all_partitions(&self) -> Result<Vec<Partition>>;

    /// Returns the leaf partitions.
    async fn get_leaf_partitions(&self) -> Result<Vec<Partition>>;
}
