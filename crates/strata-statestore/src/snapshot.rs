//! Snapshot-based state store over a conditional-write metadata store.
//!
//! File state and partition state are single JSON snapshot objects per
//! table. Every mutation follows the same discipline:
//!
//! 1. read the snapshot and its version token,
//! 2. check the operation's semantic preconditions against that snapshot,
//! 3. write back with `MatchesVersion` (or `DoesNotExist` for the first
//!    write).
//!
//! A semantic violation is fatal and surfaces immediately. A version
//! mismatch only means another writer moved first: the snapshot is
//! re-read and the semantic check re-run, so a precondition that stopped
//! holding in the meantime is still caught. Retries are bounded; running
//! out under heavy contention is reported as a transient fault.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::store::{MetadataStore, WritePrecondition, WriteResult};
use strata_core::{FileReference, FileStatus, Partition, PartitionTree};

use crate::error::{Result, StateStoreError};
use crate::store::StateStore;

/// Bounded CAS retries before reporting contention as unavailability.
const MAX_CAS_ATTEMPTS: u32 = 10;

/// State store implementation holding per-table JSON snapshots in a
/// conditional-write metadata store.
#[derive(Debug, Clone)]
pub struct SnapshotStateStore<M> {
    store: Arc<M>,
    table_name: String,
}

type FileMap = BTreeMap<String, FileReference>;

impl<M: MetadataStore> SnapshotStateStore<M> {
    /// Creates a state store view for one table.
    pub fn new(store: Arc<M>, table_name: impl Into<String>) -> Self {
        Self {
            store,
            table_name: table_name.into(),
        }
    }

    /// Returns the table this store is scoped to.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn files_key(&self) -> String {
        format!("tables/{}/files.json", self.table_name)
    }

    fn partitions_key(&self) -> String {
        format!("tables/{}/partitions.json", self.table_name)
    }

    async fn read_files(&self) -> Result<(FileMap, Option<String>)> {
        match self
            .store
            .get(&self.files_key())
            .await
            .map_err(StateStoreError::unavailable)?
        {
            Some((bytes, version)) => {
                let files = serde_json::from_slice(&bytes).map_err(|e| {
                    StateStoreError::Serialization {
                        message: format!("corrupt files snapshot: {e}"),
                    }
                })?;
                Ok((files, Some(version)))
            }
            None => Ok((FileMap::new(), None)),
        }
    }

    /// Runs one mutation under the read/check/CAS-write loop.
    async fn mutate_files<F>(&self, mut apply: F) -> Result<()>
    where
        F: FnMut(&mut FileMap) -> Result<()> + Send,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut files, version) = self.read_files().await?;
            apply(&mut files)?;

            let bytes =
                serde_json::to_vec(&files).map_err(|e| StateStoreError::Serialization {
                    message: format!("failed to encode files snapshot: {e}"),
                })?;
            let precondition = version
                .map_or(WritePrecondition::DoesNotExist, WritePrecondition::MatchesVersion);

            match self
                .store
                .put(&self.files_key(), Bytes::from(bytes), precondition)
                .await
                .map_err(StateStoreError::unavailable)?
            {
                WriteResult::Success { .. } => return Ok(()),
                WriteResult::PreconditionFailed { .. } => {
                    tracing::debug!(
                        table = %self.table_name,
                        attempt,
                        "files snapshot version moved, re-reading"
                    );
                }
            }
        }
        Err(StateStoreError::Unavailable {
            message: format!(
                "gave up after {MAX_CAS_ATTEMPTS} contended snapshot writes for table '{}'",
                self.table_name
            ),
        })
    }
}

#[async_trait]
impl<M: MetadataStore> StateStore for SnapshotStateStore<M> {
    async fn initialise(&self, partitions: Vec<Partition>) -> Result<()> {
        // Validate the tree shape before anything becomes durable.
        PartitionTree::new(partitions.clone())
            .map_err(|e| StateStoreError::conflict(format!("invalid partition tree: {e}")))?;

        let bytes = serde_json::to_vec(&partitions).map_err(|e| {
            StateStoreError::Serialization {
                message: format!("failed to encode partitions: {e}"),
            }
        })?;
        match self
            .store
            .put(
                &self.partitions_key(),
                Bytes::from(bytes),
                WritePrecondition::DoesNotExist,
            )
            .await
            .map_err(StateStoreError::unavailable)?
        {
            WriteResult::Success { .. } => {
                tracing::info!(table = %self.table_name, "initialised partition tree");
                Ok(())
            }
            WriteResult::PreconditionFailed { .. } => Err(StateStoreError::AlreadyInitialised {
                table_name: self.table_name.clone(),
            }),
        }
    }

    async fn add_files(&self, files: Vec<FileReference>) -> Result<()> {
        self.mutate_files(|map| {
            let now = Utc::now();
            for file in &files {
                if !file.is_available() {
                    return Err(StateStoreError::conflict(format!(
                        "new file '{}' must be active and unassigned",
                        file.filename
                    )));
                }
                if map.contains_key(&file.filename) {
                    return Err(StateStoreError::conflict(format!(
                        "file '{}' already exists",
                        file.filename
                    )));
                }
            }
            for mut file in files.clone() {
                file.last_update_time = now;
                map.insert(file.filename.clone(), file);
            }
            Ok(())
        })
        .await
    }

    async fn get_active_files(&self) -> Result<Vec<FileReference>> {
        let (files, _) = self.read_files().await?;
        Ok(files
            .into_values()
            .filter(|f| f.status == FileStatus::Active)
            .collect())
    }

    async fn get_active_files_for_partition(
        &self,
        partition_id: &str,
    ) -> Result<Vec<FileReference>> {
        let (files, _) = self.read_files().await?;
        Ok(files
            .into_values()
            .filter(|f| f.status == FileStatus::Active && f.partition_id == partition_id)
            .collect())
    }

    async fn get_ready_for_gc_files(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<FileReference>> {
        let (files, _) = self.read_files().await?;
        Ok(files
            .into_values()
            .filter(|f| {
                f.status == FileStatus::ReadyForGarbageCollection
                    && f.last_update_time < older_than
            })
            .collect())
    }

    async fn assign_job_to_files(&self, job_id: &str, filenames: &[String]) -> Result<()> {
        self.mutate_files(|map| {
            for filename in filenames {
                let file = map.get(filename).ok_or_else(|| {
                    StateStoreError::conflict(format!("file '{filename}' does not exist"))
                })?;
                if file.status != FileStatus::Active {
                    return Err(StateStoreError::conflict(format!(
                        "file '{filename}' is not active"
                    )));
                }
                if let Some(holder) = &file.job_id {
                    return Err(StateStoreError::JobAssignmentConflict {
                        filename: filename.clone(),
                        assigned_to: holder.clone(),
                    });
                }
            }
            let now = Utc::now();
            for filename in filenames {
                if let Some(file) = map.get_mut(filename) {
                    file.job_id = Some(job_id.to_string());
                    file.last_update_time = now;
                }
            }
            Ok(())
        })
        .await?;

        tracing::debug!(
            table = %self.table_name,
            job_id,
            file_count = filenames.len(),
            "assigned files to job"
        );
        Ok(())
    }

    async fn atomically_update_files_to_ready_for_gc_and_create_new_active_files(
        &self,
        job_id: Option<&str>,
        input_files: &[String],
        output_files: Vec<FileReference>,
    ) -> Result<()> {
        self.mutate_files(|map| {
            for filename in input_files {
                let file = map.get(filename).ok_or_else(|| {
                    StateStoreError::conflict(format!(
                        "input file '{filename}' does not exist (already garbage collected?)"
                    ))
                })?;
                if file.status != FileStatus::Active {
                    return Err(StateStoreError::conflict(format!(
                        "input file '{filename}' is not active"
                    )));
                }
                match (&file.job_id, job_id) {
                    (Some(holder), Some(caller)) if holder != caller => {
                        return Err(StateStoreError::conflict(format!(
                            "input file '{filename}' is assigned to job '{holder}', not '{caller}'"
                        )));
                    }
                    (Some(holder), None) => {
                        return Err(StateStoreError::conflict(format!(
                            "input file '{filename}' is assigned to job '{holder}'"
                        )));
                    }
                    _ => {}
                }
            }
            let mut seen_outputs = std::collections::HashSet::new();
            for output in &output_files {
                if !output.is_available() {
                    return Err(StateStoreError::conflict(format!(
                        "output file '{}' must be active and unassigned",
                        output.filename
                    )));
                }
                if map.contains_key(&output.filename) {
                    return Err(StateStoreError::conflict(format!(
                        "output file '{}' already exists",
                        output.filename
                    )));
                }
                if !seen_outputs.insert(output.filename.as_str()) {
                    return Err(StateStoreError::conflict(format!(
                        "output file '{}' listed twice",
                        output.filename
                    )));
                }
            }

            let now = Utc::now();
            for filename in input_files {
                if let Some(file) = map.get_mut(filename) {
                    file.status = FileStatus::ReadyForGarbageCollection;
                    file.job_id = None;
                    file.last_update_time = now;
                }
            }
            for mut output in output_files.clone() {
                output.last_update_time = now;
                map.insert(output.filename.clone(), output);
            }
            Ok(())
        })
        .await?;

        tracing::info!(
            table = %self.table_name,
            job_id = job_id.unwrap_or("-"),
            inputs = input_files.len(),
            outputs = output_files.len(),
            "retired input files and published outputs"
        );
        Ok(())
    }

    async fn get_all_partitions(&self) -> Result<Vec<Partition>> {
        match self
            .store
            .get(&self.partitions_key())
            .await
            .map_err(StateStoreError::unavailable)?
        {
            Some((bytes, _)) => {
                serde_json::from_slice(&bytes).map_err(|e| StateStoreError::Serialization {
                    message: format!("corrupt partitions snapshot: {e}"),
                })
            }
            None => Err(StateStoreError::NotInitialised {
                table_name: self.table_name.clone(),
            }),
        }
    }

    async fn get_leaf_partitions(&self) -> Result<Vec<Partition>> {
        Ok(self
            .get_all_partitions()
            .await?
            .into_iter()
            .filter(|p| p.is_leaf)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use strata_core::{InMemoryMetadataStore, Key, PartitionsBuilder};

    fn store() -> SnapshotStateStore<InMemoryMetadataStore> {
        SnapshotStateStore::new(Arc::new(InMemoryMetadataStore::new()), "events")
    }

    fn file(name: &str, partition: &str, count: u64) -> FileReference {
        FileReference::active(name, partition, Key::of(0_i64), Key::of(99_i64), count)
    }

    #[tokio::test]
    async fn add_files_then_read_back() {
        let store = store();
        store
            .add_files(vec![file("f1", "root", 100), file("f2", "root", 50)])
            .await
            .expect("add");

        let mut active = store.get_active_files().await.expect("read");
        active.sort_by(|a, b| a.filename.cmp(&b.filename));
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].filename, "f1");
        assert_eq!(active[1].record_count, 50);
    }

    #[tokio::test]
    async fn add_duplicate_filename_is_a_conflict() {
        let store = store();
        store.add_files(vec![file("f1", "root", 100)]).await.expect("add");

        let result = store.add_files(vec![file("f1", "root", 100)]).await;
        assert!(matches!(result, Err(StateStoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn active_files_filtered_by_partition() {
        let store = store();
        store
            .add_files(vec![file("f1", "left", 10), file("f2", "right", 20)])
            .await
            .expect("add");

        let left = store
            .get_active_files_for_partition("left")
            .await
            .expect("read");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].filename, "f1");
    }

    #[tokio::test]
    async fn assign_job_reserves_files() {
        let store = store();
        store
            .add_files(vec![file("f1", "root", 10), file("f2", "root", 10)])
            .await
            .expect("add");

        store
            .assign_job_to_files("job-1", &["f1".into(), "f2".into()])
            .await
            .expect("assign");

        let active = store.get_active_files().await.expect("read");
        assert!(active.iter().all(|f| f.job_id.as_deref() == Some("job-1")));
    }

    #[tokio::test]
    async fn second_job_cannot_steal_assigned_file() {
        let store = store();
        store.add_files(vec![file("f1", "root", 10)]).await.expect("add");
        store
            .assign_job_to_files("job-1", &["f1".into()])
            .await
            .expect("assign");

        let result = store.assign_job_to_files("job-2", &["f1".into()]).await;
        let Err(StateStoreError::JobAssignmentConflict {
            filename,
            assigned_to,
        }) = result
        else {
            panic!("expected assignment conflict, got {result:?}");
        };
        assert_eq!(filename, "f1");
        assert_eq!(assigned_to, "job-1");
    }

    #[tokio::test]
    async fn assign_unknown_file_is_a_conflict() {
        let store = store();
        let result = store.assign_job_to_files("job-1", &["ghost".into()]).await;
        assert!(matches!(result, Err(StateStoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn partial_assignment_failure_reserves_nothing() {
        let store = store();
        store.add_files(vec![file("f1", "root", 10)]).await.expect("add");
        store
            .assign_job_to_files("job-1", &["f1".into()])
            .await
            .expect("assign");
        store.add_files(vec![file("f2", "root", 10)]).await.expect("add");

        // f1 is taken, so the whole assignment must fail and f2 stay free.
        let result = store
            .assign_job_to_files("job-2", &["f2".into(), "f1".into()])
            .await;
        assert!(result.is_err());

        let active = store.get_active_files().await.expect("read");
        let f2 = active.iter().find(|f| f.filename == "f2").expect("f2");
        assert!(f2.job_id.is_none());
    }

    #[tokio::test]
    async fn atomic_update_swaps_inputs_for_outputs() {
        let store = store();
        store
            .add_files(vec![file("in1", "root", 100), file("in2", "root", 100)])
            .await
            .expect("add");
        store
            .assign_job_to_files("job-1", &["in1".into(), "in2".into()])
            .await
            .expect("assign");

        store
            .atomically_update_files_to_ready_for_gc_and_create_new_active_files(
                Some("job-1"),
                &["in1".into(), "in2".into()],
                vec![file("out", "root", 200)],
            )
            .await
            .expect("commit");

        // Active set excludes every input and includes the output exactly once.
        let active = store.get_active_files().await.expect("read");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].filename, "out");
        assert!(active[0].is_available());

        let gc = store
            .get_ready_for_gc_files(Utc::now() + Duration::seconds(1))
            .await
            .expect("gc");
        let mut names: Vec<_> = gc.iter().map(|f| f.filename.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["in1", "in2"]);
        assert!(gc.iter().all(|f| f.job_id.is_none()), "reservation cleared");
    }

    #[tokio::test]
    async fn repeating_a_successful_commit_conflicts() {
        let store = store();
        store.add_files(vec![file("in1", "root", 100)]).await.expect("add");

        let inputs = vec!["in1".to_string()];
        let commit = || {
            store.atomically_update_files_to_ready_for_gc_and_create_new_active_files(
                None,
                &inputs,
                vec![file("out", "root", 100)],
            )
        };
        commit().await.expect("first commit");

        // The inputs are no longer active, so the repeat must conflict.
        let result = commit().await;
        assert!(matches!(result, Err(StateStoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn commit_fails_if_input_assigned_to_another_job() {
        let store = store();
        store.add_files(vec![file("in1", "root", 100)]).await.expect("add");
        store
            .assign_job_to_files("job-other", &["in1".into()])
            .await
            .expect("assign");

        let result = store
            .atomically_update_files_to_ready_for_gc_and_create_new_active_files(
                Some("job-1"),
                &["in1".into()],
                vec![file("out", "root", 100)],
            )
            .await;
        assert!(matches!(result, Err(StateStoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn commit_fails_if_output_name_collides() {
        let store = store();
        store
            .add_files(vec![file("in1", "root", 100), file("existing", "root", 1)])
            .await
            .expect("add");

        let result = store
            .atomically_update_files_to_ready_for_gc_and_create_new_active_files(
                None,
                &["in1".into()],
                vec![file("existing", "root", 100)],
            )
            .await;
        assert!(matches!(result, Err(StateStoreError::Conflict { .. })));

        // Failed commit must leave the inputs untouched.
        let active = store.get_active_files().await.expect("read");
        assert!(active.iter().any(|f| f.filename == "in1"));
    }

    #[tokio::test]
    async fn gc_delay_filters_fresh_files() {
        let store = store();
        store.add_files(vec![file("in1", "root", 100)]).await.expect("add");
        store
            .atomically_update_files_to_ready_for_gc_and_create_new_active_files(
                None,
                &["in1".into()],
                vec![file("out", "root", 100)],
            )
            .await
            .expect("commit");

        // A cutoff in the past hides the freshly retired file.
        let old_cutoff = Utc::now() - Duration::hours(1);
        let gc = store.get_ready_for_gc_files(old_cutoff).await.expect("gc");
        assert!(gc.is_empty());
    }

    #[tokio::test]
    async fn initialise_stores_partitions_once() {
        let store = store();
        let tree = PartitionsBuilder::root_leaf("root", 1)
            .split("root", 0, 100_i64, "left", "right")
            .expect("split")
            .build()
            .expect("tree");

        store.initialise(tree.all()).await.expect("initialise");

        let partitions = store.get_all_partitions().await.expect("read");
        assert_eq!(partitions.len(), 3);
        let leaves = store.get_leaf_partitions().await.expect("leaves");
        assert_eq!(leaves.len(), 2);

        let result = store.initialise(tree.all()).await;
        assert!(matches!(
            result,
            Err(StateStoreError::AlreadyInitialised { .. })
        ));
    }

    #[tokio::test]
    async fn partitions_before_initialise_is_an_error() {
        let store = store();
        let result = store.get_all_partitions().await;
        assert!(matches!(result, Err(StateStoreError::NotInitialised { .. })));
    }

    #[tokio::test]
    async fn initialise_rejects_invalid_tree() {
        let store = store();
        let result = store
            .initialise(vec![
                Partition::root_leaf("a", 1),
                Partition::root_leaf("b", 1),
            ])
            .await;
        assert!(matches!(result, Err(StateStoreError::Conflict { .. })));
    }
}
