//! The ingest batcher: groups pending file requests into right-sized jobs.
//!
//! One `batch_files` pass handles every table with pending requests.
//! Per table, the gate is: enough files AND enough bytes, OR any file past
//! the age limit (bounding latency even for undersized tables). Once the
//! gate opens, all pending files for the table are packed first-fit into
//! batches - the first open batch with room on both the file-count and
//! byte budgets takes the file; simplicity and bounded packing time are
//! preferred over optimal density.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use strata_core::MessageQueue;

use crate::error::{IngestError, Result};
use crate::job::{IngestJob, TableBatchConfig};
use crate::request::{BatcherStore, FileIngestRequest};

/// Looks up per-table batching configuration.
pub trait TableConfigProvider: Send + Sync {
    /// Returns the configuration for a table, or `None` if unknown.
    fn config_for(&self, table_name: &str) -> Option<TableBatchConfig>;
}

impl TableConfigProvider for BTreeMap<String, TableBatchConfig> {
    fn config_for(&self, table_name: &str) -> Option<TableBatchConfig> {
        self.get(table_name).cloned()
    }
}

/// The queues ingest jobs are dispatched to, keyed by ingest mode.
#[derive(Clone)]
pub struct IngestQueues {
    /// Queue for standard-ingest tables.
    pub standard: Arc<dyn MessageQueue>,
    /// Queue shared by the bulk-import backends.
    pub bulk_import: Arc<dyn MessageQueue>,
}

/// Groups pending file requests into ingest jobs.
pub struct IngestBatcher<S, C> {
    store: Arc<S>,
    configs: C,
    queues: IngestQueues,
}

impl<S: BatcherStore, C: TableConfigProvider> IngestBatcher<S, C> {
    /// Creates a batcher.
    pub fn new(store: Arc<S>, configs: C, queues: IngestQueues) -> Self {
        Self {
            store,
            configs,
            queues,
        }
    }

    /// Runs one batching pass over all pending requests.
    ///
    /// Returns the jobs that were successfully assigned and enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading the pending set fails; per-table
    /// and per-batch failures are logged and skipped so one bad table
    /// cannot stall the others.
    pub async fn batch_files(&self) -> Result<Vec<IngestJob>> {
        let pending = self.store.pending_oldest_first().await?;

        // Group by table; BTreeMap gives a deterministic table order.
        let mut by_table: BTreeMap<String, Vec<FileIngestRequest>> = BTreeMap::new();
        for request in pending {
            by_table
                .entry(request.table_name.clone())
                .or_default()
                .push(request);
        }

        let mut jobs = Vec::new();
        for (table_name, files) in by_table {
            let Some(config) = self.configs.config_for(&table_name) else {
                tracing::warn!(table = %table_name, "no batcher configuration, leaving files pending");
                continue;
            };
            if !should_flush(&files, &config) {
                continue;
            }
            for batch in pack_first_fit(files, &config) {
                match self.send_batch(&table_name, &config, batch).await {
                    Ok(job) => jobs.push(job),
                    Err(e) => {
                        tracing::error!(table = %table_name, error = %e, "failed to dispatch batch");
                    }
                }
            }
        }
        Ok(jobs)
    }

    /// Assigns the batch, then enqueues the job - in that order.
    ///
    /// Assignment failure aborts the send. Enqueue failure after a
    /// successful assignment leaves an assigned-but-unsent job for
    /// reconciliation; this is logged loudly rather than hidden.
    async fn send_batch(
        &self,
        table_name: &str,
        config: &TableBatchConfig,
        batch: Vec<FileIngestRequest>,
    ) -> Result<IngestJob> {
        let job = IngestJob {
            id: IngestJob::new_id(),
            table_name: table_name.to_string(),
            files: batch.iter().map(|f| f.file.clone()).collect(),
        };

        self.store.assign_job(&job.id, &batch).await?;

        let body = serde_json::to_string(&job).map_err(|e| IngestError::Queue {
            message: format!("failed to encode job: {e}"),
        })?;
        let queue = if config.ingest_mode.is_bulk_import() {
            &self.queues.bulk_import
        } else {
            &self.queues.standard
        };
        if let Err(e) = queue.send(body).await {
            tracing::error!(
                job_id = %job.id,
                table = %table_name,
                error = %e,
                "job assigned but not enqueued; needs reconciliation"
            );
            return Err(IngestError::Queue {
                message: e.to_string(),
            });
        }

        tracing::info!(
            job_id = %job.id,
            table = %table_name,
            file_count = job.files.len(),
            "dispatched ingest job"
        );
        Ok(job)
    }
}

/// The emission gate: size thresholds met, or latency bound exceeded.
fn should_flush(files: &[FileIngestRequest], config: &TableBatchConfig) -> bool {
    let total_bytes: u64 = files.iter().map(|f| f.file_size_bytes).sum();
    if files.len() >= config.min_files && total_bytes >= config.min_bytes {
        return true;
    }
    let age_cutoff = Utc::now() - config.max_file_age;
    files.iter().any(|f| f.received_time < age_cutoff)
}

/// First-fit bin packing under the per-job file-count and byte budgets.
///
/// A file larger than the byte budget still opens (and overfills) its own
/// batch; refusing it would strand the file forever.
fn pack_first_fit(
    files: Vec<FileIngestRequest>,
    config: &TableBatchConfig,
) -> Vec<Vec<FileIngestRequest>> {
    struct Batch {
        files: Vec<FileIngestRequest>,
        remaining_bytes: u64,
    }

    let mut batches: Vec<Batch> = Vec::new();
    for file in files {
        let slot = batches.iter_mut().find(|b| {
            b.files.len() < config.max_files && file.file_size_bytes <= b.remaining_bytes
        });
        match slot {
            Some(batch) => {
                batch.remaining_bytes = batch.remaining_bytes.saturating_sub(file.file_size_bytes);
                batch.files.push(file);
            }
            None => {
                let remaining_bytes = config.max_bytes.saturating_sub(file.file_size_bytes);
                batches.push(Batch {
                    files: vec![file],
                    remaining_bytes,
                });
            }
        }
    }
    batches.into_iter().map(|b| b.files).collect()
}
