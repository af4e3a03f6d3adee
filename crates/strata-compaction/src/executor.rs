//! The compaction executor: merge, write, commit, report.
//!
//! The commit protocol is strict about what happens on failure. Any error
//! before the state store mutation aborts with nothing changed. A commit
//! conflict leaves the freshly written output orphaned in the blob store
//! (cleaned up out-of-band) and is re-raised so the caller can alert;
//! either way the job always gets a terminal status event, so monitoring
//! never shows a job stuck "started" once its task is gone.

use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;

use strata_core::observability::job_span;
use strata_core::{KeyValue, PartitionTree, Record, Schema};
use strata_statestore::{StateStore, StateStoreError};
use strata_tracker::{JobStatusStore, RecordsProcessedSummary};

use crate::error::{CompactionError, Result};
use crate::job::{CompactionJob, CompactionOutput, SplitOutputs};
use crate::merge::{IdentityTransformer, MergeIterator, RecordTransformer};
use crate::sorted_file::{SortedFileStore, SortedFileWriter};

/// Builds a fresh transformer for each job execution.
pub type TransformerFactory = Arc<dyn Fn() -> Box<dyn RecordTransformer> + Send + Sync>;

/// Executes compaction jobs against a state store and a sorted file store.
pub struct CompactionExecutor {
    schema: Schema,
    state_store: Arc<dyn StateStore>,
    file_store: Arc<dyn SortedFileStore>,
    job_status: Arc<dyn JobStatusStore>,
    transformer_factory: TransformerFactory,
}

impl CompactionExecutor {
    /// Creates an executor with the identity transformation.
    pub fn new(
        schema: Schema,
        state_store: Arc<dyn StateStore>,
        file_store: Arc<dyn SortedFileStore>,
        job_status: Arc<dyn JobStatusStore>,
    ) -> Self {
        Self {
            schema,
            state_store,
            file_store,
            job_status,
            transformer_factory: Arc::new(|| Box::new(IdentityTransformer)),
        }
    }

    /// Replaces the record transformation applied to the merged stream.
    #[must_use]
    pub fn with_transformer(mut self, factory: TransformerFactory) -> Self {
        self.transformer_factory = factory;
        self
    }

    /// Runs one job and reports its lifecycle to the status store.
    ///
    /// A terminal status event is recorded whether the job succeeds or
    /// fails; failures report a zero-record summary and the error is
    /// re-raised.
    ///
    /// # Errors
    ///
    /// Returns the execution error after recording the terminal event.
    pub async fn run(
        &self,
        job: &CompactionJob,
        task_id: &str,
    ) -> Result<RecordsProcessedSummary> {
        let span = job_span(&job.id, &job.table_name, &job.partition_id);
        self.run_reported(job, task_id).instrument(span).await
    }

    async fn run_reported(
        &self,
        job: &CompactionJob,
        task_id: &str,
    ) -> Result<RecordsProcessedSummary> {
        let start_time = Utc::now();
        self.job_status
            .job_started(&job.id, task_id, start_time)
            .await?;

        let result = self.execute(job).await;
        let finish_time = Utc::now();

        match result {
            Ok((records_read, records_written)) => {
                let summary = RecordsProcessedSummary::new(
                    records_read,
                    records_written,
                    start_time,
                    finish_time,
                );
                self.job_status
                    .job_finished(&job.id, task_id, summary)
                    .await?;
                tracing::info!(
                    records_read,
                    records_written,
                    duration_ms = summary.duration().num_milliseconds(),
                    "compaction job finished"
                );
                Ok(summary)
            }
            Err(error) => {
                // The terminal event must land even though the job failed;
                // losing it would leave the job "started" forever.
                let summary = RecordsProcessedSummary::none_processed(start_time, finish_time);
                if let Err(status_error) = self
                    .job_status
                    .job_finished(&job.id, task_id, summary)
                    .await
                {
                    tracing::error!(
                        error = %status_error,
                        "failed to record terminal status for failed job"
                    );
                }
                tracing::error!(error = %error, "compaction job failed");
                Err(error)
            }
        }
    }

    /// The merge-write-commit pipeline. Returns `(records_read, records_written)`.
    async fn execute(&self, job: &CompactionJob) -> Result<(u64, u64)> {
        let mut sources = Vec::with_capacity(job.input_files.len());
        for filename in &job.input_files {
            let reader = self
                .file_store
                .open_reader(filename)
                .await
                .map_err(|e| CompactionError::corrupt_input(filename, e))?;
            sources.push((filename.clone(), reader));
        }
        let mut merge = MergeIterator::new(self.schema.clone(), sources)
            .map_err(|e| CompactionError::InputFileCorrupt {
                message: e.to_string(),
            })?;
        let mut transformer = (self.transformer_factory)();

        let (records_read, records_written, outputs) = match &job.output {
            CompactionOutput::Standard { output_file } => {
                let writer = self.open_writer(output_file).await?;
                let mut sink = SingleSink { writer };
                let counts = self
                    .drain(&mut merge, transformer.as_mut(), &mut sink)
                    .await?;
                let written = sink.writer.finish().await.map_err(|e| {
                    CompactionError::OutputWrite {
                        message: e.to_string(),
                    }
                })?;
                (
                    counts.0,
                    counts.1,
                    vec![written.to_file_reference(&job.partition_id)],
                )
            }
            CompactionOutput::Splitting(split) => {
                let boundary = self.lookup_split_boundary(job, split).await?;
                let left = self.open_writer(&split.left_output_file).await?;
                let right = self.open_writer(&split.right_output_file).await?;
                let mut sink = SplitSink {
                    schema: &self.schema,
                    dimension: split.dimension,
                    split_point: boundary,
                    left,
                    right,
                };
                let counts = self
                    .drain(&mut merge, transformer.as_mut(), &mut sink)
                    .await?;
                let left_written =
                    sink.left.finish().await.map_err(|e| CompactionError::OutputWrite {
                        message: e.to_string(),
                    })?;
                let right_written =
                    sink.right.finish().await.map_err(|e| CompactionError::OutputWrite {
                        message: e.to_string(),
                    })?;
                (
                    counts.0,
                    counts.1,
                    vec![
                        left_written.to_file_reference(&split.left_partition_id),
                        right_written.to_file_reference(&split.right_partition_id),
                    ],
                )
            }
        };

        self.state_store
            .atomically_update_files_to_ready_for_gc_and_create_new_active_files(
                Some(&job.id),
                &job.input_files,
                outputs,
            )
            .await
            .map_err(|e| match e {
                StateStoreError::Conflict { .. } => CompactionError::CommitConflict {
                    job_id: job.id.clone(),
                    source: e,
                },
                other => CompactionError::StateStore(other),
            })?;

        Ok((records_read, records_written))
    }

    /// Streams the merged, transformed records into a sink.
    async fn drain(
        &self,
        merge: &mut MergeIterator,
        transformer: &mut dyn RecordTransformer,
        sink: &mut dyn RecordSink,
    ) -> Result<(u64, u64)> {
        let mut records_read = 0_u64;
        let mut records_written = 0_u64;

        loop {
            let Some(record) = merge
                .next_record()
                .map_err(|e| CompactionError::InputFileCorrupt {
                    message: e.to_string(),
                })?
            else {
                break;
            };
            records_read += 1;
            if let Some(out) = transformer
                .push(record)
                .map_err(|e| CompactionError::InputFileCorrupt {
                    message: e.to_string(),
                })?
            {
                sink.write(out).await?;
                records_written += 1;
            }
        }
        if let Some(out) = transformer
            .flush()
            .map_err(|e| CompactionError::InputFileCorrupt {
                message: e.to_string(),
            })?
        {
            sink.write(out).await?;
            records_written += 1;
        }
        Ok((records_read, records_written))
    }

    async fn open_writer(&self, filename: &str) -> Result<Box<dyn SortedFileWriter>> {
        self.file_store
            .open_writer(filename)
            .await
            .map_err(|e| CompactionError::OutputWrite {
                message: e.to_string(),
            })
    }

    /// Reads the split point from the authoritative partition tree and
    /// cross-checks it against the job description.
    async fn lookup_split_boundary(
        &self,
        job: &CompactionJob,
        split: &SplitOutputs,
    ) -> Result<KeyValue> {
        let partitions = self.state_store.get_all_partitions().await?;
        let tree = PartitionTree::new(partitions).map_err(|e| CompactionError::InvalidJob {
            job_id: job.id.clone(),
            message: format!("partition state is not a valid tree: {e}"),
        })?;
        let boundary =
            tree.split_boundary(&job.partition_id)
                .map_err(|e| CompactionError::InvalidJob {
                    job_id: job.id.clone(),
                    message: format!("partition '{}' has no split: {e}", job.partition_id),
                })?;
        if boundary.left_id != split.left_partition_id
            || boundary.right_id != split.right_partition_id
        {
            return Err(CompactionError::InvalidJob {
                job_id: job.id.clone(),
                message: format!(
                    "job children ({}, {}) disagree with partition tree ({}, {})",
                    split.left_partition_id,
                    split.right_partition_id,
                    boundary.left_id,
                    boundary.right_id
                ),
            });
        }
        if boundary.dimension != split.dimension {
            return Err(CompactionError::InvalidJob {
                job_id: job.id.clone(),
                message: format!(
                    "job splits on dimension {} but the partition split on {}",
                    split.dimension, boundary.dimension
                ),
            });
        }
        Ok(boundary.split_point)
    }
}

/// Destination for transformed records.
#[async_trait::async_trait]
trait RecordSink: Send {
    async fn write(&mut self, record: Record) -> Result<()>;
}

struct SingleSink {
    writer: Box<dyn SortedFileWriter>,
}

#[async_trait::async_trait]
impl RecordSink for SingleSink {
    async fn write(&mut self, record: Record) -> Result<()> {
        self.writer
            .write(&record)
            .await
            .map_err(|e| CompactionError::OutputWrite {
                message: e.to_string(),
            })
    }
}

/// Routes records across the split boundary: strictly below the split
/// point goes left, the rest right.
struct SplitSink<'a> {
    schema: &'a Schema,
    dimension: usize,
    split_point: KeyValue,
    left: Box<dyn SortedFileWriter>,
    right: Box<dyn SortedFileWriter>,
}

#[async_trait::async_trait]
impl RecordSink for SplitSink<'_> {
    async fn write(&mut self, record: Record) -> Result<()> {
        let key = self
            .schema
            .row_key_of(&record)
            .map_err(|e| CompactionError::InputFileCorrupt {
                message: e.to_string(),
            })?;
        let value = key
            .value(self.dimension)
            .ok_or_else(|| CompactionError::InputFileCorrupt {
                message: format!(
                    "record key {key} has no dimension {}",
                    self.dimension
                ),
            })?;
        let writer = if *value < self.split_point {
            &mut self.left
        } else {
            &mut self.right
        };
        writer
            .write(&record)
            .await
            .map_err(|e| CompactionError::OutputWrite {
                message: e.to_string(),
            })
    }
}
