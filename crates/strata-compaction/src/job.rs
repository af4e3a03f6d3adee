//! Compaction job descriptions and their queue message form.
//!
//! A job is created once and never changes; status updates reference it by
//! id. Internally the output shape is a sum type (one file, or two files
//! split across child partitions); on the wire it flattens into the
//! `isSplittingJob`/`dimension` message format workers consume.

use serde::{Deserialize, Serialize};

use crate::error::CompactionError;

/// Outputs of a splitting compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutputs {
    /// Partition receiving records below the split point.
    pub left_partition_id: String,
    /// Partition receiving the remaining records.
    pub right_partition_id: String,
    /// Output file written into the left partition.
    pub left_output_file: String,
    /// Output file written into the right partition.
    pub right_output_file: String,
    /// The row-key dimension the records are split on.
    pub dimension: usize,
}

/// Where a compaction writes its merged stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutput {
    /// One output file in the job's own partition.
    Standard {
        /// The output filename.
        output_file: String,
    },
    /// Two output files, one per child partition.
    Splitting(SplitOutputs),
}

/// An immutable description of one compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobMessage", into = "JobMessage")]
pub struct CompactionJob {
    /// Unique job id.
    pub id: String,
    /// The table being compacted.
    pub table_name: String,
    /// The partition whose files are merged.
    pub partition_id: String,
    /// Input files, all active in `partition_id`.
    pub input_files: Vec<String>,
    /// Output shape.
    pub output: CompactionOutput,
}

impl CompactionJob {
    /// Creates a standard job merging into one output file.
    #[must_use]
    pub fn standard(
        id: impl Into<String>,
        table_name: impl Into<String>,
        partition_id: impl Into<String>,
        input_files: Vec<String>,
        output_file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            table_name: table_name.into(),
            partition_id: partition_id.into(),
            input_files,
            output: CompactionOutput::Standard {
                output_file: output_file.into(),
            },
        }
    }

    /// Creates a splitting job writing into two child partitions.
    #[must_use]
    pub fn splitting(
        id: impl Into<String>,
        table_name: impl Into<String>,
        partition_id: impl Into<String>,
        input_files: Vec<String>,
        outputs: SplitOutputs,
    ) -> Self {
        Self {
            id: id.into(),
            table_name: table_name.into(),
            partition_id: partition_id.into(),
            input_files,
            output: CompactionOutput::Splitting(outputs),
        }
    }

    /// Returns true if this job splits across child partitions.
    #[must_use]
    pub const fn is_splitting(&self) -> bool {
        matches!(self.output, CompactionOutput::Splitting(_))
    }

    /// Returns every output filename.
    #[must_use]
    pub fn output_files(&self) -> Vec<&str> {
        match &self.output {
            CompactionOutput::Standard { output_file } => vec![output_file],
            CompactionOutput::Splitting(split) => {
                vec![&split.left_output_file, &split.right_output_file]
            }
        }
    }

    /// Generates a fresh job id.
    #[must_use]
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// The flattened queue message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobMessage {
    job_id: String,
    table_name: String,
    partition_id: String,
    input_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<String>,
    is_splitting_job: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    left_partition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    right_partition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    left_output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    right_output_file: Option<String>,
}

impl From<CompactionJob> for JobMessage {
    fn from(job: CompactionJob) -> Self {
        let mut message = Self {
            job_id: job.id,
            table_name: job.table_name,
            partition_id: job.partition_id,
            input_files: job.input_files,
            output_file: None,
            is_splitting_job: false,
            dimension: None,
            left_partition_id: None,
            right_partition_id: None,
            left_output_file: None,
            right_output_file: None,
        };
        match job.output {
            CompactionOutput::Standard { output_file } => {
                message.output_file = Some(output_file);
            }
            CompactionOutput::Splitting(split) => {
                message.is_splitting_job = true;
                message.dimension = Some(split.dimension);
                message.left_partition_id = Some(split.left_partition_id);
                message.right_partition_id = Some(split.right_partition_id);
                message.left_output_file = Some(split.left_output_file);
                message.right_output_file = Some(split.right_output_file);
            }
        }
        message
    }
}

impl TryFrom<JobMessage> for CompactionJob {
    type Error = CompactionError;

    fn try_from(message: JobMessage) -> Result<Self, Self::Error> {
        let output = if message.is_splitting_job {
            match (
                message.dimension,
                message.left_partition_id,
                message.right_partition_id,
                message.left_output_file,
                message.right_output_file,
            ) {
                (
                    Some(dimension),
                    Some(left_partition_id),
                    Some(right_partition_id),
                    Some(left_output_file),
                    Some(right_output_file),
                ) => CompactionOutput::Splitting(SplitOutputs {
                    left_partition_id,
                    right_partition_id,
                    left_output_file,
                    right_output_file,
                    dimension,
                }),
                _ => {
                    return Err(CompactionError::InvalidJob {
                        job_id: message.job_id,
                        message: "splitting job missing dimension, child partitions, or outputs"
                            .into(),
                    })
                }
            }
        } else {
            match message.output_file {
                Some(output_file) => CompactionOutput::Standard { output_file },
                None => {
                    return Err(CompactionError::InvalidJob {
                        job_id: message.job_id,
                        message: "standard job missing outputFile".into(),
                    })
                }
            }
        };
        Ok(Self {
            id: message.job_id,
            table_name: message.table_name,
            partition_id: message.partition_id,
            input_files: message.input_files,
            output,
        })
    }
}
