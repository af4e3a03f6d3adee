//! Error types for compaction execution.

use strata_statestore::StateStoreError;
use strata_tracker::TrackerError;

/// The result type used throughout `strata-compaction`.
pub type Result<T> = std::result::Result<T, CompactionError>;

/// Errors that can occur while executing a compaction job.
#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    /// An input file could not be read or did not match the schema.
    ///
    /// The job aborts before any state store mutation; the input file
    /// needs manual remediation.
    #[error("corrupt input file: {message}")]
    InputFileCorrupt {
        /// Description of the failure, naming the file where known.
        message: String,
    },

    /// The atomic commit was rejected by the state store.
    ///
    /// A strong signal of a racing duplicate execution. Never retried
    /// automatically: re-applying the commit could double-apply the
    /// merge. The written output file is orphaned and left for external
    /// cleanup.
    #[error("commit conflict for job '{job_id}'")]
    CommitConflict {
        /// The job whose commit lost.
        job_id: String,
        /// The underlying state store conflict.
        #[source]
        source: StateStoreError,
    },

    /// The job description is inconsistent (with itself or the partition tree).
    #[error("invalid job '{job_id}': {message}")]
    InvalidJob {
        /// The offending job.
        job_id: String,
        /// What was inconsistent.
        message: String,
    },

    /// Writing an output file failed.
    #[error("output write failed: {message}")]
    OutputWrite {
        /// Description of the failure.
        message: String,
    },

    /// A state store call failed outside the commit path.
    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    /// A status store call failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// A queue or serialization fault.
    #[error("queue error: {message}")]
    Queue {
        /// Description of the failure.
        message: String,
    },
}

impl CompactionError {
    /// Creates a corrupt-input error naming the file.
    #[must_use]
    pub fn corrupt_input(filename: &str, source: impl std::fmt::Display) -> Self {
        Self::InputFileCorrupt {
            message: format!("{filename}: {source}"),
        }
    }
}
