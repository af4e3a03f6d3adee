//! Error types for the ingest batcher.

/// The result type used throughout `strata-ingest`.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that can occur while batching ingest requests.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A file request is already assigned to an ingest job.
    #[error("file '{file}' already assigned to job '{job_id}'")]
    AlreadyAssigned {
        /// The contested file.
        file: String,
        /// The job holding it.
        job_id: String,
    },

    /// A file request was not found in the batcher store.
    #[error("no pending request for file '{file}'")]
    RequestNotFound {
        /// The missing file.
        file: String,
    },

    /// No batching configuration exists for a table.
    #[error("no batcher configuration for table '{table_name}'")]
    UnknownTable {
        /// The unconfigured table.
        table_name: String,
    },

    /// The batcher's own store failed.
    #[error("batcher store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// Enqueueing an ingest job failed.
    #[error("queue error: {message}")]
    Queue {
        /// Description of the failure.
        message: String,
    },
}
