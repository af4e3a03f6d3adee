//! Error types for state store operations.
//!
//! The split between [`StateStoreError::Conflict`] and
//! [`StateStoreError::Unavailable`] is load-bearing: a conflict means a
//! semantic precondition failed and the operation must never be blindly
//! retried (retrying a commit could double-apply a compaction); unavailable
//! means transient infrastructure trouble and the whole call is safe to
//! retry.

/// The result type used throughout `strata-statestore`.
pub type Result<T> = std::result::Result<T, StateStoreError>;

/// Errors that can occur in state store operations.
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    /// A semantic precondition was violated. Fatal to the current attempt.
    #[error("state store conflict: {message}")]
    Conflict {
        /// Description of the violated precondition.
        message: String,
    },

    /// A file is already reserved by a job.
    ///
    /// Callers treat this as a benign race: skip the file and let the
    /// holding job proceed.
    #[error("file '{filename}' already assigned to job '{assigned_to}'")]
    JobAssignmentConflict {
        /// The contested file.
        filename: String,
        /// The job currently holding it.
        assigned_to: String,
    },

    /// Transient infrastructure fault. The whole call is safe to retry.
    #[error("state store unavailable: {message}")]
    Unavailable {
        /// Description of the fault.
        message: String,
    },

    /// The partition tree has not been initialised for this table.
    #[error("state store not initialised for table '{table_name}'")]
    NotInitialised {
        /// The table that is missing its partition tree.
        table_name: String,
    },

    /// The partition tree was already initialised.
    #[error("state store already initialised for table '{table_name}'")]
    AlreadyInitialised {
        /// The table that was initialised twice.
        table_name: String,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("state store serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },
}

impl StateStoreError {
    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Wraps an underlying storage fault as a transient error.
    #[must_use]
    pub fn unavailable(source: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: source.to_string(),
        }
    }

    /// Returns true if retrying the whole call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
