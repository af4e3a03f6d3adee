//! Error types and result aliases shared across Strata components.
//!
//! Domain-specific errors (state store conflicts, tracker lifecycle
//! violations) live in their own crates; this module covers the primitives:
//! schema validation, storage, and serialization.

use std::fmt;

/// The result type used throughout `strata-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A schema failed validation.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of what made the schema invalid.
        message: String,
    },

    /// A record did not match the schema it was read against.
    #[error("record does not match schema: {message}")]
    RecordMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A partition tree failed a structural invariant.
    #[error("invalid partition tree: {message}")]
    InvalidPartitionTree {
        /// Description of the violated invariant.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The requested object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new schema validation error.
    #[must_use]
    pub fn invalid_schema(message: impl fmt::Display) -> Self {
        Self::InvalidSchema {
            message: message.to_string(),
        }
    }

    /// Creates a new record mismatch error.
    #[must_use]
    pub fn record_mismatch(message: impl fmt::Display) -> Self {
        Self::RecordMismatch {
            message: message.to_string(),
        }
    }
}
