//! Error types for status tracking.
//!
//! Lifecycle violations are programming or infrastructure bugs, not
//! recoverable conditions: the stores reject them loudly instead of
//! silently correcting history.

/// The result type used throughout `strata-tracker`.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can occur in status store operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// A task status update broke the started-then-finished state machine.
    #[error("task lifecycle violation for '{task_id}': {message}")]
    TaskLifecycleViolation {
        /// The task whose update was rejected.
        task_id: String,
        /// What was wrong.
        message: String,
    },

    /// A job status update broke the created-started-finished sequence.
    #[error("job lifecycle violation for '{job_id}': {message}")]
    JobLifecycleViolation {
        /// The job whose update was rejected.
        job_id: String,
        /// What was wrong.
        message: String,
    },

    /// The underlying status storage failed.
    #[error("status store error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl TrackerError {
    /// Creates a task lifecycle violation.
    #[must_use]
    pub fn task_violation(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskLifecycleViolation {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    /// Creates a job lifecycle violation.
    #[must_use]
    pub fn job_violation(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JobLifecycleViolation {
            job_id: job_id.into(),
            message: message.into(),
        }
    }
}
