//! # strata-tracker
//!
//! Lifecycle status tracking for Strata jobs and worker tasks.
//!
//! Status history is append-only: a retried job appends a fresh
//! started/finished pair and readers fold the whole sequence, so the
//! record of a failed attempt is never overwritten. Task lifecycles are
//! enforced strictly (started once, finished once, never resurrected) and
//! violations are hard errors.
//!
//! The trackers are deliberately independent of the state store: even a
//! job whose commit failed gets a terminal status event, so monitoring
//! never shows work stuck "in progress" after the task died.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod job;
pub mod store;
pub mod summary;
pub mod task;

pub use error::{Result, TrackerError};
pub use job::{JobCreated, JobRun, JobStatus, JobStatusRecord, JobStatusUpdate};
pub use store::memory::{InMemoryJobStatusStore, InMemoryTaskStatusStore};
pub use store::{JobStatusStore, TaskStatusStore};
pub use summary::RecordsProcessedSummary;
pub use task::{TaskFinished, TaskStatus};
