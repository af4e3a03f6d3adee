//! # strata-ingest
//!
//! The ingest batcher: groups arbitrary per-file ingest requests into
//! right-sized jobs per table.
//!
//! Files accumulate in the batcher's own store until a table's thresholds
//! open (minimum files and bytes) or a file ages past the latency bound.
//! Batches pack first-fit under per-job file-count and byte budgets, and
//! each batch is assigned in the store *before* its job is enqueued so a
//! crash between the two steps cannot put one file into two jobs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod batcher;
pub mod error;
pub mod job;
pub mod request;

pub use batcher::{IngestBatcher, IngestQueues, TableConfigProvider};
pub use error::{IngestError, Result};
pub use job::{IngestJob, IngestMode, TableBatchConfig};
pub use request::{BatcherStore, FileIngestRequest, InMemoryBatcherStore};
