//! # strata-core
//!
//! Core abstractions for Strata, a partitioned data-lake store over sorted
//! record files.
//!
//! This crate provides the types shared by every component:
//!
//! - **Schema & Records**: row-key/sort-key/value field model and ordering
//! - **Partitions**: the binary split tree and key-space regions
//! - **File Metadata**: lifecycle records for sorted files
//! - **Metadata Store**: the conditional-write key/value seam that gives
//!   the state store its compare-and-swap guarantees
//! - **Observability**: logging init and span helpers
//!
//! ## Crate boundary
//!
//! `strata-core` defines contracts only; policies (how files move between
//! states, how jobs are executed) live in the component crates.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod file;
pub mod key;
pub mod observability;
pub mod partition;
pub mod queue;
pub mod record;
pub mod region;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use file::{FileReference, FileStatus};
pub use key::{Key, KeyValue};
pub use observability::{init_logging, LogFormat};
pub use partition::{
    new_partition_id, Partition, PartitionTree, PartitionsBuilder, SplitBoundary,
};
pub use queue::{InMemoryMessageQueue, MessageQueue, QueueMessage};
pub use record::Record;
pub use region::{KeyRange, Region};
pub use schema::{ColumnType, Field, Schema};
pub use store::{InMemoryMetadataStore, MetadataStore, WritePrecondition, WriteResult};
