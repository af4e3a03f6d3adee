//! The sorted-record-file seam.
//!
//! Production deployments read and write sorted files through an external
//! columnar library; the executor only needs three things from it: ordered
//! iteration by row key, streaming sequential write, and cheap min/max/count
//! on close. These traits capture exactly that contract.
//!
//! [`JsonRowFileStore`] is the in-process implementation used by tests and
//! local runs: one JSON record per line, stored through the blob seam.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use strata_core::store::{MetadataStore, WritePrecondition, WriteResult};
use strata_core::{Error, FileReference, Key, Record, Result, Schema};

/// Pull-based iterator over a file's records in row-key order.
///
/// Reading is lazy per file; a failed read surfaces as an error from
/// [`RecordIterator::next_record`] rather than a panic.
pub trait RecordIterator: Send {
    /// Returns the next record, or `None` when the file is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying file is unreadable or malformed.
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Statistics gathered while writing one output file.
///
/// Maintained streamingly so the file's metadata record can be built
/// without a second pass over the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// The filename written.
    pub filename: String,
    /// Number of records written.
    pub record_count: u64,
    /// Minimum row key written; `None` for an empty file.
    pub min_key: Option<Key>,
    /// Maximum row key written; `None` for an empty file.
    pub max_key: Option<Key>,
}

impl WrittenFile {
    /// Builds the active file record for this output in the given partition.
    #[must_use]
    pub fn to_file_reference(&self, partition_id: &str) -> FileReference {
        match (&self.min_key, &self.max_key) {
            (Some(min), Some(max)) => FileReference::active(
                &self.filename,
                partition_id,
                min.clone(),
                max.clone(),
                self.record_count,
            ),
            _ => FileReference::active_empty(&self.filename, partition_id),
        }
    }
}

/// Streaming writer for one sorted output file.
#[async_trait]
pub trait SortedFileWriter: Send {
    /// Appends one record. Records must arrive in row-key order.
    async fn write(&mut self, record: &Record) -> Result<()>;

    /// Finishes the file and returns its statistics.
    async fn finish(self: Box<Self>) -> Result<WrittenFile>;
}

/// Factory for readers and writers over sorted record files.
#[async_trait]
pub trait SortedFileStore: Send + Sync {
    /// Opens a file for ordered iteration.
    async fn open_reader(&self, filename: &str) -> Result<Box<dyn RecordIterator>>;

    /// Opens a streaming writer for a new file.
    async fn open_writer(&self, filename: &str) -> Result<Box<dyn SortedFileWriter>>;
}

/// JSON-lines sorted file store over a blob store.
///
/// Each file is one blob, one JSON record per line. Files are immutable:
/// the final write uses a does-not-exist precondition, so a retried task
/// cannot clobber an output another attempt already produced.
#[derive(Debug, Clone)]
pub struct JsonRowFileStore<M> {
    blobs: Arc<M>,
    schema: Schema,
}

impl<M: MetadataStore> JsonRowFileStore<M> {
    /// Creates a store writing through the given blob backend.
    pub fn new(blobs: Arc<M>, schema: Schema) -> Self {
        Self { blobs, schema }
    }
}

#[async_trait]
impl<M: MetadataStore> SortedFileStore for JsonRowFileStore<M> {
    async fn open_reader(&self, filename: &str) -> Result<Box<dyn RecordIterator>> {
        let Some((bytes, _)) = self.blobs.get(filename).await? else {
            return Err(Error::NotFound(format!("sorted file '{filename}'")));
        };
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| Error::storage(format!("file '{filename}' is not UTF-8: {e}")))?;

        let mut records = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|e| Error::Serialization {
                message: format!("file '{filename}' line {}: {e}", line_number + 1),
            })?;
            records.push(record);
        }
        Ok(Box::new(VecRecordIterator {
            records: records.into_iter(),
        }))
    }

    async fn open_writer(&self, filename: &str) -> Result<Box<dyn SortedFileWriter>> {
        Ok(Box::new(JsonRowFileWriter {
            blobs: Arc::clone(&self.blobs),
            schema: self.schema.clone(),
            filename: filename.to_string(),
            buffer: Vec::new(),
            record_count: 0,
            min_key: None,
            max_key: None,
        }))
    }
}

struct VecRecordIterator {
    records: std::vec::IntoIter<Record>,
}

impl RecordIterator for VecRecordIterator {
    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.next())
    }
}

struct JsonRowFileWriter<M> {
    blobs: Arc<M>,
    schema: Schema,
    filename: String,
    buffer: Vec<u8>,
    record_count: u64,
    min_key: Option<Key>,
    max_key: Option<Key>,
}

#[async_trait]
impl<M: MetadataStore> SortedFileWriter for JsonRowFileWriter<M> {
    async fn write(&mut self, record: &Record) -> Result<()> {
        let key = self.schema.row_key_of(record)?;
        let line = serde_json::to_vec(record).map_err(|e| Error::Serialization {
            message: format!("failed to encode record: {e}"),
        })?;
        self.buffer.extend_from_slice(&line);
        self.buffer.push(b'\n');
        self.record_count += 1;

        if self.min_key.is_none() {
            self.min_key = Some(key.clone());
        }
        self.max_key = Some(key);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<WrittenFile> {
        let result = self
            .blobs
            .put(
                &self.filename,
                Bytes::from(self.buffer),
                WritePrecondition::DoesNotExist,
            )
            .await?;
        match result {
            WriteResult::Success { .. } => Ok(WrittenFile {
                filename: self.filename,
                record_count: self.record_count,
                min_key: self.min_key,
                max_key: self.max_key,
            }),
            WriteResult::PreconditionFailed { .. } => Err(Error::storage(format!(
                "output file '{}' already exists",
                self.filename
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{InMemoryMetadataStore, KeyValue};

    fn schema() -> Schema {
        Schema::with_int64_key(
            "key",
            vec![strata_core::Field::new("value", strata_core::ColumnType::String)],
        )
        .expect("schema")
    }

    fn record(key: i64, value: &str) -> Record {
        Record::from_entries([
            ("key", KeyValue::Int64(key)),
            ("value", KeyValue::from(value)),
        ])
    }

    #[tokio::test]
    async fn write_then_read_preserves_order_and_stats() {
        let blobs = Arc::new(InMemoryMetadataStore::new());
        let store = JsonRowFileStore::new(blobs, schema());

        let mut writer = store.open_writer("data/f1").await.expect("open writer");
        for i in 0..5 {
            writer.write(&record(i, "v")).await.expect("write");
        }
        let written = writer.finish().await.expect("finish");

        assert_eq!(written.record_count, 5);
        assert_eq!(written.min_key, Some(Key::of(0_i64)));
        assert_eq!(written.max_key, Some(Key::of(4_i64)));

        let mut reader = store.open_reader("data/f1").await.expect("open reader");
        let mut keys = Vec::new();
        while let Some(record) = reader.next_record().expect("read") {
            keys.push(record.get("key").cloned());
        }
        assert_eq!(keys.len(), 5);
        assert_eq!(keys[0], Some(KeyValue::Int64(0)));
        assert_eq!(keys[4], Some(KeyValue::Int64(4)));
    }

    #[tokio::test]
    async fn empty_file_has_no_key_bounds() {
        let blobs = Arc::new(InMemoryMetadataStore::new());
        let store = JsonRowFileStore::new(blobs, schema());

        let writer = store.open_writer("data/empty").await.expect("open writer");
        let written = writer.finish().await.expect("finish");

        assert_eq!(written.record_count, 0);
        assert!(written.min_key.is_none());
        let reference = written.to_file_reference("root");
        assert_eq!(reference.record_count, 0);
        assert!(reference.min_key.is_none());
    }

    #[tokio::test]
    async fn reading_a_missing_file_fails() {
        let blobs = Arc::new(InMemoryMetadataStore::new());
        let store = JsonRowFileStore::new(blobs, schema());
        assert!(store.open_reader("ghost").await.is_err());
    }

    #[tokio::test]
    async fn reading_a_malformed_file_fails() {
        let blobs = Arc::new(InMemoryMetadataStore::new());
        blobs
            .put(
                "data/bad",
                Bytes::from("not json\n"),
                WritePrecondition::None,
            )
            .await
            .expect("put");
        let store = JsonRowFileStore::new(blobs, schema());
        assert!(store.open_reader("data/bad").await.is_err());
    }

    #[tokio::test]
    async fn outputs_are_immutable() {
        let blobs = Arc::new(InMemoryMetadataStore::new());
        let store = JsonRowFileStore::new(blobs, schema());

        let mut writer = store.open_writer("data/f1").await.expect("open");
        writer.write(&record(1, "v")).await.expect("write");
        writer.finish().await.expect("finish");

        let writer = store.open_writer("data/f1").await.expect("open again");
        assert!(writer.finish().await.is_err(), "second finish must not clobber");
    }
}
