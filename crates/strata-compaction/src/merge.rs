//! K-way merge over sorted record files, and the pluggable transformation
//! applied to the merged stream.
//!
//! The merge walks N per-file iterators through a min-heap keyed by the
//! schema's ordering key (row keys, then sort keys). Ties between sources
//! break by source index, which keeps the merge deterministic and stable:
//! equal keys come out in input-file order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use strata_core::{Error, Key, Record, Result, Schema};

use crate::sorted_file::RecordIterator;

/// A record waiting in the merge heap.
struct HeapEntry {
    key: Key,
    /// Index into the sources array; lower index wins ties.
    source: usize,
    record: Record,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse both comparisons so the
        // smallest key (and on ties, the lowest source index) pops first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges N sorted record iterators into one sorted stream.
pub struct MergeIterator {
    schema: Schema,
    sources: Vec<MergeSource>,
    heap: BinaryHeap<HeapEntry>,
}

struct MergeSource {
    filename: String,
    iterator: Box<dyn RecordIterator>,
}

impl MergeIterator {
    /// Creates a merge over `(filename, iterator)` sources.
    ///
    /// The filename is only used to attribute read errors.
    ///
    /// # Errors
    ///
    /// Returns an error if priming any source fails.
    pub fn new(
        schema: Schema,
        sources: Vec<(String, Box<dyn RecordIterator>)>,
    ) -> Result<Self> {
        let mut merge = Self {
            schema,
            sources: sources
                .into_iter()
                .map(|(filename, iterator)| MergeSource { filename, iterator })
                .collect(),
            heap: BinaryHeap::new(),
        };
        for index in 0..merge.sources.len() {
            merge.advance(index)?;
        }
        Ok(merge)
    }

    /// Returns the next record in ordering-key order, or `None` when all
    /// sources are exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from a source fails or a record does
    /// not match the schema.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(top) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(top.source)?;
        Ok(Some(top.record))
    }

    /// Pulls the next record from one source into the heap.
    fn advance(&mut self, index: usize) -> Result<()> {
        let source = &mut self.sources[index];
        let next = source.iterator.next_record().map_err(|e| {
            Error::storage(format!("merge input '{}': {e}", source.filename))
        })?;
        if let Some(record) = next {
            let key = self.schema.ordering_key_of(&record).map_err(|e| {
                Error::storage(format!("merge input '{}': {e}", source.filename))
            })?;
            self.heap.push(HeapEntry {
                key,
                source: index,
                record,
            });
        }
        Ok(())
    }
}

/// A streaming transformation over the merged record stream.
///
/// Implementations see records in ordering-key order and may drop or
/// rewrite them (deduplication, aggregation). Externally supplied per
/// table; the executor applies whatever it is given.
pub trait RecordTransformer: Send {
    /// Processes the next record; returns a record ready to emit, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be processed.
    fn push(&mut self, record: Record) -> Result<Option<Record>>;

    /// Emits any record still held back at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending record cannot be finalized.
    fn flush(&mut self) -> Result<Option<Record>>;
}

/// Pass-through transformer: every record is emitted unchanged.
#[derive(Debug, Default)]
pub struct IdentityTransformer;

impl RecordTransformer for IdentityTransformer {
    fn push(&mut self, record: Record) -> Result<Option<Record>> {
        Ok(Some(record))
    }

    fn flush(&mut self) -> Result<Option<Record>> {
        Ok(None)
    }
}

/// Collapses runs of records with equal ordering keys, keeping the first.
///
/// Because the merge is stable, "first" means the record from the
/// lowest-indexed input file.
pub struct DedupingTransformer {
    schema: Schema,
    pending: Option<(Key, Record)>,
}

impl DedupingTransformer {
    /// Creates a deduplicating transformer for the given schema.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            pending: None,
        }
    }
}

impl RecordTransformer for DedupingTransformer {
    fn push(&mut self, record: Record) -> Result<Option<Record>> {
        let key = self.schema.ordering_key_of(&record)?;
        match &self.pending {
            Some((pending_key, _)) if *pending_key == key => Ok(None),
            _ => Ok(self
                .pending
                .replace((key, record))
                .map(|(_, previous)| previous)),
        }
    }

    fn flush(&mut self) -> Result<Option<Record>> {
        Ok(self.pending.take().map(|(_, record)| record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ColumnType, Field, KeyValue};

    fn schema() -> Schema {
        Schema::with_int64_key("key", vec![Field::new("value", ColumnType::String)])
            .expect("schema")
    }

    fn record(key: i64, value: &str) -> Record {
        Record::from_entries([
            ("key", KeyValue::Int64(key)),
            ("value", KeyValue::from(value)),
        ])
    }

    struct FixedIterator(std::vec::IntoIter<Record>);

    impl RecordIterator for FixedIterator {
        fn next_record(&mut self) -> Result<Option<Record>> {
            Ok(self.0.next())
        }
    }

    fn source(name: &str, records: Vec<Record>) -> (String, Box<dyn RecordIterator>) {
        (name.to_string(), Box::new(FixedIterator(records.into_iter())))
    }

    fn drain(merge: &mut MergeIterator) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(record) = merge.next_record().expect("merge") {
            out.push(record);
        }
        out
    }

    #[test]
    fn merge_interleaves_sorted_sources() {
        let mut merge = MergeIterator::new(
            schema(),
            vec![
                source("a", vec![record(1, "a"), record(4, "a"), record(6, "a")]),
                source("b", vec![record(2, "b"), record(3, "b"), record(5, "b")]),
            ],
        )
        .expect("merge");

        let keys: Vec<_> = drain(&mut merge)
            .iter()
            .map(|r| r.get("key").cloned().expect("key"))
            .collect();
        assert_eq!(
            keys,
            (1..=6).map(KeyValue::Int64).collect::<Vec<_>>(),
            "merged stream must be globally sorted"
        );
    }

    #[test]
    fn merge_is_stable_across_equal_keys() {
        let mut merge = MergeIterator::new(
            schema(),
            vec![
                source("a", vec![record(1, "from-a")]),
                source("b", vec![record(1, "from-b")]),
            ],
        )
        .expect("merge");

        let records = drain(&mut merge);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("value"), Some(&KeyValue::from("from-a")));
        assert_eq!(records[1].get("value"), Some(&KeyValue::from("from-b")));
    }

    #[test]
    fn merge_of_empty_sources_is_empty() {
        let mut merge = MergeIterator::new(
            schema(),
            vec![source("a", vec![]), source("b", vec![])],
        )
        .expect("merge");
        assert!(drain(&mut merge).is_empty());
    }

    #[test]
    fn merge_reports_schema_mismatch_with_filename() {
        let bad = Record::from_entries([("wrong_field", KeyValue::Int64(1))]);
        let result = MergeIterator::new(schema(), vec![source("data/bad-file", vec![bad])]);
        let error = result.err().expect("must fail");
        assert!(error.to_string().contains("data/bad-file"));
    }

    #[test]
    fn dedup_keeps_first_of_each_key_run() {
        let mut transformer = DedupingTransformer::new(schema());
        let mut out = Vec::new();
        for record in [
            record(1, "keep"),
            record(1, "drop"),
            record(2, "keep"),
            record(3, "keep"),
            record(3, "drop"),
        ] {
            if let Some(emitted) = transformer.push(record).expect("push") {
                out.push(emitted);
            }
        }
        if let Some(emitted) = transformer.flush().expect("flush") {
            out.push(emitted);
        }

        assert_eq!(out.len(), 3);
        assert!(out
            .iter()
            .all(|r| r.get("value") == Some(&KeyValue::from("keep"))));
    }

    #[test]
    fn identity_transformer_passes_everything() {
        let mut transformer = IdentityTransformer;
        assert!(transformer.push(record(1, "x")).expect("push").is_some());
        assert!(transformer.flush().expect("flush").is_none());
    }
}
