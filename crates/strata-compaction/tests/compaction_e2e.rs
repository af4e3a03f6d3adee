//! End-to-end compaction scenarios against in-memory collaborators.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use strata_compaction::{
    CompactionError, CompactionExecutor, CompactionJob, CompactionRunner, DedupingTransformer,
    JsonRowFileStore, RunnerConfig, SortedFileStore, SplitOutputs,
};
use strata_core::{
    ColumnType, Field, InMemoryMessageQueue, InMemoryMetadataStore, KeyValue, MessageQueue,
    PartitionsBuilder, Record, Schema,
};
use strata_statestore::{SnapshotStateStore, StateStore};
use strata_tracker::{
    InMemoryJobStatusStore, InMemoryTaskStatusStore, JobCreated, JobStatusStore, TaskStatusStore,
};

struct Harness {
    state_store: Arc<SnapshotStateStore<InMemoryMetadataStore>>,
    file_store: Arc<JsonRowFileStore<InMemoryMetadataStore>>,
    job_status: Arc<InMemoryJobStatusStore>,
    task_status: Arc<InMemoryTaskStatusStore>,
    queue: Arc<InMemoryMessageQueue>,
    schema: Schema,
}

fn schema() -> Schema {
    Schema::with_int64_key("key", vec![Field::new("value", ColumnType::String)])
        .expect("valid schema")
}

fn harness() -> Harness {
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let blobs = Arc::new(InMemoryMetadataStore::new());
    let schema = schema();
    Harness {
        state_store: Arc::new(SnapshotStateStore::new(metadata, "events")),
        file_store: Arc::new(JsonRowFileStore::new(blobs, schema.clone())),
        job_status: Arc::new(InMemoryJobStatusStore::new()),
        task_status: Arc::new(InMemoryTaskStatusStore::new()),
        queue: Arc::new(InMemoryMessageQueue::new()),
        schema,
    }
}

impl Harness {
    fn executor(&self) -> CompactionExecutor {
        CompactionExecutor::new(
            self.schema.clone(),
            self.state_store.clone(),
            self.file_store.clone(),
            self.job_status.clone(),
        )
    }

    fn runner(&self, task_id: &str) -> CompactionRunner {
        CompactionRunner::new(
            task_id,
            self.queue.clone(),
            self.state_store.clone(),
            self.task_status.clone(),
            self.executor(),
            RunnerConfig {
                poll_interval: Duration::ZERO,
                max_consecutive_empty_polls: 1,
            },
        )
    }

    /// Writes a sorted input file with one record per key and registers it
    /// as active in the state store.
    async fn ingest_file(&self, filename: &str, partition_id: &str, keys: Range<i64>) {
        let mut writer = self
            .file_store
            .open_writer(filename)
            .await
            .expect("open writer");
        for key in keys {
            let record = Record::from_entries([
                ("key", KeyValue::Int64(key)),
                ("value", KeyValue::from(format!("v{key}"))),
            ]);
            writer.write(&record).await.expect("write record");
        }
        let written = writer.finish().await.expect("finish");
        self.state_store
            .add_files(vec![written.to_file_reference(partition_id)])
            .await
            .expect("add file");
    }

    async fn register_job(&self, job: &CompactionJob) {
        self.job_status
            .job_created(JobCreated {
                job_id: job.id.clone(),
                table_name: job.table_name.clone(),
                partition_id: job.partition_id.clone(),
                input_file_count: job.input_files.len(),
                splitting: job.is_splitting(),
            })
            .await
            .expect("job created");
    }

    async fn enqueue(&self, job: &CompactionJob) {
        self.queue
            .send(serde_json::to_string(job).expect("serialize job"))
            .await
            .expect("send");
    }

    async fn read_all(&self, filename: &str) -> Vec<i64> {
        let mut reader = self
            .file_store
            .open_reader(filename)
            .await
            .expect("open reader");
        let mut keys = Vec::new();
        while let Some(record) = reader.next_record().expect("read") {
            match record.get("key") {
                Some(KeyValue::Int64(key)) => keys.push(*key),
                other => panic!("unexpected key value: {other:?}"),
            }
        }
        keys
    }
}

/// Four 100-record active files on one partition, two jobs of two files
/// each: after the worker drains the queue, the active set is exactly the
/// two job outputs and the queue is empty.
#[tokio::test]
async fn worker_drains_queue_and_swaps_active_files() {
    let h = harness();
    h.ingest_file("in/f1", "root", 0..100).await;
    h.ingest_file("in/f2", "root", 100..200).await;
    h.ingest_file("in/f3", "root", 200..300).await;
    h.ingest_file("in/f4", "root", 300..400).await;

    let job1 = CompactionJob::standard(
        "job-1",
        "events",
        "root",
        vec!["in/f1".into(), "in/f2".into()],
        "out/merged-1",
    );
    let job2 = CompactionJob::standard(
        "job-2",
        "events",
        "root",
        vec!["in/f3".into(), "in/f4".into()],
        "out/merged-2",
    );
    for job in [&job1, &job2] {
        h.register_job(job).await;
        h.enqueue(job).await;
    }

    let outcome = h.runner("task-1").run().await.expect("task run");
    assert_eq!(outcome.jobs_executed, 2);
    assert_eq!(outcome.records_read, 400);
    assert_eq!(outcome.records_written, 400);

    // The active set is exactly the two outputs; no input is still active.
    let mut active: Vec<_> = h
        .state_store
        .get_active_files()
        .await
        .expect("active files")
        .into_iter()
        .map(|f| f.filename)
        .collect();
    active.sort_unstable();
    assert_eq!(active, ["out/merged-1", "out/merged-2"]);

    // Queue fully drained: nothing pending, nothing in flight.
    assert_eq!(h.queue.pending_count(), 0);
    assert_eq!(h.queue.in_flight_count(), 0);

    // Outputs are sorted and complete.
    let keys = h.read_all("out/merged-1").await;
    assert_eq!(keys.len(), 200);
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));

    // Task lifecycle is fully recorded.
    let task = h
        .task_status
        .get_task("task-1")
        .await
        .expect("get task")
        .expect("task status");
    let finished = task.finished.expect("task finished");
    assert_eq!(finished.job_runs, 2);
    assert_eq!(finished.records_read, 400);

    // Both jobs show a single finished run.
    for job_id in ["job-1", "job-2"] {
        let status = h
            .job_status
            .get_job(job_id)
            .await
            .expect("get job")
            .expect("job status");
        assert!(!status.is_unfinished(), "{job_id} must be finished");
    }
}

/// A splitting job routes merged records across the child boundary:
/// strictly below the split point left, the rest right, nothing lost.
#[tokio::test]
async fn splitting_job_partitions_records_at_boundary() {
    let h = harness();
    let tree = PartitionsBuilder::root_leaf("root", 1)
        .split("root", 0, 100_i64, "left", "right")
        .expect("split")
        .build()
        .expect("tree");
    h.state_store.initialise(tree.all()).await.expect("initialise");

    h.ingest_file("in/f1", "root", 0..150).await;
    h.ingest_file("in/f2", "root", 50..200).await;

    let job = CompactionJob::splitting(
        "job-split",
        "events",
        "root",
        vec!["in/f1".into(), "in/f2".into()],
        SplitOutputs {
            left_partition_id: "left".into(),
            right_partition_id: "right".into(),
            left_output_file: "out/left".into(),
            right_output_file: "out/right".into(),
            dimension: 0,
        },
    );
    h.register_job(&job).await;
    h.state_store
        .assign_job_to_files(&job.id, &job.input_files)
        .await
        .expect("assign");

    let summary = h.executor().run(&job, "task-1").await.expect("run");
    assert_eq!(summary.records_read, 300);
    assert_eq!(summary.records_written, 300);

    let left_keys = h.read_all("out/left").await;
    let right_keys = h.read_all("out/right").await;
    assert!(left_keys.iter().all(|k| *k < 100), "left side strictly below");
    assert!(right_keys.iter().all(|k| *k >= 100));
    assert_eq!(left_keys.len() + right_keys.len(), 300, "counts must add up");

    // Output records landed in the child partitions.
    let left_files = h
        .state_store
        .get_active_files_for_partition("left")
        .await
        .expect("left files");
    assert_eq!(left_files.len(), 1);
    assert_eq!(left_files[0].filename, "out/left");
    assert_eq!(left_files[0].record_count, left_keys.len() as u64);
}

/// The configured transformation drops records from the merged stream and
/// the written count reflects it.
#[tokio::test]
async fn transformer_removals_reduce_written_count() {
    let h = harness();
    // Same key range in both files: the deduper keeps one record per key.
    h.ingest_file("in/f1", "root", 0..100).await;
    h.ingest_file("in/f2", "root", 0..100).await;

    let job = CompactionJob::standard(
        "job-dedup",
        "events",
        "root",
        vec!["in/f1".into(), "in/f2".into()],
        "out/deduped",
    );
    h.register_job(&job).await;

    let schema = h.schema.clone();
    let executor = h
        .executor()
        .with_transformer(Arc::new(move || {
            Box::new(DedupingTransformer::new(schema.clone()))
        }));

    let summary = executor.run(&job, "task-1").await.expect("run");
    assert_eq!(summary.records_read, 200);
    assert_eq!(summary.records_written, 100);

    let keys = h.read_all("out/deduped").await;
    assert_eq!(keys, (0..100).collect::<Vec<_>>());
}

/// Re-running a committed job conflicts instead of double-applying, and
/// the failed attempt still gets a terminal status event.
#[tokio::test]
async fn duplicate_execution_is_a_fatal_conflict() {
    let h = harness();
    h.ingest_file("in/f1", "root", 0..100).await;

    let job = CompactionJob::standard(
        "job-1",
        "events",
        "root",
        vec!["in/f1".into()],
        "out/first",
    );
    h.register_job(&job).await;
    h.executor().run(&job, "task-1").await.expect("first run");

    // The duplicate writes to a different output path, so only the state
    // store commit can stop it.
    let duplicate = CompactionJob::standard(
        "job-1",
        "events",
        "root",
        vec!["in/f1".into()],
        "out/duplicate",
    );
    let result = h.executor().run(&duplicate, "task-2").await;
    assert!(matches!(result, Err(CompactionError::CommitConflict { .. })));

    // The failed attempt reported a zero-record terminal event.
    let status = h
        .job_status
        .get_job("job-1")
        .await
        .expect("get job")
        .expect("job status");
    assert_eq!(status.runs.len(), 2);
    let failed_run = &status.runs[1];
    let summary = failed_run.finished.expect("terminal event recorded");
    assert_eq!(summary.records_read, 0);
    assert_eq!(summary.records_written, 0);

    // The first commit's result is untouched.
    let active: Vec<_> = h
        .state_store
        .get_active_files()
        .await
        .expect("active")
        .into_iter()
        .map(|f| f.filename)
        .collect();
    assert_eq!(active, ["out/first"]);
}

/// Corrupt input aborts before any state store mutation.
#[tokio::test]
async fn corrupt_input_aborts_without_mutation() {
    let h = harness();
    h.ingest_file("in/good", "root", 0..10).await;

    // Register a file whose blob is missing entirely.
    h.state_store
        .add_files(vec![strata_core::FileReference::active(
            "in/missing",
            "root",
            strata_core::Key::of(0_i64),
            strata_core::Key::of(9_i64),
            10,
        )])
        .await
        .expect("add");

    let job = CompactionJob::standard(
        "job-bad",
        "events",
        "root",
        vec!["in/good".into(), "in/missing".into()],
        "out/never",
    );
    h.register_job(&job).await;

    let result = h.executor().run(&job, "task-1").await;
    assert!(matches!(result, Err(CompactionError::InputFileCorrupt { .. })));

    // Both inputs are still active; nothing was retired.
    let active = h.state_store.get_active_files().await.expect("active");
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|f| f.filename.starts_with("in/")));

    // The job still got its terminal event.
    let status = h
        .job_status
        .get_job("job-bad")
        .await
        .expect("get")
        .expect("status");
    assert!(!status.is_unfinished());
}

/// A second worker that races for the same input files skips the job
/// instead of failing the task.
#[tokio::test]
async fn assignment_conflict_is_a_benign_skip() {
    let h = harness();
    h.ingest_file("in/f1", "root", 0..100).await;

    // Another job already reserved the input.
    h.state_store
        .assign_job_to_files("job-holder", &["in/f1".into()])
        .await
        .expect("assign");

    let job = CompactionJob::standard(
        "job-racer",
        "events",
        "root",
        vec!["in/f1".into()],
        "out/racer",
    );
    h.register_job(&job).await;
    h.enqueue(&job).await;

    let outcome = h.runner("task-1").run().await.expect("run");
    assert_eq!(outcome.jobs_executed, 0);
    assert_eq!(outcome.jobs_skipped, 1);

    // Skipped message is deleted, not poisoned.
    assert_eq!(h.queue.pending_count(), 0);
    assert_eq!(h.queue.in_flight_count(), 0);

    // The task still completes its lifecycle.
    let task = h
        .task_status
        .get_task("task-1")
        .await
        .expect("get")
        .expect("status");
    assert!(task.finished.is_some());
}
