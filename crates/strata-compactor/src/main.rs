//! # strata-compactor
//!
//! Worker harness for Strata compaction tasks.
//!
//! A deployment wires the runner to its durable metadata store, blob
//! store, queue, and status database behind the library traits; those
//! clients live outside this repository. This binary wires the same
//! pipeline to the in-process implementations, which makes it a full
//! self-test of a worker: seed files, enqueue jobs, run a task to idle
//! exit, and verify the state store swap.
//!
//! ## Usage
//!
//! ```bash
//! # Exercise the full worker pipeline and print the outcome
//! strata-compactor self-test --input-files 4 --records-per-file 100
//!
//! # Validate a job message without executing it
//! strata-compactor check-message --file job.json
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use strata_compaction::{
    CompactionExecutor, CompactionJob, CompactionRunner, JsonRowFileStore, RunnerConfig,
    SortedFileStore,
};
use strata_core::{
    init_logging, ColumnType, Field, InMemoryMessageQueue, InMemoryMetadataStore, KeyValue,
    LogFormat, MessageQueue, Record, Schema,
};
use strata_statestore::{SnapshotStateStore, StateStore};
use strata_tracker::{InMemoryJobStatusStore, InMemoryTaskStatusStore, JobCreated, JobStatusStore};

/// Strata compaction worker.
#[derive(Debug, Parser)]
#[command(name = "strata-compactor")]
#[command(about = "Runs Strata compaction tasks")]
#[command(version)]
struct Args {
    /// Emit JSON logs instead of pretty-printed ones.
    #[arg(long, env = "STRATA_LOG_JSON", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full worker pipeline against in-process stores.
    SelfTest {
        /// Number of input files to seed.
        #[arg(long, default_value = "4")]
        input_files: usize,

        /// Records per seeded input file.
        #[arg(long, default_value = "100")]
        records_per_file: i64,

        /// Input files per compaction job.
        #[arg(long, default_value = "2")]
        files_per_job: usize,

        /// Seconds to wait between empty queue polls.
        #[arg(long, default_value = "0")]
        poll_interval_secs: u64,

        /// Consecutive empty polls before the task exits.
        #[arg(long, default_value = "1")]
        max_empty_polls: u32,
    },

    /// Parse and validate a compaction job message.
    CheckMessage {
        /// Path to a file containing the JSON job message.
        #[arg(long)]
        file: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    match args.command {
        Commands::SelfTest {
            input_files,
            records_per_file,
            files_per_job,
            poll_interval_secs,
            max_empty_polls,
        } => {
            self_test(
                input_files,
                records_per_file,
                files_per_job,
                RunnerConfig {
                    poll_interval: Duration::from_secs(poll_interval_secs),
                    max_consecutive_empty_polls: max_empty_polls,
                },
            )
            .await
        }
        Commands::CheckMessage { file } => check_message(&file),
    }
}

/// Seeds an in-process environment, runs one worker task to idle exit,
/// and verifies the state store ended in the expected shape.
async fn self_test(
    input_files: usize,
    records_per_file: i64,
    files_per_job: usize,
    runner_config: RunnerConfig,
) -> Result<()> {
    if input_files == 0 || files_per_job == 0 {
        bail!("--input-files and --files-per-job must be positive");
    }

    let schema = Schema::with_int64_key("key", vec![Field::new("value", ColumnType::String)])
        .context("building schema")?;
    let state_store = Arc::new(SnapshotStateStore::new(
        Arc::new(InMemoryMetadataStore::new()),
        "self-test",
    ));
    let file_store = Arc::new(JsonRowFileStore::new(
        Arc::new(InMemoryMetadataStore::new()),
        schema.clone(),
    ));
    let job_status = Arc::new(InMemoryJobStatusStore::new());
    let task_status = Arc::new(InMemoryTaskStatusStore::new());
    let queue = Arc::new(InMemoryMessageQueue::new());

    // Seed sorted input files and register them as active.
    let mut filenames = Vec::with_capacity(input_files);
    for file_index in 0..input_files {
        let filename = format!("input/file-{file_index}.jsonl");
        let mut writer = file_store
            .open_writer(&filename)
            .await
            .map_err(|e| anyhow::anyhow!("opening writer: {e}"))?;
        let base = (file_index as i64) * records_per_file;
        for offset in 0..records_per_file {
            let record = Record::from_entries([
                ("key", KeyValue::Int64(base + offset)),
                ("value", KeyValue::from(format!("v{}", base + offset))),
            ]);
            writer
                .write(&record)
                .await
                .map_err(|e| anyhow::anyhow!("writing record: {e}"))?;
        }
        let written = writer
            .finish()
            .await
            .map_err(|e| anyhow::anyhow!("finishing file: {e}"))?;
        state_store
            .add_files(vec![written.to_file_reference("root")])
            .await
            .context("registering input file")?;
        filenames.push(filename);
    }

    // One job per chunk of input files.
    let mut job_count = 0_usize;
    for (job_index, chunk) in filenames.chunks(files_per_job).enumerate() {
        let job = CompactionJob::standard(
            uuid::Uuid::new_v4().to_string(),
            "self-test",
            "root",
            chunk.to_vec(),
            format!("output/merged-{job_index}.jsonl"),
        );
        job_status
            .job_created(JobCreated {
                job_id: job.id.clone(),
                table_name: job.table_name.clone(),
                partition_id: job.partition_id.clone(),
                input_file_count: job.input_files.len(),
                splitting: false,
            })
            .await
            .context("recording job creation")?;
        queue
            .send(serde_json::to_string(&job).context("encoding job")?)
            .await
            .map_err(|e| anyhow::anyhow!("enqueueing job: {e}"))?;
        job_count += 1;
    }

    let executor = CompactionExecutor::new(
        schema,
        state_store.clone(),
        file_store,
        job_status.clone(),
    );
    let runner = CompactionRunner::new(
        format!("self-test-{}", uuid::Uuid::new_v4()),
        queue.clone(),
        state_store.clone(),
        task_status,
        executor,
        runner_config,
    );

    let outcome = runner.run().await.context("running worker task")?;

    let active = state_store
        .get_active_files()
        .await
        .context("reading active files")?;
    if outcome.jobs_executed != job_count {
        bail!(
            "expected {job_count} jobs to run, got {}",
            outcome.jobs_executed
        );
    }
    if active.len() != job_count {
        bail!(
            "expected {job_count} active output files, got {}",
            active.len()
        );
    }
    if queue.pending_count() != 0 || queue.in_flight_count() != 0 {
        bail!("queue not drained after task exit");
    }

    tracing::info!(
        jobs_executed = outcome.jobs_executed,
        records_read = outcome.records_read,
        records_written = outcome.records_written,
        active_files = active.len(),
        "self-test passed"
    );
    Ok(())
}

/// Parses a job message and prints its normalized form.
fn check_message(path: &std::path::Path) -> Result<()> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let job: CompactionJob = serde_json::from_str(&body).context("parsing job message")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&job).context("re-encoding job")?
    );
    tracing::info!(
        job_id = %job.id,
        table = %job.table_name,
        input_files = job.input_files.len(),
        splitting = job.is_splitting(),
        "job message is valid"
    );
    Ok(())
}
