//! Logging setup and span helpers.
//!
//! Every worker process calls [`init_logging`] once at startup; library
//! code only emits through `tracing` macros and the span constructors here,
//! so output format stays a process-level decision.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (production).
    Json,
    /// Pretty-printed logs (development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops. Levels are
/// controlled through `RUST_LOG`.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one compaction job execution.
#[must_use]
pub fn job_span(job_id: &str, table_name: &str, partition_id: &str) -> Span {
    tracing::info_span!(
        "compaction_job",
        job_id = job_id,
        table = table_name,
        partition = partition_id,
    )
}

/// Creates a span for one worker task.
#[must_use]
pub fn task_span(task_id: &str) -> Span {
    tracing::info_span!("task", task_id = task_id)
}
