//! Batch mode: many documents, bounded concurrency, one shared request budget.
//!
//! ```text
//! jobs ──► buffer_unordered(max_concurrency) ──► tokio::spawn(worker)
//!                                                   │
//!                  TokenBucket (shared, timer-refilled)
//!                                                   │
//!          acquire → fetch → render → acquire per image → format → write
//! ```
//!
//! A failing document never stops the others. Its failure is pushed onto a
//! shared list and the batch carries on; the aggregate error is raised only
//! after every job has finished.

use crate::config::ConversionConfig;
use crate::convert::{process_document, write_output, JobTracker};
use crate::error::{JobError, Lark2MdError};
use crate::limiter::{RefillHandle, TokenBucket};
use crate::output::{BatchReport, JobFailure, JobOutcome, JobState};
use crate::source::Sources;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// One document to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    /// Key passed to the [`crate::source::DocumentSource`].
    pub doc_id: String,
    /// Output sub-directory, relative to the batch output directory.
    pub rel_dir: PathBuf,
}

impl BatchJob {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rel_dir: PathBuf::new(),
        }
    }

    pub fn in_dir(mut self, rel_dir: impl Into<PathBuf>) -> Self {
        self.rel_dir = rel_dir.into();
        self
    }
}

/// Run every job and return the full report, failures included.
pub async fn run_batch(
    jobs: Vec<BatchJob>,
    output_dir: impl AsRef<Path>,
    sources: &Sources,
    config: &ConversionConfig,
) -> BatchReport {
    let start = Instant::now();
    let total = jobs.len();
    info!(
        jobs = total,
        concurrency = config.max_concurrency,
        rps = config.requests_per_second,
        "Starting batch"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let ctx = BatchContext::new(output_dir.as_ref(), sources, config);
    let failures: Arc<Mutex<Vec<JobFailure>>> = Arc::new(Mutex::new(Vec::new()));

    let succeeded: Vec<JobOutcome> = stream::iter(jobs.into_iter().map(|job| {
        let ctx = Arc::clone(&ctx);
        let failures = Arc::clone(&failures);
        async move {
            match spawn_job(ctx, job).await {
                Ok(outcome) => Some(outcome),
                Err(failure) => {
                    failures
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(failure);
                    None
                }
            }
        }
    }))
    .buffer_unordered(config.max_concurrency.max(1))
    .filter_map(|outcome| async move { outcome })
    .collect()
    .await;

    let failures = std::mem::take(
        &mut *failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    );

    let report = BatchReport {
        total,
        succeeded,
        failures,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        succeeded = report.succeeded.len(),
        failed = report.failures.len(),
        ms = report.duration_ms,
        "Batch complete"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, report.succeeded.len());
    }
    report
}

/// Run every job; `Err(BatchFailed)` listing all failures if any job failed.
pub async fn convert_batch(
    jobs: Vec<BatchJob>,
    output_dir: impl AsRef<Path>,
    sources: &Sources,
    config: &ConversionConfig,
) -> Result<BatchReport, Lark2MdError> {
    run_batch(jobs, output_dir, sources, config)
        .await
        .into_result()
}

// ── Workers ──────────────────────────────────────────────────────────────

/// State shared by every worker of one batch. Dropping the last reference
/// stops the refill timer.
pub(crate) struct BatchContext {
    output_dir: PathBuf,
    sources: Sources,
    config: ConversionConfig,
    limiter: Arc<TokenBucket>,
    _refill: RefillHandle,
}

impl BatchContext {
    pub(crate) fn new(output_dir: &Path, sources: &Sources, config: &ConversionConfig) -> Arc<Self> {
        let limiter = Arc::new(TokenBucket::per_second(config.requests_per_second));
        let refill = limiter.spawn_refill();
        Arc::new(Self {
            output_dir: output_dir.to_path_buf(),
            sources: sources.clone(),
            config: config.clone(),
            limiter,
            _refill: refill,
        })
    }
}

/// Run one job on its own task so a panic stays contained to that job.
pub(crate) async fn spawn_job(ctx: Arc<BatchContext>, job: BatchJob) -> Result<JobOutcome, JobFailure> {
    let doc_id = job.doc_id.clone();
    match tokio::spawn(run_job(ctx, job)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(doc_id = %doc_id, error = %e, "Worker task aborted");
            Err(JobFailure {
                doc_id,
                failed_during: JobState::Pending,
                error: JobError::Aborted {
                    detail: e.to_string(),
                },
            })
        }
    }
}

async fn run_job(ctx: Arc<BatchContext>, job: BatchJob) -> Result<JobOutcome, JobFailure> {
    let progress = ctx.config.progress_callback.as_ref();
    if let Some(cb) = progress {
        cb.on_job_start(&job.doc_id);
    }
    let mut tracker = JobTracker::new(&job.doc_id, progress);
    let dir = ctx.output_dir.join(&job.rel_dir);

    let result: Result<_, Lark2MdError> = async {
        let output = process_document(
            &job.doc_id,
            &ctx.sources,
            &ctx.config,
            Some(&ctx.limiter),
            &mut tracker,
        )
        .await?;
        let path = write_output(&output, &dir, &ctx.config).await?;
        Ok((output, path))
    }
    .await;

    match result {
        Ok((output, output_path)) => {
            tracker.advance(JobState::Done);
            if let Some(cb) = progress {
                cb.on_job_complete(&job.doc_id, output.markdown.len());
            }
            Ok(JobOutcome {
                doc_id: job.doc_id.clone(),
                title: output.document.title,
                output_path,
                stats: output.stats,
            })
        }
        Err(e) => {
            let failed_during = tracker.state();
            tracker.advance(JobState::Failed);
            warn!(doc_id = %job.doc_id, state = %failed_during, error = %e, "Document failed");
            if let Some(cb) = progress {
                cb.on_job_error(&job.doc_id, &e.to_string());
            }
            Err(JobFailure {
                doc_id: job.doc_id.clone(),
                failed_during,
                error: JobError::from(e),
            })
        }
    }
}
