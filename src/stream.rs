//! Streaming batch API: emit each document's result as soon as it is done.
//!
//! [`convert_stream`] runs the same workers as [`crate::batch::run_batch`]
//! (same concurrency bound, same shared rate limiter) but hands results back
//! one at a time, in completion order, instead of collecting a report.

use crate::batch::{spawn_job, BatchContext, BatchJob};
use crate::config::ConversionConfig;
use crate::output::{JobFailure, JobOutcome};
use crate::source::Sources;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document results.
pub type JobStream = Pin<Box<dyn Stream<Item = Result<JobOutcome, JobFailure>> + Send>>;

/// Convert `jobs`, yielding each result as it completes.
///
/// Results arrive in completion order, not job order. Dropping the stream
/// stops scheduling new jobs; jobs already running finish in the background.
/// Must be called from within a tokio runtime (the limiter's refill timer is
/// spawned immediately).
///
/// # Example
/// ```rust,no_run
/// use lark2md::{convert_stream, BatchJob, ConversionConfig, Sources};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let sources = Sources::filesystem("dumps", "images");
/// let jobs = vec![BatchJob::new("doxcnA"), BatchJob::new("doxcnB")];
/// let mut results = convert_stream(jobs, "out", &sources, &ConversionConfig::default());
/// while let Some(result) = results.next().await {
///     match result {
///         Ok(done) => println!("{} -> {}", done.doc_id, done.output_path.display()),
///         Err(failed) => eprintln!("{failed}"),
///     }
/// }
/// # }
/// ```
pub fn convert_stream(
    jobs: Vec<BatchJob>,
    output_dir: impl AsRef<Path>,
    sources: &Sources,
    config: &ConversionConfig,
) -> JobStream {
    info!(jobs = jobs.len(), "Starting streaming batch");
    let ctx = BatchContext::new(output_dir.as_ref(), sources, config);
    let s = stream::iter(jobs)
        .map(move |job| spawn_job(Arc::clone(&ctx), job))
        .buffer_unordered(config.max_concurrency.max(1));
    Box::pin(s)
}
