//! Progress-callback trait for batch and per-document events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves each document through its states. The CLI
//! uses this to drive its progress bar.
//!
//! # Example
//!
//! ```rust
//! use lark2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, doc_id: &str, markdown_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{doc_id} done ({markdown_len} bytes), {done} so far");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::JobState;
use std::sync::Arc;

/// Called by the pipeline as it processes documents.
///
/// Jobs run concurrently, so every method except the batch start and end
/// hooks may be called from several tasks at once. All methods default to
/// no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any job starts.
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a worker picks up a document.
    fn on_job_start(&self, doc_id: &str) {
        let _ = doc_id;
    }

    /// Called on every state transition of a job.
    fn on_job_state(&self, doc_id: &str, state: JobState) {
        let _ = (doc_id, state);
    }

    /// Called when a document has been rendered and written.
    fn on_job_complete(&self, doc_id: &str, markdown_len: usize) {
        let _ = (doc_id, markdown_len);
    }

    /// Called when a document fails. The batch carries on.
    fn on_job_error(&self, doc_id: &str, error: &str) {
        let _ = (doc_id, error);
    }

    /// Called once after every job has finished.
    fn on_batch_complete(&self, total_jobs: usize, success_count: usize) {
        let _ = (total_jobs, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
