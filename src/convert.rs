//! Single-document conversion entry points.
//!
//! [`convert`] runs the whole per-document pipeline in memory: fetch, build
//! the block store, render, resolve images, format. [`convert_to_file`] adds
//! the write step. The batch and streaming APIs reuse the same
//! [`process_document`] core under a shared rate limiter.

use crate::config::ConversionConfig;
use crate::error::Lark2MdError;
use crate::limiter::TokenBucket;
use crate::output::{ConversionOutput, ConversionStats, JobOutcome, JobState};
use crate::pipeline::{assets, render};
use crate::progress::ProgressCallback;
use crate::source::Sources;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Convert one document to Markdown without touching the filesystem.
///
/// Images are fetched (unless `skip_image_download`) and returned in
/// [`ConversionOutput::assets`]; placeholders in the Markdown already point
/// at their final relative paths.
///
/// # Errors
/// Any failure is fatal here: fetch or decode errors, a structurally broken
/// block tree, or an image that cannot be resolved.
pub async fn convert(
    doc_id: impl AsRef<str>,
    sources: &Sources,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Lark2MdError> {
    let doc_id = doc_id.as_ref();
    let mut tracker = JobTracker::new(doc_id, config.progress_callback.as_ref());
    process_document(doc_id, sources, config, None, &mut tracker).await
}

/// Convert one document and write it under `output_dir`.
///
/// The Markdown file is written atomically (temp file + rename); images go
/// to `output_dir/<image_dir>/`.
pub async fn convert_to_file(
    doc_id: impl AsRef<str>,
    output_dir: impl AsRef<Path>,
    sources: &Sources,
    config: &ConversionConfig,
) -> Result<JobOutcome, Lark2MdError> {
    let doc_id = doc_id.as_ref();
    let mut tracker = JobTracker::new(doc_id, config.progress_callback.as_ref());
    let output = process_document(doc_id, sources, config, None, &mut tracker).await?;
    let output_path = write_output(&output, output_dir.as_ref(), config).await?;
    tracker.advance(JobState::Done);
    Ok(JobOutcome {
        doc_id: doc_id.to_string(),
        title: output.document.title,
        output_path,
        stats: output.stats,
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    doc_id: impl AsRef<str>,
    sources: &Sources,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Lark2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Lark2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(doc_id, sources, config))
}

// ── Shared pipeline ──────────────────────────────────────────────────────

/// Follows one document through its states and mirrors each step to the
/// progress callback.
pub(crate) struct JobTracker<'a> {
    doc_id: &'a str,
    state: JobState,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> JobTracker<'a> {
    pub(crate) fn new(doc_id: &'a str, progress: Option<&'a ProgressCallback>) -> Self {
        Self {
            doc_id,
            state: JobState::Pending,
            progress,
        }
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(doc_id = %self.doc_id, from = %self.state, to = %next, "Job state");
        self.state = next;
        if let Some(cb) = self.progress {
            cb.on_job_state(self.doc_id, next);
        }
    }
}

/// Fetch, render, resolve and format one document.
///
/// `limiter`, when present, is charged one token for the document fetch and
/// one per image fetch. On error the tracker is left in the state that
/// failed.
pub(crate) async fn process_document(
    doc_id: &str,
    sources: &Sources,
    config: &ConversionConfig,
    limiter: Option<&TokenBucket>,
    tracker: &mut JobTracker<'_>,
) -> Result<ConversionOutput, Lark2MdError> {
    let total_start = Instant::now();

    // ── Step 1: Fetch ────────────────────────────────────────────────────
    tracker.advance(JobState::Fetching);
    if let Some(limiter) = limiter {
        limiter.acquire().await;
    }
    let fetch_start = Instant::now();
    let (document, blocks) = sources.documents.fetch_document(doc_id).await?;
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
    let block_count = blocks.len();
    debug!(doc_id, blocks = block_count, "Fetched document");

    // ── Step 2: Build store + render (CPU-bound) ─────────────────────────
    tracker.advance(JobState::Rendering);
    let render_start = Instant::now();
    let use_html_tags = config.use_html_tags;
    let doc_for_render = document.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        render::render_document(&doc_for_render, blocks, use_html_tags)
    })
    .await
    .map_err(|e| Lark2MdError::Internal(format!("render task failed: {e}")))??;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    let image_tokens = rendered.distinct_tokens();

    // ── Step 3: Resolve assets ───────────────────────────────────────────
    tracker.advance(JobState::ResolvingAssets);
    let asset_start = Instant::now();
    let (markdown, resolved) = if config.skip_image_download || image_tokens.is_empty() {
        (rendered.markdown, Vec::new())
    } else {
        let resolved = assets::resolve_assets(
            &image_tokens,
            sources.assets.as_ref(),
            limiter,
            &config.image_dir,
        )
        .await?;
        (assets::substitute_all(&rendered.markdown, &resolved), resolved)
    };
    let asset_duration_ms = asset_start.elapsed().as_millis() as u64;

    // ── Step 4: Format ───────────────────────────────────────────────────
    let markdown = if config.format_output {
        sources.formatter.format(&markdown)
    } else {
        markdown
    };

    let stats = ConversionStats {
        block_count,
        image_count: image_tokens.len(),
        assets_resolved: resolved.len(),
        markdown_bytes: markdown.len(),
        fetch_duration_ms,
        render_duration_ms,
        asset_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        doc_id,
        blocks = stats.block_count,
        images = stats.image_count,
        bytes = stats.markdown_bytes,
        ms = stats.total_duration_ms,
        "Converted document"
    );

    Ok(ConversionOutput {
        document,
        markdown,
        image_tokens,
        assets: resolved,
        stats,
    })
}

/// Write the Markdown file and its images under `dir`. Returns the Markdown
/// file's path.
pub(crate) async fn write_output(
    output: &ConversionOutput,
    dir: &Path,
    config: &ConversionConfig,
) -> Result<PathBuf, Lark2MdError> {
    create_dir(dir).await?;

    if !output.assets.is_empty() {
        let image_dir = dir.join(&config.image_dir);
        create_dir(&image_dir).await?;
        for asset in &output.assets {
            let target = image_dir.join(&asset.file_name);
            // Another job may already have written the same image.
            if tokio::fs::read(&target)
                .await
                .is_ok_and(|existing| existing == asset.bytes)
            {
                debug!(path = %target.display(), "Image already in place");
                continue;
            }
            write_atomic(&target, &asset.bytes).await?;
        }
    }

    let path = dir.join(output_file_name(output, config));
    write_atomic(&path, output.markdown.as_bytes()).await?;
    debug!(path = %path.display(), "Wrote Markdown");
    Ok(path)
}

/// `<title>.md` when titles are used and the title survives sanitising,
/// `<document id>.md` otherwise.
pub(crate) fn output_file_name(output: &ConversionOutput, config: &ConversionConfig) -> String {
    let stem = if config.title_as_filename {
        sanitize_file_name(&output.document.title)
    } else {
        String::new()
    };
    let stem = if stem.is_empty() {
        sanitize_file_name(&output.document.id)
    } else {
        stem
    };
    let stem = if stem.is_empty() { "document".to_string() } else { stem };
    format!("{stem}.md")
}

/// Replace characters that are illegal in file names on common platforms.
pub fn sanitize_file_name(name: &str) -> String {
    const MAX_CHARS: usize = 200;
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_CHARS)
        .collect();
    replaced.trim().trim_matches('.').trim().to_string()
}

async fn create_dir(dir: &Path) -> Result<(), Lark2MdError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Lark2MdError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// Write to a uniquely named sibling temp file, then rename over the target.
///
/// Concurrent writers of the same path each get their own temp file; the
/// last rename wins.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Lark2MdError> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || persist_atomic(&path, &bytes))
        .await
        .map_err(|e| Lark2MdError::Internal(format!("write task failed: {e}")))?
}

fn persist_atomic(path: &Path, bytes: &[u8]) -> Result<(), Lark2MdError> {
    let write_failed = |source: std::io::Error| Lark2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".lark2md-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_failed)?;
    tmp.write_all(bytes).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}
