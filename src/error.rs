//! Error types for the lark2md library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`StructuralError`]: the block tree itself is broken (a referenced
//!   child is missing, a block contains itself, a table's cell list does not
//!   fill its grid). These are data-contract violations upstream and are
//!   never degraded silently: the render of that document aborts.
//!
//! * [`Lark2MdError`]: **fatal** for the call that returned it: the document
//!   could not be fetched, an asset could not be resolved in single-document
//!   mode, the output could not be written, or a batch finished with failures.
//!
//! * [`JobError`]: **non-fatal** in batch mode: one document failed but the
//!   others continue. Stored inside [`crate::output::JobFailure`] so the final
//!   batch report lists every failed input for remediation or retry.
//!
//! Unknown block types and table-cell lookup misses are *not* errors; they
//! render as empty output and are logged with `tracing`.

use crate::output::JobFailure;
use std::path::PathBuf;
use thiserror::Error;

/// Integrity violations in a document's block tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// A block id referenced by `children`, `cellIds` or as the root is absent.
    #[error("block '{id}' is referenced by '{referenced_by}' but missing from the document")]
    MissingBlock { id: String, referenced_by: String },

    /// A block is reachable from its own children.
    #[error("block '{id}' is its own descendant")]
    CyclicBlock { id: String },

    /// A table's cell list does not fill a whole number of rows.
    #[error("table '{table}' has {cells} cells, which does not fit {columns} columns")]
    CellCountMismatch {
        table: String,
        cells: usize,
        columns: usize,
    },
}

/// All fatal errors returned by the lark2md library.
///
/// Per-document failures inside a batch use [`JobError`] and are collected
/// into [`Lark2MdError::BatchFailed`] once every job has finished.
#[derive(Debug, Error)]
pub enum Lark2MdError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The block tree is structurally invalid.
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// The document source could not produce the document or its blocks.
    #[error("Failed to fetch document '{doc_id}': {reason}")]
    DocumentFetchFailed { doc_id: String, reason: String },

    /// A dump or payload could not be decoded into the block model.
    #[error("Failed to decode document '{doc_id}': {reason}")]
    DecodeFailed { doc_id: String, reason: String },

    // ── Asset errors ──────────────────────────────────────────────────────
    /// An image token could not be resolved to bytes.
    #[error("Failed to fetch asset '{token}': {reason}")]
    AssetFetchFailed { token: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Input path does not exist or is not a dump file / dump directory.
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Batch errors ──────────────────────────────────────────────────────
    /// At least one job in a batch failed. Every failure is listed.
    #[error("{failed}/{total} documents failed during batch conversion")]
    BatchFailed {
        failed: usize,
        total: usize,
        failures: Vec<JobFailure>,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum JobError {
    /// The document could not be fetched or decoded.
    #[error("fetch failed: {detail}")]
    Fetch { detail: String },

    /// The block tree is structurally invalid.
    #[error("structural error: {detail}")]
    Structural { detail: String },

    /// An image asset could not be resolved.
    #[error("asset '{token}' failed: {detail}")]
    Asset { token: String, detail: String },

    /// Markdown or an asset could not be written to disk.
    #[error("write failed for '{path}': {detail}")]
    Write { path: String, detail: String },

    /// The worker task died before reporting a result.
    #[error("worker aborted: {detail}")]
    Aborted { detail: String },
}

impl From<Lark2MdError> for JobError {
    fn from(err: Lark2MdError) -> Self {
        match err {
            Lark2MdError::Structural(e) => JobError::Structural {
                detail: e.to_string(),
            },
            Lark2MdError::AssetFetchFailed { token, reason } => JobError::Asset {
                token,
                detail: reason,
            },
            Lark2MdError::OutputWriteFailed { path, source } => JobError::Write {
                path: path.display().to_string(),
                detail: source.to_string(),
            },
            Lark2MdError::DocumentFetchFailed { reason, .. }
            | Lark2MdError::DecodeFailed { reason, .. } => JobError::Fetch { detail: reason },
            other => JobError::Aborted {
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{JobFailure, JobState};

    #[test]
    fn missing_block_display() {
        let e = StructuralError::MissingBlock {
            id: "blk_2".into(),
            referenced_by: "blk_1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("blk_2"), "got: {msg}");
        assert!(msg.contains("blk_1"), "got: {msg}");
    }

    #[test]
    fn cell_count_mismatch_display() {
        let e = StructuralError::CellCountMismatch {
            table: "tbl".into(),
            cells: 5,
            columns: 2,
        };
        assert!(e.to_string().contains("5 cells"));
        assert!(e.to_string().contains("2 columns"));
    }

    #[test]
    fn structural_converts_into_fatal() {
        let e: Lark2MdError = StructuralError::CyclicBlock { id: "loop".into() }.into();
        assert!(matches!(e, Lark2MdError::Structural(_)));
        assert!(e.to_string().contains("loop"));
    }

    #[test]
    fn batch_failed_display() {
        let e = Lark2MdError::BatchFailed {
            failed: 1,
            total: 10,
            failures: vec![JobFailure {
                doc_id: "doxcn1".into(),
                failed_during: JobState::Fetching,
                error: JobError::Fetch {
                    detail: "timeout".into(),
                },
            }],
        };
        assert!(e.to_string().contains("1/10"), "got: {e}");
    }

    #[test]
    fn asset_error_keeps_token() {
        let job: JobError = Lark2MdError::AssetFetchFailed {
            token: "boxcnImg".into(),
            reason: "404".into(),
        }
        .into();
        assert_eq!(
            job,
            JobError::Asset {
                token: "boxcnImg".into(),
                detail: "404".into()
            }
        );
    }
}
