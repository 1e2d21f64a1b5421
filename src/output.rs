//! Result types returned by the conversion and batch APIs.

use crate::error::{JobError, Lark2MdError};
use crate::model::Document;
use crate::pipeline::assets::ResolvedAsset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A fully converted document, held in memory.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub document: Document,
    /// Final Markdown: placeholders substituted (unless image download is
    /// skipped) and formatted.
    pub markdown: String,
    /// Distinct image tokens in first-seen order.
    pub image_tokens: Vec<String>,
    /// Fetched images, not yet written anywhere.
    pub assets: Vec<ResolvedAsset>,
    pub stats: ConversionStats,
}

/// Timing and size counters for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub block_count: usize,
    pub image_count: usize,
    pub assets_resolved: usize,
    pub markdown_bytes: usize,
    pub fetch_duration_ms: u64,
    pub render_duration_ms: u64,
    pub asset_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Lifecycle of one document inside a batch.
///
/// `Pending → Fetching → Rendering → ResolvingAssets → Done`, with `Failed`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Fetching,
    Rendering,
    ResolvingAssets,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Whether `self → next` is a legal step.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Fetching)
            | (Fetching, Rendering)
            | (Rendering, ResolvingAssets)
            | (ResolvingAssets, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Fetching => "fetching",
            JobState::Rendering => "rendering",
            JobState::ResolvingAssets => "resolving assets",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A document that made it to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub doc_id: String,
    pub title: String,
    pub output_path: PathBuf,
    pub stats: ConversionStats,
}

/// A document that did not, and the state it was in when it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub doc_id: String,
    pub failed_during: JobState,
    pub error: JobError,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (while {}): {}", self.doc_id, self.failed_during, self.error)
    }
}

/// Everything a batch did, successes and failures alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: Vec<JobOutcome>,
    pub failures: Vec<JobFailure>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Err(BatchFailed)` listing every failure if any job failed.
    pub fn into_result(self) -> Result<BatchReport, Lark2MdError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(Lark2MdError::BatchFailed {
                failed: self.failures.len(),
                total: self.total,
                failures: self.failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        use JobState::*;
        let path = [Pending, Fetching, Rendering, ResolvingAssets, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(!Pending.can_transition_to(Rendering));
        assert!(!Done.can_transition_to(Fetching));
    }

    #[test]
    fn failed_reachable_from_non_terminal_only() {
        use JobState::*;
        for s in [Pending, Fetching, Rendering, ResolvingAssets] {
            assert!(s.can_transition_to(Failed));
        }
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn report_with_failures_becomes_error() {
        let report = BatchReport {
            total: 2,
            succeeded: vec![],
            failures: vec![JobFailure {
                doc_id: "d".into(),
                failed_during: JobState::Rendering,
                error: JobError::Structural {
                    detail: "cycle".into(),
                },
            }],
            duration_ms: 0,
        };
        match report.into_result() {
            Err(Lark2MdError::BatchFailed {
                failed,
                total,
                failures,
            }) => {
                assert_eq!((failed, total), (1, 2));
                assert_eq!(failures[0].doc_id, "d");
            }
            other => panic!("expected BatchFailed, got {other:?}"),
        }
    }

    #[test]
    fn failure_serialises_state_in_snake_case() {
        let f = JobFailure {
            doc_id: "d".into(),
            failed_during: JobState::ResolvingAssets,
            error: JobError::Asset {
                token: "t".into(),
                detail: "404".into(),
            },
        };
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.contains("\"resolving_assets\""), "got {json}");
        let back: JobFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
        assert_eq!(f.to_string(), "d (while resolving assets): asset 't' failed: 404");
    }
}
