//! External collaborators: where documents and assets come from, and how the
//! final Markdown is tidied.
//!
//! The pipeline never talks to the vendor API directly. It goes through
//! [`DocumentSource`] and [`AssetSource`], so an HTTP client, a cache or a
//! test double can be plugged in without touching the renderer. Filesystem
//! implementations over JSON dumps are provided for offline use.

use crate::batch::BatchJob;
use crate::error::Lark2MdError;
use crate::model::{Block, Document, DocumentDump};
use crate::pipeline::postprocess::CleanupFormatter;
use async_trait::async_trait;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

// ── Traits ───────────────────────────────────────────────────────────────

/// Produces a document and its flat block list.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_document(&self, doc_id: &str) -> Result<(Document, Vec<Block>), Lark2MdError>;
}

/// Resolves an image token to a file name and its bytes.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch_asset(&self, token: &str) -> Result<FetchedAsset, Lark2MdError>;
}

/// Final Markdown pass. Implementations must be idempotent.
pub trait MarkdownFormatter: Send + Sync {
    fn format(&self, markdown: &str) -> String;
}

/// An image fetched by an [`AssetSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    /// File name to store the asset under, e.g. `boxcnXYZ.png`.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// The collaborator set one conversion runs against.
#[derive(Clone)]
pub struct Sources {
    pub documents: Arc<dyn DocumentSource>,
    pub assets: Arc<dyn AssetSource>,
    pub formatter: Arc<dyn MarkdownFormatter>,
}

impl Sources {
    /// Use the built-in [`CleanupFormatter`].
    pub fn new(documents: Arc<dyn DocumentSource>, assets: Arc<dyn AssetSource>) -> Self {
        Self {
            documents,
            assets,
            formatter: Arc::new(CleanupFormatter),
        }
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn MarkdownFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Dumps under `dump_dir`, images under `asset_dir`.
    pub fn filesystem(dump_dir: impl Into<PathBuf>, asset_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            Arc::new(FsDocumentSource::new(dump_dir)),
            Arc::new(FsAssetSource::new(asset_dir)),
        )
    }
}

impl fmt::Debug for Sources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sources")
            .field("documents", &"<dyn DocumentSource>")
            .field("assets", &"<dyn AssetSource>")
            .field("formatter", &"<dyn MarkdownFormatter>")
            .finish()
    }
}

/// Passes Markdown through unchanged.
pub struct IdentityFormatter;

impl MarkdownFormatter for IdentityFormatter {
    fn format(&self, markdown: &str) -> String {
        markdown.to_string()
    }
}

// ── Filesystem document source ───────────────────────────────────────────

/// Reads `{"document": …, "blocks": […]}` dumps from a directory.
///
/// A document id is the dump's path relative to the root, without the
/// `.json` extension: `team/doxcnABC` reads `<root>/team/doxcnABC.json`.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read and decode a single dump file.
    pub async fn read_dump(path: &Path) -> Result<(Document, Vec<Block>), Lark2MdError> {
        let doc_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Lark2MdError::DocumentFetchFailed {
                doc_id: doc_id.clone(),
                reason: format!("{}: {e}", path.display()),
            })?;
        let dump: DocumentDump =
            serde_json::from_slice(&bytes).map_err(|e| Lark2MdError::DecodeFailed {
                doc_id,
                reason: e.to_string(),
            })?;
        debug!(
            path = %path.display(),
            blocks = dump.blocks.len(),
            "Decoded document dump"
        );
        Ok((dump.document, dump.blocks))
    }

    fn dump_path(&self, doc_id: &str) -> Result<PathBuf, Lark2MdError> {
        let key = doc_id.strip_suffix(".json").unwrap_or(doc_id);
        if !is_contained(Path::new(key)) {
            return Err(Lark2MdError::DocumentFetchFailed {
                doc_id: doc_id.to_string(),
                reason: "document id escapes the dump directory".to_string(),
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn fetch_document(&self, doc_id: &str) -> Result<(Document, Vec<Block>), Lark2MdError> {
        let path = self.dump_path(doc_id)?;
        Self::read_dump(&path).await
    }
}

/// True when `path` is relative and never climbs out of its base.
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
        && path.components().next().is_some()
}

// ── Filesystem asset source ──────────────────────────────────────────────

/// Reads images named `<token>.<ext>` from a directory.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    dir: PathBuf,
}

impl FsAssetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AssetSource for FsAssetSource {
    async fn fetch_asset(&self, token: &str) -> Result<FetchedAsset, Lark2MdError> {
        let fail = |reason: String| Lark2MdError::AssetFetchFailed {
            token: token.to_string(),
            reason,
        };
        if token.is_empty() || !is_contained(Path::new(token)) || token.contains(['/', '\\']) {
            return Err(fail("token is not a plain file name".to_string()));
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| fail(format!("{}: {e}", self.dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| fail(e.to_string()))?
        {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) != Some(token) {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| fail(format!("{}: {e}", path.display())))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            return Ok(FetchedAsset { file_name, bytes });
        }
        Err(fail(format!("no file named '{token}.*' in {}", self.dir.display())))
    }
}

// ── Job discovery ────────────────────────────────────────────────────────

/// Walk `root` recursively and produce one job per `*.json` dump.
///
/// Each job's `rel_dir` is the dump's directory relative to `root`, so the
/// batch writes Markdown into a mirror of the input tree. Hidden entries are
/// skipped. Jobs are sorted by id.
pub fn discover_jobs(root: &Path) -> Result<Vec<BatchJob>, Lark2MdError> {
    if !root.is_dir() {
        return Err(Lark2MdError::InvalidInput {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    let mut jobs = Vec::new();
    walk(root, Path::new(""), &mut jobs)?;
    jobs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    Ok(jobs)
}

fn walk(dir: &Path, rel: &Path, jobs: &mut Vec<BatchJob>) -> Result<(), Lark2MdError> {
    let invalid = |e: std::io::Error| Lark2MdError::InvalidInput {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };
    for entry in std::fs::read_dir(dir).map_err(invalid)? {
        let entry = entry.map_err(invalid)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            walk(&path, &rel.join(&*name), jobs)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = rel.join(stem);
            let doc_id = key
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            jobs.push(BatchJob {
                doc_id,
                rel_dir: rel.to_path_buf(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_dump(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let dump = json!({
            "document": { "documentId": "doxcnA", "title": "A" },
            "blocks": [
                { "blockId": "doxcnA", "blockType": 1, "children": ["t"],
                  "page": { "elements": [] } },
                { "blockId": "t", "blockType": 2, "parentId": "doxcnA",
                  "text": { "elements": [{ "textRun": { "content": "hi" } }] } }
            ]
        });
        std::fs::write(path, serde_json::to_vec(&dump).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn fs_document_source_reads_dump() {
        let dir = TempDir::new().unwrap();
        write_dump(dir.path(), "team/doxcnA.json");
        let source = FsDocumentSource::new(dir.path());
        let (doc, blocks) = source.fetch_document("team/doxcnA").await.unwrap();
        assert_eq!(doc.id, "doxcnA");
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[1].kind, BlockKind::Text(_)));
    }

    #[tokio::test]
    async fn fs_document_source_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{ not json").unwrap();
        let source = FsDocumentSource::new(dir.path());

        assert!(matches!(
            source.fetch_document("missing").await,
            Err(Lark2MdError::DocumentFetchFailed { .. })
        ));
        assert!(matches!(
            source.fetch_document("bad").await,
            Err(Lark2MdError::DecodeFailed { .. })
        ));
        assert!(matches!(
            source.fetch_document("../outside").await,
            Err(Lark2MdError::DocumentFetchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn fs_asset_source_matches_token_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("boxcnImg.png"), b"\x89PNG").unwrap();
        let source = FsAssetSource::new(dir.path());

        let asset = source.fetch_asset("boxcnImg").await.unwrap();
        assert_eq!(asset.file_name, "boxcnImg.png");
        assert_eq!(asset.bytes, b"\x89PNG");

        assert!(matches!(
            source.fetch_asset("nope").await,
            Err(Lark2MdError::AssetFetchFailed { .. })
        ));
        assert!(source.fetch_asset("../boxcnImg").await.is_err());
    }

    #[test]
    fn discover_jobs_mirrors_tree() {
        let dir = TempDir::new().unwrap();
        write_dump(dir.path(), "root.json");
        write_dump(dir.path(), "team/a.json");
        write_dump(dir.path(), "team/sub/b.json");
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();
        write_dump(dir.path(), ".hidden/c.json");

        let jobs = discover_jobs(dir.path()).unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["root", "team/a", "team/sub/b"]);
        assert_eq!(jobs[0].rel_dir, PathBuf::new());
        assert_eq!(jobs[2].rel_dir, PathBuf::from("team/sub"));
    }

    #[test]
    fn discover_jobs_rejects_file() {
        let dir = TempDir::new().unwrap();
        write_dump(dir.path(), "x.json");
        assert!(matches!(
            discover_jobs(&dir.path().join("x.json")),
            Err(Lark2MdError::InvalidInput { .. })
        ));
    }

    #[test]
    fn identity_formatter_is_noop() {
        assert_eq!(IdentityFormatter.format("a  \n\n\n"), "a  \n\n\n");
    }
}
