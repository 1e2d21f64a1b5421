//! # lark2md
//!
//! Convert Lark/Feishu documents, delivered as flat lists of typed blocks,
//! into Markdown.
//!
//! ## Why this crate?
//!
//! The vendor API hands out a document as a bag of blocks that point at each
//! other by id. Turning that into readable Markdown means rebuilding the
//! tree, numbering ordered lists, flattening tables with merged cells into
//! HTML, and downloading every image the document references without
//! tripping the API's rate limit. This crate does all of it, for one
//! document or for thousands.
//!
//! ## Pipeline Overview
//!
//! ```text
//! doc id
//!  │
//!  ├─ 1. Fetch    DocumentSource → Document + Vec<Block>
//!  ├─ 2. Index    BlockStore: id lookup, dangling refs and cycles rejected
//!  ├─ 3. Render   recursive block walk (CPU-bound, spawn_blocking)
//!  ├─ 4. Assets   AssetSource per distinct image token, placeholders swapped
//!  ├─ 5. Format   MarkdownFormatter (whitespace cleanup by default)
//!  └─ 6. Output   <title or id>.md + <image_dir>/…, written atomically
//! ```
//!
//! Batches run step 1–6 for many documents under a concurrency bound and a
//! shared token-bucket rate limit. A failed document is recorded and the
//! rest carry on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lark2md::{convert, ConversionConfig, Sources};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Dumps live at dumps/<doc id>.json, images at images/<token>.<ext>
//!     let sources = Sources::filesystem("dumps", "images");
//!     let config = ConversionConfig::default();
//!     let output = convert("doxcnExample", &sources, &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} blocks, {} images", output.stats.block_count, output.stats.image_count);
//!     Ok(())
//! }
//! ```
//!
//! Rendering alone needs no runtime and no I/O:
//!
//! ```rust
//! use lark2md::{render_document, Block, BlockKind, BlockText, Document};
//!
//! let doc = Document::new("d", "Notes");
//! let blocks = vec![
//!     Block::new("d", BlockKind::Page(BlockText::plain("Notes"))).with_children(["h"]),
//!     Block::new("h", BlockKind::Heading { level: 2, text: BlockText::plain("Intro") })
//!         .with_parent("d"),
//! ];
//! let out = render_document(&doc, blocks, false).unwrap();
//! assert_eq!(out.markdown, "# Notes\n\n## Intro\n");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `lark2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! lark2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod languages;
pub mod limiter;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{convert_batch, run_batch, BatchJob};
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_sync, convert_to_file, sanitize_file_name};
pub use error::{JobError, Lark2MdError, StructuralError};
pub use limiter::TokenBucket;
pub use model::{
    Block, BlockKind, BlockText, CellSpan, Document, TableProperty, TextElement, TextStyle,
};
pub use output::{BatchReport, ConversionOutput, ConversionStats, JobFailure, JobOutcome, JobState};
pub use pipeline::postprocess::CleanupFormatter;
pub use pipeline::render::{render_document, BlockRenderer, RenderContext, RenderOutput};
pub use pipeline::store::BlockStore;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{
    discover_jobs, AssetSource, DocumentSource, FetchedAsset, FsAssetSource, FsDocumentSource,
    IdentityFormatter, MarkdownFormatter, Sources,
};
pub use stream::{convert_stream, JobStream};
