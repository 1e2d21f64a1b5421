//! Pipeline stages for block-tree-to-Markdown conversion.
//!
//! Each submodule owns one step, so every step can be tested on its own
//! and the asset or formatting stage can be replaced without touching the
//! renderer.
//!
//! ## Data Flow
//!
//! ```text
//! blocks ──▶ store ──▶ render ──▶ assets ──▶ postprocess
//! (vendor)  (index)   (+inline,  (fetch +    (cleanup)
//!                      table)     substitute)
//! ```
//!
//! 1. [`store`]  index blocks by id, reject dangling references and cycles
//! 2. [`render`] walk the tree from the root; pure and CPU-bound, so callers
//!    run it in `spawn_blocking`
//! 3. [`inline`] text runs, mentions and equations inside one block
//! 4. [`table`]  HTML tables with row/column spans
//! 5. [`assets`] fetch each distinct image once and swap placeholders for
//!    relative paths; the only stage with I/O
//! 6. [`postprocess`] deterministic whitespace cleanup

pub mod assets;
pub mod inline;
pub mod postprocess;
pub mod render;
pub mod store;
pub mod table;
