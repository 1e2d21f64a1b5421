//! Block renderer: recursive dispatch over a validated [`BlockStore`].
//!
//! Rendering is a pure function of the store and the [`RenderContext`]; the
//! only side effect is appending image tokens to the renderer's side channel
//! in pre-order, duplicates included. Every fragment returned by
//! [`BlockRenderer::render`] is either empty or newline-terminated.
//!
//! ## Layout rules
//!
//! - Siblings are separated by one blank line, except that two adjacent
//!   list items (bullet, ordered, todo) stay tight.
//! - Empty fragments (blank paragraphs, unknown types) take no space.
//! - Each indent level adds four spaces to every line a block emits itself.
//!   Only list items nest: their children render one level deeper. Children
//!   of a paragraph stay at the paragraph's level, since four spaces after a
//!   blank line would open an indented code block.
//! - Ordered items are numbered by their position in the parent's
//!   `children`, not by `parentId`, which dumps may omit.

use crate::error::StructuralError;
use crate::languages;
use crate::model::{Block, BlockKind, BlockText, Document};
use crate::pipeline::inline::render_text;
use crate::pipeline::store::BlockStore;
use crate::pipeline::table;
use tracing::{debug, warn};

/// Per-call rendering parameters, passed by value down the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub indent_level: usize,
    pub use_html_tags: bool,
}

impl RenderContext {
    pub fn new(use_html_tags: bool) -> Self {
        Self {
            indent_level: 0,
            use_html_tags,
        }
    }

    fn nested(self) -> Self {
        Self {
            indent_level: self.indent_level + 1,
            ..self
        }
    }

    fn flat(self) -> Self {
        Self {
            indent_level: 0,
            ..self
        }
    }
}

/// Result of rendering one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub markdown: String,
    /// Image tokens in pre-order discovery, duplicates kept.
    pub image_tokens: Vec<String>,
}

impl RenderOutput {
    /// Tokens in first-seen order with duplicates removed.
    pub fn distinct_tokens(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.image_tokens
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

/// Build a store from `blocks` and render the document's root.
///
/// This is the whole renderer in one call: no I/O, no async, deterministic.
pub fn render_document(
    document: &Document,
    blocks: Vec<Block>,
    use_html_tags: bool,
) -> Result<RenderOutput, StructuralError> {
    let store = BlockStore::build(blocks, document.root_block_id())?;
    render_store(&store, use_html_tags)
}

/// Render an already validated store from its root.
pub fn render_store(
    store: &BlockStore,
    use_html_tags: bool,
) -> Result<RenderOutput, StructuralError> {
    let mut renderer = BlockRenderer::new(store);
    let markdown = renderer.render(store.root_id(), RenderContext::new(use_html_tags))?;
    Ok(RenderOutput {
        markdown,
        image_tokens: renderer.into_tokens(),
    })
}

pub struct BlockRenderer<'a> {
    store: &'a BlockStore,
    tokens: Vec<String>,
}

impl<'a> BlockRenderer<'a> {
    pub fn new(store: &'a BlockStore) -> Self {
        Self {
            store,
            tokens: Vec::new(),
        }
    }

    /// Tokens collected so far.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }

    /// Render `block_id` and its subtree.
    pub fn render(&mut self, block_id: &str, ctx: RenderContext) -> Result<String, StructuralError> {
        let store = self.store;
        let block = store
            .get(block_id)
            .ok_or_else(|| StructuralError::MissingBlock {
                id: block_id.to_string(),
                referenced_by: "render call".to_string(),
            })?;
        let ordinal = self.ordered_number(block);
        self.render_block(block, ctx, ordinal)
    }

    /// `ordinal` is the block's 1-based position in its run of ordered
    /// siblings. Only the ordered branch reads it.
    fn render_block(
        &mut self,
        block: &Block,
        ctx: RenderContext,
        ordinal: usize,
    ) -> Result<String, StructuralError> {
        let html = ctx.use_html_tags;
        let out = match &block.kind {
            BlockKind::Page(text) => {
                let title = (!text.is_empty()).then(|| format!("# {}", render_text(text, html)));
                let children = self.render_children(block, ctx)?;
                join_sections(indent(title, ctx), children, false)
            }
            BlockKind::Text(text) => {
                let own = (!text.is_empty()).then(|| render_text(text, html));
                let children = self.render_children(block, ctx)?;
                join_sections(indent(own, ctx), children, false)
            }
            BlockKind::Heading { level, text } => {
                let hashes = "#".repeat(usize::from(*level));
                let own = format!("{hashes} {}", render_text(text, html));
                let children = self.render_children(block, ctx)?;
                join_sections(indent(Some(own), ctx), children, false)
            }
            BlockKind::Bullet(text) => self.list_item(block, "- ", text, ctx)?,
            BlockKind::Ordered(text) => {
                let marker = format!("{ordinal}. ");
                self.list_item(block, &marker, text, ctx)?
            }
            BlockKind::Todo { done, text } => {
                let marker = if *done { "- [x] " } else { "- [ ] " };
                self.list_item(block, marker, text, ctx)?
            }
            BlockKind::Code { language, text } => {
                let body = code_body(text);
                let ticks = fence_for(&body);
                let fence = format!("{ticks}{}\n{body}{ticks}\n", languages::fence_tag(language));
                indent_lines(&fence, ctx.indent_level)
            }
            BlockKind::Quote(text) => {
                let mut quoted = format!("> {}", render_text(text, html));
                quoted.push_str(&self.concat_children(block, ctx.flat())?);
                indent_lines(&quoted, ctx.indent_level)
            }
            BlockKind::Equation(text) => {
                let body = text.raw_text();
                let body = body.trim_end_matches('\n');
                indent_lines(&format!("$$\n{body}\n$$\n"), ctx.indent_level)
            }
            BlockKind::Divider => indent_lines("---\n", ctx.indent_level),
            BlockKind::Image { token } => {
                self.tokens.push(token.clone());
                indent_lines(&format!("![]({token})\n"), ctx.indent_level)
            }
            BlockKind::Table(property) => {
                let html_table = table::render_table(self, &block.id, property)?;
                indent_lines(&html_table, ctx.indent_level)
            }
            BlockKind::QuoteContainer => {
                let body = self.concat_children(block, ctx.flat())?;
                if body.is_empty() {
                    String::new()
                } else {
                    indent_lines(&format!("> {body}"), ctx.indent_level)
                }
            }
            BlockKind::Callout => {
                let marker = indent_lines("> [!NOTE]\n", ctx.indent_level);
                let children = self.render_children(block, ctx)?;
                join_sections(Some(marker), children, true)
            }
            BlockKind::TableCell | BlockKind::Grid | BlockKind::GridColumn => {
                self.render_children(block, ctx)?
            }
            BlockKind::Unknown { type_name } => {
                warn!(block = %block.id, block_type = %type_name, "Skipping unsupported block type");
                String::new()
            }
        };
        Ok(out)
    }

    /// Marker plus inline text, children one level deeper and tight.
    fn list_item(
        &mut self,
        block: &Block,
        marker: &str,
        text: &BlockText,
        ctx: RenderContext,
    ) -> Result<String, StructuralError> {
        let own = format!("{marker}{}", render_text(text, ctx.use_html_tags));
        let children = self.render_children(block, ctx.nested())?;
        Ok(join_sections(indent(Some(own), ctx), children, true))
    }

    /// Position among the run of consecutive ordered siblings ending at
    /// `block`, counting from 1, found through `parentId`. Only used when a
    /// block is rendered on its own; walks from a parent pass the position.
    fn ordered_number(&self, block: &Block) -> usize {
        let Some(parent) = block.parent_id.as_deref().and_then(|p| self.store.get(p)) else {
            return 1;
        };
        let Some(pos) = parent.children.iter().position(|c| *c == block.id) else {
            return 1;
        };
        let preceding = parent.children[..pos]
            .iter()
            .rev()
            .take_while(|id| {
                self.store
                    .get(id)
                    .is_some_and(|b| matches!(b.kind, BlockKind::Ordered(_)))
            })
            .count();
        preceding + 1
    }

    /// `block`'s children in order, each paired with its ordered-run
    /// position.
    fn child_blocks(&self, block: &Block) -> Result<Vec<(&'a Block, usize)>, StructuralError> {
        let store = self.store;
        let mut run = 0;
        block
            .children
            .iter()
            .map(|child_id| {
                let child = store
                    .get(child_id)
                    .ok_or_else(|| StructuralError::MissingBlock {
                        id: child_id.clone(),
                        referenced_by: block.id.clone(),
                    })?;
                run = if matches!(child.kind, BlockKind::Ordered(_)) { run + 1 } else { 0 };
                Ok((child, run.max(1)))
            })
            .collect()
    }

    /// Render every child of `block` back to back, no separators.
    fn concat_children(&mut self, block: &Block, ctx: RenderContext) -> Result<String, StructuralError> {
        let mut out = String::new();
        for (child, ordinal) in self.child_blocks(block)? {
            out.push_str(&self.render_block(child, ctx, ordinal)?);
        }
        Ok(out)
    }

    /// Render every child of `block` and join them with the sibling rules.
    fn render_children(&mut self, block: &Block, ctx: RenderContext) -> Result<String, StructuralError> {
        let mut out = String::new();
        let mut prev_list_item = false;
        for (child, ordinal) in self.child_blocks(block)? {
            let fragment = self.render_block(child, ctx, ordinal)?;
            if fragment.is_empty() {
                continue;
            }
            let list_item = child.kind.is_list_item();
            if !out.is_empty() && !(prev_list_item && list_item) {
                out.push('\n');
            }
            out.push_str(&fragment);
            prev_list_item = list_item;
        }
        Ok(out)
    }

    /// Render the contents of a table cell as a single line. A cell id that
    /// is not in the store yields an empty cell.
    pub(crate) fn render_cell(&mut self, table_id: &str, cell_id: &str) -> Result<String, StructuralError> {
        let store = self.store;
        let Some(cell) = store.get(cell_id) else {
            warn!(table = %table_id, cell = %cell_id, "Table cell missing, rendering empty");
            return Ok(String::new());
        };
        let ctx = RenderContext {
            indent_level: 0,
            use_html_tags: true,
        };
        let content = self.render_block(cell, ctx, 1)?;
        Ok(flatten_cell(&content))
    }
}

/// Join a block's own output with its rendered children. `tight` places the
/// children directly under the own output; otherwise a blank line separates
/// them.
fn join_sections(own: Option<String>, children: String, tight: bool) -> String {
    match own {
        Some(mut own) if !own.is_empty() => {
            if !children.is_empty() {
                if !tight {
                    own.push('\n');
                }
                own.push_str(&children);
            }
            own
        }
        _ => children,
    }
}

fn indent(own: Option<String>, ctx: RenderContext) -> Option<String> {
    own.map(|s| indent_lines(&s, ctx.indent_level))
}

/// Prefix every non-empty line with four spaces per level.
fn indent_lines(text: &str, level: usize) -> String {
    if level == 0 {
        return text.to_string();
    }
    let pad = "    ".repeat(level);
    let mut out = String::with_capacity(text.len() + pad.len() * 4);
    for line in text.split_inclusive('\n') {
        if line != "\n" {
            out.push_str(&pad);
        }
        out.push_str(line);
    }
    out
}

/// Raw code text with blank lines trimmed from both ends, newline-terminated
/// unless empty.
fn code_body(text: &BlockText) -> String {
    let raw = text.raw_text();
    let lines: Vec<&str> = raw.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => {
            let mut body = lines[start..=end].join("\n");
            body.push('\n');
            body
        }
        _ => {
            debug!("Empty code block");
            String::new()
        }
    }
}

/// A backtick fence one longer than the longest backtick run in `body`, and
/// never shorter than three.
fn fence_for(body: &str) -> String {
    let longest = body
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Collapse a cell's rendered Markdown to one line: blank lines dropped,
/// remaining line breaks become `<br/>`.
fn flatten_cell(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("<br/>")
}
