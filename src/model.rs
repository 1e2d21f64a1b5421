//! Block model for vendor docx documents.
//!
//! The vendor API returns a document as a flat list of blocks. Each block
//! names its type in a `blockType` discriminant and carries the type-specific
//! payload under a field of the same name:
//!
//! ```json
//! { "blockId": "h1", "blockType": "heading1", "parentId": "doc",
//!   "children": [], "heading1": { "elements": [ … ] } }
//! ```
//!
//! Decoding goes through a loose wire representation ([`RawBlock`]) that is
//! then converted into the closed [`BlockKind`] union, so the renderer never
//! looks up payload fields by name. Both the camelCase spelling above and the
//! vendor's snake_case spelling (`block_id`, `table_cell`, numeric
//! `block_type` codes) are accepted.

use crate::languages;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

// ── Document ─────────────────────────────────────────────────────────────

/// Document metadata returned alongside its blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(alias = "documentId", alias = "document_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "root_block_id", skip_serializing_if = "Option::is_none")]
    root_block_id: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            root_block_id: None,
        }
    }

    /// Use a root block whose id differs from the document id.
    pub fn with_root(mut self, root_block_id: impl Into<String>) -> Self {
        self.root_block_id = Some(root_block_id.into());
        self
    }

    /// The page block the render starts from. Defaults to the document id,
    /// which is how the vendor identifies a document's page block.
    pub fn root_block_id(&self) -> &str {
        self.root_block_id.as_deref().unwrap_or(&self.id)
    }
}

/// On-disk dump of one document: `{"document": …, "blocks": […]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentDump {
    pub document: Document,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

// ── Inline text ──────────────────────────────────────────────────────────

/// Link target attached to a text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub url: String,
}

/// Style flags on a text run.
///
/// Several flags may be set at once; the inline renderer applies only the
/// first one in precedence order (see [`crate::pipeline::inline`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    #[serde(alias = "inline_code")]
    pub inline_code: bool,
    pub link: Option<Link>,
}

impl TextStyle {
    pub fn bold() -> Self {
        Self {
            bold: true,
            ..Self::default()
        }
    }

    pub fn italic() -> Self {
        Self {
            italic: true,
            ..Self::default()
        }
    }

    pub fn link(url: impl Into<String>) -> Self {
        Self {
            link: Some(Link { url: url.into() }),
            ..Self::default()
        }
    }
}

/// One span inside a text-bearing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextElement {
    TextRun { content: String, style: TextStyle },
    MentionUser { user_id: String },
    MentionDoc { title: String, url: String },
    InlineEquation { content: String },
}

impl TextElement {
    pub fn plain(content: impl Into<String>) -> Self {
        TextElement::TextRun {
            content: content.into(),
            style: TextStyle::default(),
        }
    }

    pub fn styled(content: impl Into<String>, style: TextStyle) -> Self {
        TextElement::TextRun {
            content: content.into(),
            style,
        }
    }

    /// Raw text with no markup, used inside code fences and block equations.
    pub fn raw_content(&self) -> &str {
        match self {
            TextElement::TextRun { content, .. } => content,
            TextElement::MentionUser { user_id } => user_id,
            TextElement::MentionDoc { title, .. } => title,
            TextElement::InlineEquation { content } => content,
        }
    }
}

/// The text payload of a text-bearing block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockText {
    pub elements: Vec<TextElement>,
}

impl BlockText {
    pub fn new(elements: Vec<TextElement>) -> Self {
        Self { elements }
    }

    /// A single unstyled run.
    pub fn plain(content: impl Into<String>) -> Self {
        Self::new(vec![TextElement::plain(content)])
    }

    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(|e| e.raw_content().is_empty())
    }

    /// Concatenated raw content of every element.
    pub fn raw_text(&self) -> String {
        self.elements.iter().map(TextElement::raw_content).collect()
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────

/// Span of a merged table cell, anchored at its top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    pub row_span: usize,
    pub col_span: usize,
}

/// Table layout: cell ids in row-major order plus sparse merge anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableProperty {
    pub column_count: usize,
    pub cell_ids: Vec<String>,
    /// `(row, col)` of an anchor cell → its span. Unmerged cells are absent.
    pub merges: BTreeMap<(usize, usize), CellSpan>,
}

/// Closed set of block types, each with only its own payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Page(BlockText),
    Text(BlockText),
    Heading { level: u8, text: BlockText },
    Bullet(BlockText),
    Ordered(BlockText),
    Code { language: String, text: BlockText },
    Quote(BlockText),
    Equation(BlockText),
    Todo { done: bool, text: BlockText },
    Divider,
    Image { token: String },
    Table(TableProperty),
    TableCell,
    QuoteContainer,
    Callout,
    Grid,
    GridColumn,
    /// A type this crate does not know. Renders as nothing.
    Unknown { type_name: String },
}

impl BlockKind {
    /// Short name used in diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            BlockKind::Page(_) => "page",
            BlockKind::Text(_) => "text",
            BlockKind::Heading { .. } => "heading",
            BlockKind::Bullet(_) => "bullet",
            BlockKind::Ordered(_) => "ordered",
            BlockKind::Code { .. } => "code",
            BlockKind::Quote(_) => "quote",
            BlockKind::Equation(_) => "equation",
            BlockKind::Todo { .. } => "todo",
            BlockKind::Divider => "divider",
            BlockKind::Image { .. } => "image",
            BlockKind::Table(_) => "table",
            BlockKind::TableCell => "tableCell",
            BlockKind::QuoteContainer => "quoteContainer",
            BlockKind::Callout => "callout",
            BlockKind::Grid => "grid",
            BlockKind::GridColumn => "gridColumn",
            BlockKind::Unknown { type_name } => type_name,
        }
    }

    /// Bullet, ordered and todo items sit tight against each other.
    pub fn is_list_item(&self) -> bool {
        matches!(
            self,
            BlockKind::Bullet(_) | BlockKind::Ordered(_) | BlockKind::Todo { .. }
        )
    }
}

/// One node of a document's block tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBlock")]
pub struct Block {
    pub id: String,
    /// Lookup key of the parent block; never an owning reference.
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    pub kind: BlockKind,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            children: Vec::new(),
            kind,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Ids this block refers to: its children, then any table cells.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &String> {
        let cells = match &self.kind {
            BlockKind::Table(table) => table.cell_ids.as_slice(),
            _ => &[],
        };
        self.children.iter().chain(cells.iter())
    }
}

// ── Wire representation ──────────────────────────────────────────────────

/// Vendor numeric block type codes.
const VENDOR_BLOCK_TYPES: &[(u64, &str)] = &[
    (1, "page"),
    (2, "text"),
    (3, "heading1"),
    (4, "heading2"),
    (5, "heading3"),
    (6, "heading4"),
    (7, "heading5"),
    (8, "heading6"),
    (9, "heading7"),
    (10, "heading8"),
    (11, "heading9"),
    (12, "bullet"),
    (13, "ordered"),
    (14, "code"),
    (15, "quote"),
    (16, "equation"),
    (17, "todo"),
    (18, "bitable"),
    (19, "callout"),
    (20, "chatCard"),
    (21, "diagram"),
    (22, "divider"),
    (23, "file"),
    (24, "grid"),
    (25, "gridColumn"),
    (26, "iframe"),
    (27, "image"),
    (28, "isv"),
    (29, "mindnote"),
    (30, "sheet"),
    (31, "table"),
    (32, "tableCell"),
    (33, "view"),
    (34, "quoteContainer"),
];

#[derive(Deserialize)]
#[serde(untagged)]
enum BlockTypeTag {
    Name(String),
    Code(u64),
}

impl BlockTypeTag {
    fn name(&self) -> String {
        match self {
            BlockTypeTag::Name(name) => name.clone(),
            BlockTypeTag::Code(code) => VENDOR_BLOCK_TYPES
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, name)| (*name).to_string())
                .unwrap_or_else(|| format!("unknown({code})")),
        }
    }
}

/// Loose wire shape of a block; the payload stays untyped until conversion.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    #[serde(alias = "block_id", alias = "id")]
    block_id: String,
    #[serde(alias = "block_type")]
    block_type: BlockTypeTag,
    #[serde(default, alias = "parent_id")]
    parent_id: Option<String>,
    #[serde(default)]
    children: Vec<String>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

/// `heading1`, `Heading1` and `heading_1` all normalise to `heading1`.
fn normalise_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl RawBlock {
    fn payload(&self, normalised_type: &str) -> Option<&Value> {
        self.payload
            .iter()
            .find(|(key, _)| normalise_key(key) == normalised_type)
            .map(|(_, value)| value)
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawTextRun {
    content: String,
    #[serde(alias = "text_element_style", alias = "style")]
    text_element_style: TextStyle,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawMentionUser {
    #[serde(alias = "user_id")]
    user_id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMentionDoc {
    title: String,
    url: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawEquation {
    content: String,
}

/// At most one of these is set; element kinds this crate does not know
/// (reminders, inline files, …) leave all of them empty and are dropped.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawTextElement {
    #[serde(alias = "text_run")]
    text_run: Option<RawTextRun>,
    #[serde(alias = "mention_user")]
    mention_user: Option<RawMentionUser>,
    #[serde(alias = "mention_doc")]
    mention_doc: Option<RawMentionDoc>,
    equation: Option<RawEquation>,
}

impl RawTextElement {
    fn into_element(self) -> Option<TextElement> {
        if let Some(run) = self.text_run {
            return Some(TextElement::TextRun {
                content: run.content,
                style: run.text_element_style,
            });
        }
        if let Some(mention) = self.mention_user {
            return Some(TextElement::MentionUser {
                user_id: mention.user_id,
            });
        }
        if let Some(doc) = self.mention_doc {
            return Some(TextElement::MentionDoc {
                title: doc.title,
                url: doc.url,
            });
        }
        self.equation.map(|eq| TextElement::InlineEquation {
            content: eq.content,
        })
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTextBlockStyle {
    language: Option<Value>,
    done: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTextPayload {
    elements: Vec<RawTextElement>,
    style: RawTextBlockStyle,
}

impl RawTextPayload {
    fn text(&mut self) -> BlockText {
        let elements = std::mem::take(&mut self.elements)
            .into_iter()
            .filter_map(RawTextElement::into_element)
            .collect();
        BlockText { elements }
    }

    fn language(&self) -> String {
        match &self.style.language {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(languages::name_for_code)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawImage {
    token: String,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
struct RawMergeInfo {
    #[serde(default = "one", alias = "row_span")]
    row_span: usize,
    #[serde(default = "one", alias = "col_span")]
    col_span: usize,
}

fn one() -> usize {
    1
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawTableProperty {
    #[serde(alias = "column_size", alias = "columnCount")]
    column_size: usize,
    /// Dense, row-major: one entry per cell.
    #[serde(alias = "merge_info")]
    merge_info: Vec<RawMergeInfo>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawTable {
    cells: Option<Vec<String>>,
    property: RawTableProperty,
}

fn decode<T: for<'de> Deserialize<'de> + Default>(
    value: Option<&Value>,
    block_id: &str,
    type_name: &str,
) -> Result<T, String> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => T::deserialize(v)
            .map_err(|e| format!("block '{block_id}': bad '{type_name}' payload: {e}")),
    }
}

fn text_payload(raw: &RawBlock, key: &str) -> Result<RawTextPayload, String> {
    decode(raw.payload(key), &raw.block_id, key)
}

impl TryFrom<RawBlock> for Block {
    type Error = String;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let type_name = raw.block_type.name();
        let key = normalise_key(&type_name);

        let kind = match key.as_str() {
            "page" => BlockKind::Page(text_payload(&raw, &key)?.text()),
            "text" => BlockKind::Text(text_payload(&raw, &key)?.text()),
            "bullet" => BlockKind::Bullet(text_payload(&raw, &key)?.text()),
            "ordered" => BlockKind::Ordered(text_payload(&raw, &key)?.text()),
            "quote" => BlockKind::Quote(text_payload(&raw, &key)?.text()),
            "equation" => BlockKind::Equation(text_payload(&raw, &key)?.text()),
            "code" => {
                let mut payload = text_payload(&raw, &key)?;
                BlockKind::Code {
                    language: payload.language(),
                    text: payload.text(),
                }
            }
            "todo" => {
                let mut payload = text_payload(&raw, &key)?;
                BlockKind::Todo {
                    done: payload.style.done,
                    text: payload.text(),
                }
            }
            "divider" => BlockKind::Divider,
            "image" => {
                let image: RawImage = raw
                    .payload(&key)
                    .map(RawImage::deserialize)
                    .transpose()
                    .map_err(|e| format!("block '{}': bad image payload: {e}", raw.block_id))?
                    .ok_or_else(|| format!("block '{}': image without token", raw.block_id))?;
                BlockKind::Image { token: image.token }
            }
            "table" => {
                let table: RawTable = decode(raw.payload(&key), &raw.block_id, &key)?;
                BlockKind::Table(table_property(table, &raw.children))
            }
            "tablecell" => BlockKind::TableCell,
            "quotecontainer" => BlockKind::QuoteContainer,
            "callout" => BlockKind::Callout,
            "grid" => BlockKind::Grid,
            "gridcolumn" => BlockKind::GridColumn,
            heading if heading.starts_with("heading") => {
                match heading["heading".len()..].parse::<u8>() {
                    Ok(level @ 1..=9) => BlockKind::Heading {
                        level,
                        text: text_payload(&raw, &key)?.text(),
                    },
                    _ => BlockKind::Unknown { type_name },
                }
            }
            _ => {
                debug!(block = %raw.block_id, block_type = %type_name, "Decoded unknown block type");
                BlockKind::Unknown { type_name }
            }
        };

        Ok(Block {
            id: raw.block_id,
            parent_id: raw.parent_id.filter(|p| !p.is_empty()),
            children: raw.children,
            kind,
        })
    }
}

/// Dense per-cell merge info becomes a sparse anchor map. The cell list falls
/// back to the block's children when the payload omits it.
fn table_property(table: RawTable, children: &[String]) -> TableProperty {
    let column_count = table.property.column_size;
    let cell_ids = table.cells.unwrap_or_else(|| children.to_vec());
    let merges = if column_count == 0 {
        BTreeMap::new()
    } else {
        table
            .property
            .merge_info
            .iter()
            .enumerate()
            .filter(|(_, m)| m.row_span > 1 || m.col_span > 1)
            .map(|(i, m)| {
                (
                    (i / column_count, i % column_count),
                    CellSpan {
                        row_span: m.row_span.max(1),
                        col_span: m.col_span.max(1),
                    },
                )
            })
            .collect()
    };
    TableProperty {
        column_count,
        cell_ids,
        merges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(value: Value) -> Block {
        serde_json::from_value(value).expect("valid block")
    }

    #[test]
    fn decodes_heading_with_styled_runs() {
        let b = block(json!({
            "blockId": "h1",
            "blockType": "heading2",
            "parentId": "doc",
            "heading2": { "elements": [
                { "textRun": { "content": "Hello ", "textElementStyle": { "bold": true } } },
                { "mentionUser": { "userId": "ou_123" } }
            ]}
        }));
        assert_eq!(b.id, "h1");
        assert_eq!(b.parent_id.as_deref(), Some("doc"));
        let BlockKind::Heading { level, text } = b.kind else {
            panic!("expected heading");
        };
        assert_eq!(level, 2);
        assert_eq!(text.elements.len(), 2);
        assert_eq!(
            text.elements[0],
            TextElement::styled("Hello ", TextStyle::bold())
        );
        assert_eq!(
            text.elements[1],
            TextElement::MentionUser {
                user_id: "ou_123".into()
            }
        );
    }

    #[test]
    fn decodes_vendor_snake_case_and_numeric_types() {
        let b = block(json!({
            "block_id": "c1",
            "block_type": 32,
            "parent_id": "t1",
            "children": ["p1"],
            "table_cell": {}
        }));
        assert_eq!(b.kind, BlockKind::TableCell);
        assert_eq!(b.children, vec!["p1".to_string()]);

        let code = block(json!({
            "block_id": "k1",
            "block_type": 14,
            "code": {
                "elements": [{ "text_run": { "content": "fn main() {}" } }],
                "style": { "language": 53 }
            }
        }));
        let BlockKind::Code { language, text } = code.kind else {
            panic!("expected code");
        };
        assert_eq!(language, "Rust");
        assert_eq!(text.raw_text(), "fn main() {}");
    }

    #[test]
    fn todo_reads_done_flag() {
        let b = block(json!({
            "blockId": "t",
            "blockType": "todo",
            "todo": { "elements": [], "style": { "done": true } }
        }));
        assert!(matches!(b.kind, BlockKind::Todo { done: true, .. }));
    }

    #[test]
    fn unknown_type_is_kept_not_rejected() {
        let b = block(json!({
            "blockId": "x",
            "blockType": "mindnote",
            "mindnote": { "token": "abc" }
        }));
        assert_eq!(
            b.kind,
            BlockKind::Unknown {
                type_name: "mindnote".into()
            }
        );
        let numeric = block(json!({ "blockId": "y", "blockType": 999 }));
        assert_eq!(numeric.kind.type_name(), "unknown(999)");
    }

    #[test]
    fn unknown_inline_elements_are_dropped() {
        let b = block(json!({
            "blockId": "p",
            "blockType": "text",
            "text": { "elements": [
                { "reminder": { "expireTime": "1" } },
                { "textRun": { "content": "kept" } }
            ]}
        }));
        let BlockKind::Text(text) = b.kind else {
            panic!("expected text");
        };
        assert_eq!(text.elements, vec![TextElement::plain("kept")]);
    }

    #[test]
    fn table_merge_info_becomes_sparse() {
        let b = block(json!({
            "blockId": "tbl",
            "blockType": "table",
            "children": ["a", "b", "c", "d"],
            "table": {
                "cells": ["a", "b", "c", "d"],
                "property": {
                    "rowSize": 2,
                    "columnSize": 2,
                    "mergeInfo": [
                        { "rowSpan": 2, "colSpan": 1 },
                        { "rowSpan": 1, "colSpan": 1 },
                        { "rowSpan": 1, "colSpan": 1 },
                        { "rowSpan": 1, "colSpan": 1 }
                    ]
                }
            }
        }));
        let BlockKind::Table(table) = b.kind else {
            panic!("expected table");
        };
        assert_eq!(table.column_count, 2);
        assert_eq!(table.cell_ids.len(), 4);
        assert_eq!(table.merges.len(), 1);
        assert_eq!(
            table.merges.get(&(0, 0)),
            Some(&CellSpan {
                row_span: 2,
                col_span: 1
            })
        );
    }

    #[test]
    fn image_without_token_is_rejected() {
        let result: Result<Block, _> =
            serde_json::from_value(json!({ "blockId": "i", "blockType": "image" }));
        assert!(result.is_err());
    }

    #[test]
    fn empty_parent_id_means_root() {
        let b = block(json!({ "blockId": "doc", "blockType": 1, "parentId": "" }));
        assert_eq!(b.parent_id, None);
    }

    #[test]
    fn document_root_defaults_to_id() {
        let doc: Document =
            serde_json::from_value(json!({ "documentId": "doxcn1", "title": "T" })).unwrap();
        assert_eq!(doc.root_block_id(), "doxcn1");
        assert_eq!(Document::new("d", "t").with_root("r").root_block_id(), "r");
    }
}
