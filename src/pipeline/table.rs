//! Table rendering: flat row-major cell list + sparse merge anchors → HTML.
//!
//! Markdown pipe tables cannot express merged cells, so tables are emitted
//! as a literal `<table>` block, one `<tr>` line per row:
//!
//! ```text
//! <table>
//! <tr><td rowspan="2">a</td><td>b</td></tr>
//! <tr><td>d</td></tr>
//! </table>
//! ```
//!
//! Cells covered by a merge anchor are skipped. Cell contents are rendered
//! with HTML inline tags (Markdown emphasis is not parsed inside an HTML
//! block) and flattened to a single line.

use crate::error::StructuralError;
use crate::model::{CellSpan, TableProperty};
use crate::pipeline::render::BlockRenderer;
use std::collections::HashSet;
use std::fmt::Write as _;

pub(crate) fn render_table(
    renderer: &mut BlockRenderer<'_>,
    table_id: &str,
    table: &TableProperty,
) -> Result<String, StructuralError> {
    let cells = table.cell_ids.len();
    if cells == 0 {
        return Ok(String::new());
    }
    let columns = table.column_count;
    if columns == 0 || cells % columns != 0 {
        return Err(StructuralError::CellCountMismatch {
            table: table_id.to_string(),
            cells,
            columns,
        });
    }
    let rows = cells / columns;
    let covered = covered_cells(table, rows, columns);

    let mut out = String::from("<table>\n");
    for row in 0..rows {
        out.push_str("<tr>");
        for col in 0..columns {
            if covered.contains(&(row, col)) {
                continue;
            }
            let cell_id = &table.cell_ids[row * columns + col];
            let content = renderer.render_cell(table_id, cell_id)?;
            out.push_str("<td");
            if let Some(span) = table.merges.get(&(row, col)) {
                let (row_end, col_end) = span_end((row, col), span, rows, columns);
                if row_end - row > 1 {
                    let _ = write!(out, " rowspan=\"{}\"", row_end - row);
                }
                if col_end - col > 1 {
                    let _ = write!(out, " colspan=\"{}\"", col_end - col);
                }
            }
            out.push('>');
            out.push_str(&content);
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    Ok(out)
}

/// Grid positions hidden under a merge anchor, anchors themselves excluded.
/// Spans running past the grid edge are clipped.
fn covered_cells(table: &TableProperty, rows: usize, columns: usize) -> HashSet<(usize, usize)> {
    let mut covered = HashSet::new();
    for (&(row, col), span) in &table.merges {
        let (row_end, col_end) = span_end((row, col), span, rows, columns);
        for r in row..row_end {
            for c in col..col_end {
                if (r, c) != (row, col) {
                    covered.insert((r, c));
                }
            }
        }
    }
    covered
}

/// Exclusive end row and column of the merge anchored at `anchor`, clipped
/// to the grid.
fn span_end(
    (row, col): (usize, usize),
    span: &CellSpan,
    rows: usize,
    columns: usize,
) -> (usize, usize) {
    (
        row.saturating_add(span.row_span).min(rows),
        col.saturating_add(span.col_span).min(columns),
    )
}

#[cfg(test)]
mod tests {
    use crate::error::StructuralError;
    use crate::model::{
        Block, BlockKind, BlockText, CellSpan, Document, TableProperty, TextElement, TextStyle,
    };
    use crate::pipeline::render::render_document;
    use std::collections::BTreeMap;

    fn cell(id: &str, text: &str) -> Vec<Block> {
        let para = format!("{id}_p");
        vec![
            Block::new(id, BlockKind::TableCell)
                .with_parent("t")
                .with_children([para.clone()]),
            Block::new(para, BlockKind::Text(BlockText::plain(text))).with_parent(id),
        ]
    }

    fn table_doc(
        columns: usize,
        cell_ids: &[&str],
        merges: BTreeMap<(usize, usize), CellSpan>,
    ) -> Vec<Block> {
        vec![
            Block::new("doc", BlockKind::Page(BlockText::default())).with_children(["t"]),
            Block::new(
                "t",
                BlockKind::Table(TableProperty {
                    column_count: columns,
                    cell_ids: cell_ids.iter().map(|s| s.to_string()).collect(),
                    merges,
                }),
            )
            .with_parent("doc")
            .with_children(cell_ids.iter().copied()),
        ]
    }

    fn render(blocks: Vec<Block>) -> Result<String, StructuralError> {
        render_document(&Document::new("doc", ""), blocks, false).map(|o| o.markdown)
    }

    #[test]
    fn plain_two_by_two() {
        let mut blocks = table_doc(2, &["a", "b", "c", "d"], BTreeMap::new());
        for (id, text) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")] {
            blocks.extend(cell(id, text));
        }
        assert_eq!(
            render(blocks).unwrap(),
            "<table>\n<tr><td>1</td><td>2</td></tr>\n<tr><td>3</td><td>4</td></tr>\n</table>\n"
        );
    }

    #[test]
    fn row_span_anchor_hides_covered_cell() {
        let mut merges = BTreeMap::new();
        merges.insert(
            (0, 0),
            CellSpan {
                row_span: 2,
                col_span: 1,
            },
        );
        let mut blocks = table_doc(2, &["a", "b", "c", "d"], merges);
        for (id, text) in [("a", "tall"), ("b", "2"), ("c", "hidden"), ("d", "4")] {
            blocks.extend(cell(id, text));
        }
        let out = render(blocks).unwrap();
        assert_eq!(out.matches("<td rowspan=\"2\">").count(), 1);
        assert!(!out.contains("colspan"));
        assert!(!out.contains("hidden"));
        assert!(out.contains("<tr><td>4</td></tr>"));
    }

    #[test]
    fn col_span_anchor() {
        let mut merges = BTreeMap::new();
        merges.insert(
            (1, 0),
            CellSpan {
                row_span: 1,
                col_span: 2,
            },
        );
        let mut blocks = table_doc(2, &["a", "b", "c", "d"], merges);
        for (id, text) in [("a", "1"), ("b", "2"), ("c", "wide"), ("d", "gone")] {
            blocks.extend(cell(id, text));
        }
        let out = render(blocks).unwrap();
        assert!(out.contains("<tr><td colspan=\"2\">wide</td></tr>"));
        assert!(!out.contains("gone"));
    }

    #[test]
    fn oversized_spans_clip_to_the_grid() {
        let mut merges = BTreeMap::new();
        merges.insert(
            (1, 0),
            CellSpan {
                row_span: usize::MAX,
                col_span: usize::MAX,
            },
        );
        let mut blocks = table_doc(2, &["a", "b", "c", "d"], merges);
        for (id, text) in [("a", "1"), ("b", "2"), ("c", "wide"), ("d", "gone")] {
            blocks.extend(cell(id, text));
        }
        let out = render(blocks).unwrap();
        assert!(out.contains("<tr><td colspan=\"2\">wide</td></tr>"), "got: {out}");
        assert!(!out.contains("rowspan"));
        assert!(!out.contains("gone"));
    }

    #[test]
    fn cell_content_uses_html_tags_and_br() {
        let mut blocks = table_doc(1, &["a"], BTreeMap::new());
        blocks.push(
            Block::new("a", BlockKind::TableCell)
                .with_parent("t")
                .with_children(["p1", "p2"]),
        );
        blocks.push(
            Block::new(
                "p1",
                BlockKind::Text(BlockText::new(vec![TextElement::styled(
                    "bold",
                    TextStyle::bold(),
                )])),
            )
            .with_parent("a"),
        );
        blocks.push(Block::new("p2", BlockKind::Text(BlockText::plain("next"))).with_parent("a"));
        let out = render(blocks).unwrap();
        assert!(
            out.contains("<td><strong>bold</strong><br/>next</td>"),
            "got: {out}"
        );
    }

    #[test]
    fn cell_count_mismatch_is_structural() {
        let mut blocks = table_doc(2, &["a", "b", "c"], BTreeMap::new());
        for id in ["a", "b", "c"] {
            blocks.extend(cell(id, id));
        }
        assert_eq!(
            render(blocks).unwrap_err(),
            StructuralError::CellCountMismatch {
                table: "t".into(),
                cells: 3,
                columns: 2
            }
        );
    }

    #[test]
    fn zero_columns_with_cells_is_structural() {
        let mut blocks = table_doc(0, &["a"], BTreeMap::new());
        blocks.extend(cell("a", "x"));
        assert!(matches!(
            render(blocks),
            Err(StructuralError::CellCountMismatch { columns: 0, .. })
        ));
    }

    #[test]
    fn empty_table_renders_nothing() {
        assert_eq!(render(table_doc(3, &[], BTreeMap::new())).unwrap(), "");
    }
}
