//! Canonical serialisation of normalised pages.
//!
//! A Markdown-like convention that keeps block kind and reading order
//! recoverable from plain text:
//!
//! | block | output |
//! |-------|--------|
//! | heading (level N) | `#`×N + space + text |
//! | bold / italic | `**text**`, `_text_`, `**_text_**` |
//! | list item | `- text` (consecutive items on consecutive lines) |
//! | table cells | one `| a | b |` row per y-band, header separator after row 1 |
//! | image | `![page1_img1](page1_img1)` at the block's position |
//! | paragraph / unknown | text |
//!
//! A line of paragraph, list or unknown text that opens with one of these
//! markers gets a backslash in front, so `\# 1 item` is a paragraph and
//! `# 1 item` is a heading.

use crate::config::LayoutConfig;
use crate::pipeline::normalize::{NormalizedBlock, NormalizedDocument, NormalizedPage};
use crate::raw::{BlockKind, StyleFlags};

/// Serialise every page, with the configured separator between pages.
pub fn serialize(doc: &NormalizedDocument, config: &LayoutConfig) -> String {
    let mut out = String::new();
    for (i, page) in doc.pages.iter().enumerate() {
        if i > 0 {
            out.push_str(&config.page_separator.render(page.index + 1));
        }
        out.push_str(&render_page(page, config));
    }
    out
}

/// Serialise one page. Blocks are separated by a blank line, except list
/// items and table rows, which stay on consecutive lines.
pub fn render_page(page: &NormalizedPage, config: &LayoutConfig) -> String {
    let tolerance = config.row_tolerance_ratio * page.height;
    let blocks = &page.blocks;
    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;

    while i < blocks.len() {
        let kind = blocks[i].block.kind;
        let column = blocks[i].column;
        match kind {
            BlockKind::TableCell | BlockKind::ListItem => {
                let end = blocks[i..]
                    .iter()
                    .position(|b| b.block.kind != kind || b.column != column)
                    .map_or(blocks.len(), |offset| i + offset);
                let run = &blocks[i..end];
                if kind == BlockKind::TableCell {
                    parts.push(render_table(run, tolerance));
                } else {
                    let items: Vec<String> = run.iter().map(render_block).collect();
                    parts.push(items.join("\n"));
                }
                i = end;
            }
            _ => {
                parts.push(render_block(&blocks[i]));
                i += 1;
            }
        }
    }

    parts.join("\n\n")
}

fn render_block(nb: &NormalizedBlock) -> String {
    let block = &nb.block;
    let text = block.content.as_text().unwrap_or_default();
    match block.kind {
        BlockKind::Heading => {
            let level = block.style.heading_level.unwrap_or(1).clamp(1, 6) as usize;
            format!("{} {}", "#".repeat(level), single_line(text))
        }
        BlockKind::ListItem => {
            let item = escape_markers(&single_line(text));
            format!("- {}", decorate(&item, &block.style))
        }
        BlockKind::Image => {
            let name = nb.image_name.as_deref().unwrap_or("image");
            format!("![{name}]({name})")
        }
        BlockKind::TableCell => format!("| {} |", cell_text(nb)),
        BlockKind::Paragraph | BlockKind::Unknown => {
            decorate(&escape_markers(text.trim()), &block.style)
        }
    }
}

/// Group cells into rows by top-edge proximity, then lay rows out left to right.
///
/// A cell that horizontally overlaps a cell already in the current row
/// starts a new row even within the tolerance: one row never holds two cells
/// of the same column.
fn render_table(cells: &[NormalizedBlock], tolerance: f32) -> String {
    let mut sorted: Vec<&NormalizedBlock> = cells.iter().collect();
    sorted.sort_by(|a, b| a.block.bbox.y.total_cmp(&b.block.bbox.y));

    let mut rows: Vec<Vec<&NormalizedBlock>> = Vec::new();
    let mut anchor = f32::NEG_INFINITY;
    for cell in sorted {
        let y = cell.block.bbox.y;
        if y - anchor <= tolerance {
            if let Some(row) = rows.last_mut() {
                if !row.iter().any(|other| overlaps_horizontally(other, cell)) {
                    row.push(cell);
                    continue;
                }
            }
        }
        rows.push(vec![cell]);
        anchor = y;
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter_mut().enumerate() {
        row.sort_by(|a, b| a.block.bbox.x.total_cmp(&b.block.bbox.x));
        let mut texts: Vec<String> = row.iter().map(|c| cell_text(c)).collect();
        texts.resize(width, String::new());
        lines.push(format!("| {} |", texts.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    lines.join("\n")
}

fn overlaps_horizontally(a: &NormalizedBlock, b: &NormalizedBlock) -> bool {
    let (a, b) = (&a.block.bbox, &b.block.bbox);
    a.x < b.right() && b.x < a.right()
}

fn cell_text(nb: &NormalizedBlock) -> String {
    let text = nb.block.content.as_text().unwrap_or_default();
    let escaped = single_line(text).replace('|', "\\|");
    decorate(&escaped, &nb.block.style)
}

/// Wrap text in emphasis markers according to its style flags.
fn decorate(text: &str, style: &StyleFlags) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    match (style.bold, style.italic) {
        (true, true) => format!("**_{text}_**"),
        (true, false) => format!("**{text}**"),
        (false, true) => format!("_{text}_"),
        (false, false) => text.to_string(),
    }
}

fn escape_markers(text: &str) -> String {
    text.lines().map(escape_line).collect::<Vec<_>>().join("\n")
}

fn escape_line(line: &str) -> String {
    let body = line.trim_start();
    let marker = body.starts_with(['#', '-', '+', '*', '_', '|', '>', '\\'])
        || body.starts_with("![")
        || body.starts_with("<!--");
    if marker {
        format!("\\{body}")
    } else {
        line.to_string()
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
