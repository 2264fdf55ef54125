//! Lowering of backend-produced Markdown into [`RawBlock`]s.
//!
//! Page-markdown backends return text already in reading order but no
//! geometry. Each recognised unit (heading, paragraph, list item, table row,
//! image) gets a synthetic full-width slot stacked top to bottom, and every
//! block carries column hint 0 so the normaliser keeps the backend's order.
//! Table cells are laid out side by side inside their row's slot so the
//! serialiser can rebuild the grid.

use crate::raw::{BoundingBox, RawBlock};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").unwrap());
static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d{1,3}[.)])\s+(.*)$").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]+)\)").unwrap());
static RE_BOLD_ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(?:\*\*\*|___)(.+)(?:\*\*\*|___)$").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^(?:\*\*|__)(.+)(?:\*\*|__)$").unwrap());
static RE_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^[*_]([^*_].*)[*_]$").unwrap());

/// Share of a slot a block occupies; the rest is the gap to the next one.
const SLOT_FILL: f32 = 0.9;

/// One recognised unit before geometry is assigned.
#[derive(Debug, Clone, PartialEq)]
enum Unit {
    Heading(u8, String),
    Paragraph(String),
    ListItem(String),
    TableRow(Vec<String>),
    Image(String),
}

/// Convert one page of Markdown into blocks filling a `width × height` page.
pub fn page_blocks(markdown: &str, width: f32, height: f32) -> Vec<RawBlock> {
    let units = parse_units(markdown);
    if units.is_empty() {
        return Vec::new();
    }

    let slot = height / units.len() as f32;
    let mut blocks = Vec::with_capacity(units.len());
    let mut table_width = 0;
    for (i, unit) in units.into_iter().enumerate() {
        let bbox = BoundingBox::new(0.0, i as f32 * slot, width, slot * SLOT_FILL);
        if let Unit::TableRow(cells) = &unit {
            table_width = table_width.max(cells.len());
        } else {
            table_width = 0;
        }
        match unit {
            Unit::TableRow(cells) => {
                blocks.extend(row_cells(cells, bbox, table_width.max(1)));
            }
            other => blocks.push(unit_block(other, bbox)),
        }
    }
    blocks.into_iter().map(|b| b.with_column(0)).collect()
}

/// Convert a Markdown (or plain pipe-delimited) table into cells laid out
/// inside `bbox`. Falls back to a single paragraph when no row parses.
pub fn table_cells(markdown: &str, bbox: BoundingBox) -> Vec<RawBlock> {
    let rows: Vec<Vec<String>> = markdown.lines().filter_map(parse_table_row).collect();
    if rows.is_empty() {
        return vec![RawBlock::paragraph(markdown.trim(), bbox)];
    }
    let columns = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let row_height = bbox.height / rows.len() as f32;
    rows.into_iter()
        .enumerate()
        .flat_map(|(r, cells)| {
            let slot = BoundingBox::new(
                bbox.x,
                bbox.y + r as f32 * row_height,
                bbox.width,
                row_height * SLOT_FILL,
            );
            row_cells(cells, slot, columns)
        })
        .collect()
}

fn row_cells(cells: Vec<String>, slot: BoundingBox, columns: usize) -> Vec<RawBlock> {
    let cell_width = slot.width / columns as f32;
    cells
        .into_iter()
        .enumerate()
        .map(|(c, text)| {
            // Shrunk so neighbouring cells never touch.
            let bbox = BoundingBox::new(
                slot.x + c as f32 * cell_width,
                slot.y,
                cell_width * 0.9,
                slot.height,
            );
            styled(RawBlock::table_cell, &text, bbox)
        })
        .collect()
}

fn unit_block(unit: Unit, bbox: BoundingBox) -> RawBlock {
    match unit {
        Unit::Heading(level, text) => RawBlock::heading(level, strip_emphasis(&text), bbox),
        Unit::Paragraph(text) => styled(RawBlock::paragraph, &text, bbox),
        Unit::ListItem(text) => styled(RawBlock::list_item, &text, bbox),
        Unit::Image(id) => RawBlock::image_ref(id, bbox),
        Unit::TableRow(cells) => RawBlock::paragraph(cells.join(" "), bbox),
    }
}

/// Build a block, lifting whole-block emphasis markers into style flags.
fn styled(make: fn(String, BoundingBox) -> RawBlock, text: &str, bbox: BoundingBox) -> RawBlock {
    let text = text.trim();
    if let Some(caps) = RE_BOLD_ITALIC.captures(text) {
        return make(caps[1].to_string(), bbox).bold().italic();
    }
    if let Some(caps) = RE_BOLD.captures(text) {
        if !caps[1].contains("**") {
            return make(caps[1].to_string(), bbox).bold();
        }
    }
    if let Some(caps) = RE_ITALIC.captures(text) {
        if !caps[1].contains(['*', '_']) {
            return make(caps[1].to_string(), bbox).italic();
        }
    }
    make(text.to_string(), bbox)
}

fn strip_emphasis(text: &str) -> String {
    let text = text.trim();
    [&*RE_BOLD_ITALIC, &*RE_BOLD]
        .iter()
        .find_map(|re| re.captures(text).map(|c| c[1].to_string()))
        .unwrap_or_else(|| text.to_string())
}

fn parse_units(markdown: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut fence: Option<Vec<&str>> = None;

    fn flush(paragraph: &mut Vec<&str>, units: &mut Vec<Unit>) {
        if !paragraph.is_empty() {
            push_paragraph(&paragraph.join("\n"), units);
            paragraph.clear();
        }
    }

    for line in markdown.lines() {
        let trimmed = line.trim();

        if let Some(lines) = fence.as_mut() {
            lines.push(line);
            if trimmed.starts_with("```") {
                units.push(Unit::Paragraph(lines.join("\n")));
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            flush(&mut paragraph, &mut units);
            fence = Some(vec![line]);
            continue;
        }
        if trimmed.is_empty() {
            flush(&mut paragraph, &mut units);
            continue;
        }
        if let Some(caps) = RE_HEADING.captures(trimmed) {
            flush(&mut paragraph, &mut units);
            units.push(Unit::Heading(caps[1].len() as u8, caps[2].to_string()));
            continue;
        }
        if let Some(row) = parse_table_row(trimmed) {
            flush(&mut paragraph, &mut units);
            units.push(Unit::TableRow(row));
            continue;
        }
        if is_separator_row(trimmed) {
            continue;
        }
        if let Some(caps) = RE_LIST_ITEM.captures(line) {
            flush(&mut paragraph, &mut units);
            units.push(Unit::ListItem(caps[1].to_string()));
            continue;
        }
        paragraph.push(trimmed);
    }

    // Unterminated fence: keep what was collected.
    if let Some(lines) = fence {
        units.push(Unit::Paragraph(lines.join("\n")));
    }
    flush(&mut paragraph, &mut units);
    units
}

/// Split a paragraph around inline image references, keeping their order.
fn push_paragraph(text: &str, units: &mut Vec<Unit>) {
    let mut last = 0;
    for caps in RE_IMAGE.captures_iter(text) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let before = text[last..whole.start()].trim();
        if !before.is_empty() {
            units.push(Unit::Paragraph(before.to_string()));
        }
        units.push(Unit::Image(id.as_str().to_string()));
        last = whole.end();
    }
    let rest = text[last..].trim();
    if !rest.is_empty() {
        units.push(Unit::Paragraph(rest.to_string()));
    }
}

/// Cells of a `| a | b |` row; `None` for non-rows and separator rows.
fn parse_table_row(line: &str) -> Option<Vec<String>> {
    let line = line.trim();
    if !line.starts_with('|') || line.len() < 2 || is_separator_row(line) {
        return None;
    }
    let inner = line.strip_prefix('|')?;
    let inner = inner.strip_suffix('|').unwrap_or(inner);

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    Some(cells)
}

fn is_separator_row(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('|')
        && line.contains('-')
        && line
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}
