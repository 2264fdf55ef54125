//! Intermediate representation produced by backend adapters.
//!
//! Every adapter, whatever its backend returns (page markdown, typed layout
//! blocks, …), lowers its response into a [`RawDocument`]: pages of
//! [`RawBlock`]s with page-relative bounding boxes, plus image payloads keyed
//! by adapter-local identifiers. The layout normaliser only ever sees this
//! shape, which is what keeps adapters interchangeable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis-aligned box in page-relative units, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width * 0.5
    }

    /// Whether every coordinate is finite, non-negative and inside the page.
    pub fn fits_within(&self, page_width: f32, page_height: f32) -> bool {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width >= 0.0
            && self.height >= 0.0
            && self.right() <= page_width
            && self.bottom() <= page_height
    }

    /// Clamp into `[0, page_width] × [0, page_height]`, zeroing non-finite values.
    pub fn clamped(&self, page_width: f32, page_height: f32) -> Self {
        let fix = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        let x = fix(self.x).min(page_width);
        let y = fix(self.y).min(page_height);
        let width = fix(self.width).min(page_width - x);
        let height = fix(self.height).min(page_height - y);
        Self::new(x, y, width, height)
    }
}

/// Classification of a block as reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Paragraph,
    ListItem,
    TableCell,
    Image,
    Unknown,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Heading => "heading",
            BlockKind::Paragraph => "paragraph",
            BlockKind::ListItem => "list item",
            BlockKind::TableCell => "table cell",
            BlockKind::Image => "image",
            BlockKind::Unknown => "unknown",
        }
    }
}

/// Block payload: text for everything except images, which carry either an
/// adapter-local image id (as text) or the image bytes inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockContent {
    Text(String),
    Binary(Vec<u8>),
}

impl BlockContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            BlockContent::Text(s) => Some(s),
            BlockContent::Binary(_) => None,
        }
    }
}

/// Inline style information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleFlags {
    pub bold: bool,
    pub italic: bool,
    /// 1..=6 for headings.
    pub heading_level: Option<u8>,
}

/// One classified content unit at a known position on its page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub kind: BlockKind,
    pub content: BlockContent,
    pub bbox: BoundingBox,
    /// Column index, when the backend knows it.
    pub column_hint: Option<u32>,
    pub style: StyleFlags,
}

impl RawBlock {
    pub fn new(kind: BlockKind, content: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            kind,
            content: BlockContent::Text(content.into()),
            bbox,
            column_hint: None,
            style: StyleFlags::default(),
        }
    }

    pub fn paragraph(content: impl Into<String>, bbox: BoundingBox) -> Self {
        Self::new(BlockKind::Paragraph, content, bbox)
    }

    pub fn heading(level: u8, content: impl Into<String>, bbox: BoundingBox) -> Self {
        let mut block = Self::new(BlockKind::Heading, content, bbox);
        block.style.heading_level = Some(level);
        block
    }

    pub fn list_item(content: impl Into<String>, bbox: BoundingBox) -> Self {
        Self::new(BlockKind::ListItem, content, bbox)
    }

    pub fn table_cell(content: impl Into<String>, bbox: BoundingBox) -> Self {
        Self::new(BlockKind::TableCell, content, bbox)
    }

    /// Image block referring to a payload in [`RawDocument::images`].
    pub fn image_ref(image_id: impl Into<String>, bbox: BoundingBox) -> Self {
        Self::new(BlockKind::Image, image_id, bbox)
    }

    /// Image block carrying its payload inline.
    pub fn image_inline(data: Vec<u8>, bbox: BoundingBox) -> Self {
        Self {
            kind: BlockKind::Image,
            content: BlockContent::Binary(data),
            bbox,
            column_hint: None,
            style: StyleFlags::default(),
        }
    }

    pub fn with_column(mut self, hint: u32) -> Self {
        self.column_hint = Some(hint);
        self
    }

    pub fn bold(mut self) -> Self {
        self.style.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.style.italic = true;
        self
    }
}

/// All blocks of one page, in adapter arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// 0-based page index.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<RawBlock>,
}

impl RawPage {
    pub fn new(index: usize, width: f32, height: f32) -> Self {
        Self {
            index,
            width,
            height,
            blocks: Vec::new(),
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<RawBlock>) -> Self {
        self.blocks = blocks;
        self
    }
}

/// Image payload returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImage {
    /// 0-based page the image was found on.
    pub page_index: usize,
    pub data: Vec<u8>,
}

/// Complete adapter output for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub pages: Vec<RawPage>,
    /// Image payloads keyed by adapter-local identifier.
    pub images: BTreeMap<String, RawImage>,
    /// Non-fatal anomalies the adapter noticed while lowering its response.
    pub warnings: Vec<String>,
}

impl RawDocument {
    pub fn total_blocks(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }
}
