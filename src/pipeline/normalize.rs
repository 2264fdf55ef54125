//! Layout normalisation: adapter output → ordered, classified pages.
//!
//! The normaliser never drops a block. Anything it cannot trust (binary
//! payload on a text block, out-of-range heading level, image without a
//! payload, text block with no text, bounding box outside the page) is repaired or downgraded to
//! [`BlockKind::Unknown`] and recorded as a warning, so the caller always sees
//! either clean output or an explanation.

use crate::config::LayoutConfig;
use crate::pipeline::columns;
use crate::raw::{BlockContent, BlockKind, RawBlock, RawDocument, RawImage, RawPage};
use std::collections::BTreeMap;
use tracing::debug;

/// A block placed in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBlock {
    pub block: RawBlock,
    /// Column within its band, left to right.
    pub column: usize,
    /// Canonical image name for image blocks.
    pub image_name: Option<String>,
}

/// One page whose blocks are in final reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPage {
    /// 0-based page index.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<NormalizedBlock>,
}

/// Normaliser output, ready for serialisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDocument {
    /// Ascending page index, one entry per distinct page.
    pub pages: Vec<NormalizedPage>,
    pub images: BTreeMap<String, Vec<u8>>,
    pub warnings: Vec<String>,
}

impl NormalizedDocument {
    pub fn block_count(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }
}

/// Orders and classifies the blocks of a [`RawDocument`].
pub struct LayoutNormalizer<'a> {
    config: &'a LayoutConfig,
    extract_images: bool,
}

impl<'a> LayoutNormalizer<'a> {
    pub fn new(config: &'a LayoutConfig, extract_images: bool) -> Self {
        Self {
            config,
            extract_images,
        }
    }

    pub fn normalize(&self, raw: RawDocument) -> NormalizedDocument {
        let RawDocument {
            pages,
            mut images,
            mut warnings,
        } = raw;

        let pages = merge_pages(pages, &mut warnings);
        let mut names = ImageNamer::default();
        let mut payloads = BTreeMap::new();
        let mut out = Vec::with_capacity(pages.len());

        for page in pages {
            out.push(self.normalize_page(
                page,
                &mut images,
                &mut names,
                &mut payloads,
                &mut warnings,
            ));
        }

        // Payloads no block referenced are supplementary but still kept.
        if self.extract_images {
            for (id, image) in images {
                let name = names.next(image.page_index);
                debug!("Keeping unreferenced image '{}' as {}", id, name);
                payloads.insert(name, image.data);
            }
        }

        NormalizedDocument {
            pages: out,
            images: payloads,
            warnings,
        }
    }

    fn normalize_page(
        &self,
        page: RawPage,
        images: &mut BTreeMap<String, RawImage>,
        names: &mut ImageNamer,
        payloads: &mut BTreeMap<String, Vec<u8>>,
        warnings: &mut Vec<String>,
    ) -> NormalizedPage {
        let page_num = page.index + 1;
        let (width, height) = page_dimensions(&page, warnings);

        let mut clamped = 0usize;
        let blocks: Vec<RawBlock> = page
            .blocks
            .into_iter()
            .map(|mut block| {
                if !block.bbox.fits_within(width, height) {
                    clamped += 1;
                    block.bbox = block.bbox.clamped(width, height);
                }
                classify(block, page_num, warnings)
            })
            .collect();
        if clamped > 0 {
            warnings.push(format!(
                "page {page_num}: {clamped} block(s) had bounding boxes outside the page and were clamped"
            ));
        }

        let layout = columns::resolve(&blocks, width, height, self.config);
        if layout.unhinted > 0 {
            warnings.push(format!(
                "page {page_num}: {} block(s) had no column hint and were placed by position",
                layout.unhinted
            ));
        }

        let mut slots: Vec<Option<RawBlock>> = blocks.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(slots.len());
        for (&idx, &column) in layout.order.iter().zip(&layout.columns) {
            let Some(block) = slots[idx].take() else {
                continue;
            };
            let (block, image_name) = if block.kind == BlockKind::Image {
                self.attach_image(block, page.index, images, names, payloads, warnings)
            } else {
                (block, None)
            };
            ordered.push(NormalizedBlock {
                block,
                column,
                image_name,
            });
        }

        NormalizedPage {
            index: page.index,
            width,
            height,
            blocks: ordered,
        }
    }

    /// Resolve an image block's payload and give it its canonical name.
    fn attach_image(
        &self,
        mut block: RawBlock,
        page_index: usize,
        images: &mut BTreeMap<String, RawImage>,
        names: &mut ImageNamer,
        payloads: &mut BTreeMap<String, Vec<u8>>,
        warnings: &mut Vec<String>,
    ) -> (RawBlock, Option<String>) {
        let resolved = match &block.content {
            BlockContent::Binary(data) => Ok(Some(data.clone())),
            BlockContent::Text(id) => match images.remove(id.as_str()) {
                Some(image) => Ok(Some(image.data)),
                None if self.extract_images => Err(id.clone()),
                None => Ok(None),
            },
        };

        let payload = match resolved {
            Ok(payload) => payload,
            Err(id) => {
                warnings.push(format!(
                    "page {}: image '{}' has no payload; emitted as text",
                    page_index + 1,
                    id
                ));
                block.kind = BlockKind::Unknown;
                block.content = BlockContent::Text(format!("[image {id} unavailable]"));
                return (block, None);
            }
        };

        let name = names.next(page_index);
        if self.extract_images {
            if let Some(data) = payload {
                payloads.insert(name.clone(), data);
            }
        }
        (block, Some(name))
    }
}

/// Sort pages by index and fold duplicates together.
fn merge_pages(mut pages: Vec<RawPage>, warnings: &mut Vec<String>) -> Vec<RawPage> {
    pages.sort_by_key(|p| p.index);
    let mut merged: Vec<RawPage> = Vec::with_capacity(pages.len());
    for page in pages {
        let duplicate = merged.last().is_some_and(|last| last.index == page.index);
        if !duplicate {
            merged.push(page);
            continue;
        }
        warnings.push(format!(
            "page {}: returned more than once by the backend; blocks merged",
            page.index + 1
        ));
        if let Some(last) = merged.last_mut() {
            last.width = last.width.max(page.width);
            last.height = last.height.max(page.height);
            last.blocks.extend(page.blocks);
        }
    }
    merged
}

/// Page size, derived from block extents when the backend reported none.
fn page_dimensions(page: &RawPage, warnings: &mut Vec<String>) -> (f32, f32) {
    let valid = |v: f32| v.is_finite() && v > 0.0;
    if valid(page.width) && valid(page.height) {
        return (page.width, page.height);
    }

    let extent = |f: fn(&RawBlock) -> f32| {
        page.blocks
            .iter()
            .map(f)
            .filter(|v| v.is_finite())
            .fold(1.0_f32, f32::max)
    };
    let width = if valid(page.width) {
        page.width
    } else {
        extent(|b| b.bbox.right())
    };
    let height = if valid(page.height) {
        page.height
    } else {
        extent(|b| b.bbox.bottom())
    };
    if !page.blocks.is_empty() {
        warnings.push(format!(
            "page {}: backend reported no page size; derived {width:.0}×{height:.0} from block extents",
            page.index + 1
        ));
    }
    (width, height)
}

/// Repair or downgrade blocks whose declared kind does not match their content.
fn classify(mut block: RawBlock, page_num: usize, warnings: &mut Vec<String>) -> RawBlock {
    let binary_text = match &block.content {
        BlockContent::Binary(data) if block.kind != BlockKind::Image => {
            Some(String::from_utf8_lossy(data).into_owned())
        }
        _ => None,
    };
    if let Some(text) = binary_text {
        if block.kind != BlockKind::Unknown {
            warnings.push(format!(
                "page {page_num}: {} block carried binary content; emitted as unknown",
                block.kind.as_str()
            ));
        }
        block.kind = BlockKind::Unknown;
        block.content = BlockContent::Text(text);
    }

    if block.kind == BlockKind::Heading {
        match block.style.heading_level {
            None => block.style.heading_level = Some(1),
            Some(level) if !(1..=6).contains(&level) => {
                let clamped = level.clamp(1, 6);
                warnings.push(format!(
                    "page {page_num}: heading level {level} clamped to {clamped}"
                ));
                block.style.heading_level = Some(clamped);
            }
            Some(_) => {}
        }
    }

    // Empty cells are a normal part of a table row.
    let empty = !matches!(block.kind, BlockKind::Image | BlockKind::TableCell)
        && block.content.as_text().is_some_and(|t| t.trim().is_empty());
    if empty {
        let kind = block.kind.as_str();
        warnings.push(format!(
            "page {page_num}: {kind} block had no text; emitted as a placeholder"
        ));
        block.kind = BlockKind::Unknown;
        block.content = BlockContent::Text(format!("[empty {kind}]"));
    }
    block
}

/// Hands out `page{N}_img{M}` names, M counting per page from 1.
#[derive(Default)]
struct ImageNamer {
    counters: BTreeMap<usize, usize>,
}

impl ImageNamer {
    fn next(&mut self, page_index: usize) -> String {
        let counter = self.counters.entry(page_index).or_insert(0);
        *counter += 1;
        format!("page{}_img{}", page_index + 1, counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::markup;
    use crate::provider::markdown;
    use crate::raw::BoundingBox;

    fn bbox(y: f32) -> BoundingBox {
        BoundingBox::new(50.0, y, 500.0, 20.0)
    }

    fn page(index: usize, blocks: Vec<RawBlock>) -> RawPage {
        RawPage::new(index, 612.0, 792.0).with_blocks(blocks)
    }

    #[test]
    fn pages_are_sorted_and_duplicates_merged() {
        let raw = RawDocument {
            pages: vec![
                page(2, vec![RawBlock::paragraph("c", bbox(10.0))]),
                page(0, vec![RawBlock::paragraph("a", bbox(10.0))]),
                page(2, vec![RawBlock::paragraph("d", bbox(40.0))]),
            ],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        let indices: Vec<usize> = doc.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, [0, 2]);
        assert_eq!(doc.pages[1].blocks.len(), 2);
        assert_eq!(doc.warnings.len(), 1);
        assert!(doc.warnings[0].starts_with("page 3:"));
    }

    #[test]
    fn images_get_canonical_names_in_reading_order() {
        let mut raw = RawDocument {
            pages: vec![page(
                0,
                vec![
                    RawBlock::image_ref("fig-b", bbox(400.0)),
                    RawBlock::image_ref("fig-a", bbox(100.0)),
                    RawBlock::image_inline(vec![9, 9], bbox(700.0)),
                ],
            )],
            ..RawDocument::default()
        };
        raw.images.insert("fig-a".into(), RawImage { page_index: 0, data: vec![1] });
        raw.images.insert("fig-b".into(), RawImage { page_index: 0, data: vec![2] });
        raw.images.insert("orphan".into(), RawImage { page_index: 1, data: vec![3] });

        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        let names: Vec<_> = doc.pages[0]
            .blocks
            .iter()
            .map(|b| b.image_name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, ["page1_img1", "page1_img2", "page1_img3"]);
        assert_eq!(doc.images["page1_img1"], vec![1]);
        assert_eq!(doc.images["page1_img2"], vec![2]);
        assert_eq!(doc.images["page1_img3"], vec![9, 9]);
        assert_eq!(doc.images["page2_img1"], vec![3]);
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn missing_image_payload_is_downgraded_with_warning() {
        let raw = RawDocument {
            pages: vec![page(0, vec![RawBlock::image_ref("ghost", bbox(10.0))])],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        let block = &doc.pages[0].blocks[0];
        assert_eq!(block.block.kind, BlockKind::Unknown);
        assert_eq!(block.image_name, None);
        assert_eq!(doc.warnings.len(), 1);
        assert!(doc.warnings[0].contains("ghost"));
    }

    #[test]
    fn images_disabled_keeps_placeholders_without_payloads() {
        let mut raw = RawDocument {
            pages: vec![page(0, vec![RawBlock::image_ref("fig", bbox(10.0))])],
            ..RawDocument::default()
        };
        raw.images.insert("fig".into(), RawImage { page_index: 0, data: vec![1] });
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, false).normalize(raw);
        assert!(doc.images.is_empty());
        assert_eq!(doc.pages[0].blocks[0].image_name.as_deref(), Some("page1_img1"));
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn binary_text_block_becomes_unknown() {
        let mut block = RawBlock::paragraph("", bbox(10.0));
        block.content = BlockContent::Binary(b"caf\xc3\xa9".to_vec());
        let raw = RawDocument {
            pages: vec![page(0, vec![block])],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        let out = &doc.pages[0].blocks[0].block;
        assert_eq!(out.kind, BlockKind::Unknown);
        assert_eq!(out.content.as_text(), Some("café"));
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn heading_levels_are_repaired() {
        let raw = RawDocument {
            pages: vec![page(
                0,
                vec![
                    RawBlock::heading(9, "Deep", bbox(10.0)),
                    RawBlock::new(BlockKind::Heading, "Plain", bbox(40.0)),
                ],
            )],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        let levels: Vec<_> = doc.pages[0]
            .blocks
            .iter()
            .map(|b| b.block.style.heading_level)
            .collect();
        assert_eq!(levels, [Some(6), Some(1)]);
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn out_of_page_boxes_are_clamped_once_per_page() {
        let raw = RawDocument {
            pages: vec![page(
                0,
                vec![
                    RawBlock::paragraph("a", BoundingBox::new(-10.0, 10.0, 100.0, 10.0)),
                    RawBlock::paragraph("b", BoundingBox::new(10.0, 900.0, 100.0, 10.0)),
                ],
            )],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        assert_eq!(doc.block_count(), 2);
        assert_eq!(doc.warnings.len(), 1);
        assert!(doc.warnings[0].contains("2 block(s)"));
        for b in &doc.pages[0].blocks {
            assert!(b.block.bbox.fits_within(612.0, 792.0));
        }
    }

    #[test]
    fn missing_page_size_is_derived_from_blocks() {
        let raw = RawDocument {
            pages: vec![RawPage::new(0, 0.0, f32::NAN)
                .with_blocks(vec![RawBlock::paragraph("a", BoundingBox::new(0.0, 0.0, 300.0, 400.0))])],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        assert_eq!((doc.pages[0].width, doc.pages[0].height), (300.0, 400.0));
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn blank_text_blocks_leave_a_placeholder() {
        let raw = RawDocument {
            pages: vec![page(
                0,
                vec![
                    RawBlock::paragraph("a", bbox(10.0)),
                    RawBlock::paragraph("   ", bbox(40.0)),
                    RawBlock::heading(2, "", bbox(70.0)),
                    RawBlock::paragraph("c", bbox(100.0)),
                ],
            )],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        assert_eq!(doc.block_count(), 4);
        let blank = &doc.pages[0].blocks[1].block;
        assert_eq!(blank.kind, BlockKind::Unknown);
        assert_eq!(blank.content.as_text(), Some("[empty paragraph]"));
        assert_eq!(
            doc.pages[0].blocks[2].block.content.as_text(),
            Some("[empty heading]")
        );
        assert_eq!(doc.warnings.len(), 2);
        assert!(doc.warnings.iter().all(|w| w.starts_with("page 1:")));

        let text = markup::serialize(&doc, &config);
        assert_eq!(text, "a\n\n[empty paragraph]\n\n[empty heading]\n\nc");
    }

    #[test]
    fn empty_table_cell_is_kept_as_is() {
        let raw = RawDocument {
            pages: vec![page(0, vec![RawBlock::table_cell("", bbox(10.0))])],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        assert_eq!(doc.pages[0].blocks[0].block.kind, BlockKind::TableCell);
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn wide_table_without_hints_serialises_as_one_table() {
        let cells = markdown::table_cells(
            "| Name | Score |\n| --- | --- |\n| Ada | 9 |\n| Bob | 7 |\n| Cy | 5 |",
            BoundingBox::new(0.05, 0.3, 0.9, 0.3),
        );
        let raw = RawDocument {
            pages: vec![RawPage::new(0, 1.0, 1.0).with_blocks(cells)],
            ..RawDocument::default()
        };
        let config = LayoutConfig::default();
        let doc = LayoutNormalizer::new(&config, true).normalize(raw);
        assert!(doc.pages[0].blocks.iter().all(|b| b.column == 0));
        assert_eq!(
            markup::serialize(&doc, &config),
            "| Name | Score |\n| --- | --- |\n| Ada | 9 |\n| Bob | 7 |\n| Cy | 5 |"
        );
    }
}
