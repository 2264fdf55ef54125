//! Column resolution: put one page's blocks into reading order.
//!
//! Two strategies, chosen per page:
//!
//! * **Hinted**: the backend supplied `column_hint`s. Blocks are grouped by
//!   hint, groups are ordered left to right by their minimum x, and each
//!   group is read top to bottom.
//!
//! * **Clustered**: no hints. Full-width blocks (titles, wide figures,
//!   footers) first cut the page into horizontal bands. Inside each band the
//!   remaining blocks are sorted by x and split wherever the horizontal gap
//!   between consecutive x-ranges exceeds `column_gap_ratio × page width`.
//!   A split only survives if every resulting column spans at least
//!   `min_column_height_ratio × page height`, which keeps whitespace rivers in
//!   a justified paragraph from producing fake columns.
//!
//! A run of consecutive table cells is placed as one unit covering the whole
//! table, so the gaps between table columns never read as page columns. The
//! cells are expanded back in delivery order and share one column number.
//!
//! All sorts are stable, so blocks with equal coordinates keep the order the
//! adapter delivered them in.

use crate::config::LayoutConfig;
use crate::raw::{BlockKind, BoundingBox, RawBlock};
use std::collections::BTreeMap;
use tracing::debug;

/// Reading order for one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnLayout {
    /// Indices into the page's block list, in reading order.
    pub order: Vec<usize>,
    /// Column of each entry in `order`, numbered left to right within its band.
    pub columns: Vec<usize>,
    /// Blocks without a hint on a hinted page, placed by horizontal proximity.
    pub unhinted: usize,
    /// Candidate column splits discarded by the minimum-height check.
    pub rejected_splits: usize,
}

impl ColumnLayout {
    fn push_column(&mut self, members: &[usize], column: usize) {
        for &idx in members {
            self.order.push(idx);
            self.columns.push(column);
        }
    }
}

/// Compute the reading order of `blocks` on a page of the given size.
pub fn resolve(
    blocks: &[RawBlock],
    page_width: f32,
    page_height: f32,
    config: &LayoutConfig,
) -> ColumnLayout {
    let units = table_units(blocks);
    let proxies: Vec<RawBlock> = units.iter().map(|m| unit_block(m, blocks)).collect();

    let hinted = proxies.iter().any(|b| b.column_hint.is_some());
    let placed = if hinted {
        resolve_hinted(&proxies)
    } else {
        resolve_clustered(&proxies, page_width, page_height, config)
    };

    let mut layout = ColumnLayout {
        rejected_splits: placed.rejected_splits,
        ..ColumnLayout::default()
    };
    if hinted {
        layout.unhinted = units
            .iter()
            .zip(&proxies)
            .filter(|(_, proxy)| proxy.column_hint.is_none())
            .map(|(members, _)| members.len())
            .sum();
    }
    for (&unit, &column) in placed.order.iter().zip(&placed.columns) {
        layout.push_column(&units[unit], column);
    }
    layout
}

/// Group block indices into placement units: each run of consecutive table
/// cells is one unit, every other block is its own.
fn table_units(blocks: &[RawBlock]) -> Vec<Vec<usize>> {
    let mut units: Vec<Vec<usize>> = Vec::new();
    for (idx, block) in blocks.iter().enumerate() {
        let extends_table = block.kind == BlockKind::TableCell
            && idx > 0
            && blocks[idx - 1].kind == BlockKind::TableCell;
        match units.last_mut() {
            Some(unit) if extends_table => unit.push(idx),
            _ => units.push(vec![idx]),
        }
    }
    units
}

/// The block a unit is placed as: the block itself, or for a table the first
/// cell stretched over the union of all cells.
fn unit_block(members: &[usize], blocks: &[RawBlock]) -> RawBlock {
    let mut proxy = blocks[members[0]].clone();
    if members.len() > 1 {
        let (mut left, mut top) = (f32::INFINITY, f32::INFINITY);
        let (mut right, mut bottom) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for &i in members {
            let b = &blocks[i].bbox;
            left = left.min(b.x);
            top = top.min(b.y);
            right = right.max(b.right());
            bottom = bottom.max(b.bottom());
        }
        proxy.bbox = BoundingBox::new(left, top, right - left, bottom - top);
        proxy.column_hint = members.iter().find_map(|&i| blocks[i].column_hint);
    }
    proxy
}

// ── Hinted ───────────────────────────────────────────────────────────────

fn resolve_hinted(blocks: &[RawBlock]) -> ColumnLayout {
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    let mut orphans = Vec::new();
    for (idx, block) in blocks.iter().enumerate() {
        match block.column_hint {
            Some(hint) => groups.entry(hint).or_default().push(idx),
            None => orphans.push(idx),
        }
    }

    let centres: Vec<(u32, f32)> = groups
        .iter()
        .map(|(hint, members)| {
            let sum: f32 = members.iter().map(|&i| blocks[i].bbox.center_x()).sum();
            (*hint, sum / members.len() as f32)
        })
        .collect();

    for &idx in &orphans {
        let x = blocks[idx].bbox.center_x();
        let nearest = centres
            .iter()
            .min_by(|a, b| (a.1 - x).abs().total_cmp(&(b.1 - x).abs()))
            .map(|(hint, _)| *hint);
        if let Some(hint) = nearest {
            groups.entry(hint).or_default().push(idx);
        }
    }

    let mut ordered: Vec<(f32, u32, Vec<usize>)> = groups
        .into_iter()
        .map(|(hint, mut members)| {
            members.sort_unstable();
            sort_top_to_bottom(&mut members, blocks);
            let min_x = members
                .iter()
                .map(|&i| blocks[i].bbox.x)
                .fold(f32::INFINITY, f32::min);
            (min_x, hint, members)
        })
        .collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut layout = ColumnLayout {
        unhinted: orphans.len(),
        ..ColumnLayout::default()
    };
    for (column, (_, _, members)) in ordered.iter().enumerate() {
        layout.push_column(members, column);
    }
    layout
}

// ── Clustered ────────────────────────────────────────────────────────────

fn resolve_clustered(
    blocks: &[RawBlock],
    page_width: f32,
    page_height: f32,
    config: &LayoutConfig,
) -> ColumnLayout {
    let spanning_width = config.spanning_width_ratio * page_width;
    let (mut spanning, narrow): (Vec<usize>, Vec<usize>) =
        (0..blocks.len()).partition(|&i| blocks[i].bbox.width >= spanning_width);
    sort_top_to_bottom(&mut spanning, blocks);

    // Band k holds the narrow blocks that start below k full-width blocks.
    let mut bands: Vec<Vec<usize>> = vec![Vec::new(); spanning.len() + 1];
    for idx in narrow {
        let y = blocks[idx].bbox.y;
        let band = spanning.partition_point(|&s| blocks[s].bbox.y <= y);
        bands[band].push(idx);
    }

    let gap = config.column_gap_ratio * page_width;
    let min_height = config.min_column_height_ratio * page_height;
    let mut layout = ColumnLayout::default();

    for (band_idx, band) in bands.iter().enumerate() {
        let (columns, rejected) = cluster_columns(band, blocks, gap, min_height);
        layout.rejected_splits += rejected;
        for (column, members) in columns.iter().enumerate() {
            layout.push_column(members, column);
        }
        if let Some(&span) = spanning.get(band_idx) {
            layout.push_column(&[span], 0);
        }
    }

    if layout.rejected_splits > 0 {
        debug!(
            "Discarded {} column split(s) shorter than {:.1} units",
            layout.rejected_splits, min_height
        );
    }
    layout
}

struct Segment {
    members: Vec<usize>,
    /// Horizontal gap separating this segment from the one on its left.
    gap_before: f32,
}

/// Split `indices` into left-to-right columns, each read top to bottom.
///
/// Returns the columns and the number of candidate splits that were merged
/// back because a side was too short.
fn cluster_columns(
    indices: &[usize],
    blocks: &[RawBlock],
    gap: f32,
    min_height: f32,
) -> (Vec<Vec<usize>>, usize) {
    let mut by_x = indices.to_vec();
    by_x.sort_by(|&a, &b| blocks[a].bbox.x.total_cmp(&blocks[b].bbox.x));

    let mut segments: Vec<Segment> = Vec::new();
    let mut reach: Option<f32> = None;
    for idx in by_x {
        let bbox = &blocks[idx].bbox;
        // `reach` is Some exactly when a segment already exists.
        match reach {
            Some(r) if bbox.x - r <= gap => {
                if let Some(last) = segments.last_mut() {
                    last.members.push(idx);
                }
            }
            _ => segments.push(Segment {
                members: vec![idx],
                gap_before: reach.map(|r| bbox.x - r).unwrap_or(0.0),
            }),
        }
        reach = Some(reach.map_or(bbox.right(), |r| r.max(bbox.right())));
    }

    let mut rejected = 0;
    while segments.len() > 1 {
        let Some(pos) = segments
            .iter()
            .position(|s| vertical_extent(&s.members, blocks) < min_height)
        else {
            break;
        };
        rejected += 1;
        let last = segments.len() - 1;
        let merge_left = match pos {
            0 => false,
            p if p == last => true,
            p => segments[p].gap_before <= segments[p + 1].gap_before,
        };
        if merge_left {
            let seg = segments.remove(pos);
            segments[pos - 1].members.extend(seg.members);
        } else {
            let seg = segments.remove(pos + 1);
            segments[pos].members.extend(seg.members);
        }
    }

    let columns = segments
        .into_iter()
        .map(|seg| {
            let mut members = seg.members;
            members.sort_unstable();
            sort_top_to_bottom(&mut members, blocks);
            members
        })
        .collect();
    (columns, rejected)
}

fn vertical_extent(members: &[usize], blocks: &[RawBlock]) -> f32 {
    let top = members
        .iter()
        .map(|&i| blocks[i].bbox.y)
        .fold(f32::INFINITY, f32::min);
    let bottom = members
        .iter()
        .map(|&i| blocks[i].bbox.bottom())
        .fold(f32::NEG_INFINITY, f32::max);
    (bottom - top).max(0.0)
}

/// Stable sort by top edge; callers pre-sort by adapter index for ties.
fn sort_top_to_bottom(members: &mut [usize], blocks: &[RawBlock]) {
    members.sort_by(|&a, &b| blocks[a].bbox.y.total_cmp(&blocks[b].bbox.y));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::BoundingBox;

    const W: f32 = 612.0;
    const H: f32 = 792.0;

    fn para(text: &str, x: f32, y: f32, w: f32, h: f32) -> RawBlock {
        RawBlock::paragraph(text, BoundingBox::new(x, y, w, h))
    }

    fn texts(blocks: &[RawBlock], layout: &ColumnLayout) -> Vec<String> {
        layout
            .order
            .iter()
            .map(|&i| blocks[i].content.as_text().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn hinted_columns_read_left_then_right() {
        // Arrival order interleaves the columns.
        let blocks = vec![
            para("R1", 320.0, 80.0, 240.0, 100.0).with_column(1),
            para("L1", 50.0, 80.0, 240.0, 100.0).with_column(0),
            para("R2", 320.0, 200.0, 240.0, 100.0).with_column(1),
            para("L2", 50.0, 200.0, 240.0, 100.0).with_column(0),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(texts(&blocks, &layout), ["L1", "L2", "R1", "R2"]);
        assert_eq!(layout.columns, [0, 0, 1, 1]);
        assert_eq!(layout.unhinted, 0);
    }

    #[test]
    fn hinted_groups_ordered_by_position_not_hint_value() {
        let blocks = vec![
            para("left", 50.0, 80.0, 240.0, 100.0).with_column(7),
            para("right", 320.0, 80.0, 240.0, 100.0).with_column(2),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(texts(&blocks, &layout), ["left", "right"]);
    }

    #[test]
    fn unhinted_block_joins_nearest_hinted_column() {
        let blocks = vec![
            para("L1", 50.0, 80.0, 240.0, 100.0).with_column(0),
            para("R1", 320.0, 80.0, 240.0, 100.0).with_column(1),
            para("R0", 330.0, 20.0, 200.0, 40.0),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(texts(&blocks, &layout), ["L1", "R0", "R1"]);
        assert_eq!(layout.unhinted, 1);
    }

    #[test]
    fn clustering_separates_two_columns() {
        let mut blocks = Vec::new();
        for i in 0..5 {
            let y = 80.0 + i as f32 * 130.0;
            blocks.push(para(&format!("R{i}"), 320.0, y, 240.0, 110.0));
            blocks.push(para(&format!("L{i}"), 50.0, y, 240.0, 110.0));
        }
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(
            texts(&blocks, &layout),
            ["L0", "L1", "L2", "L3", "L4", "R0", "R1", "R2", "R3", "R4"]
        );
        assert_eq!(layout.rejected_splits, 0);
    }

    #[test]
    fn justified_paragraph_river_is_not_a_column_break() {
        // Four lines of words with a whitespace river at x≈300 wider than the
        // gap threshold (0.04 × 612 ≈ 24.5), but the paragraph is only ~50
        // units tall, far below 0.10 × 792.
        let mut blocks = Vec::new();
        for line in 0..4 {
            let y = 300.0 + line as f32 * 12.0;
            blocks.push(para(&format!("a{line}"), 50.0, y, 120.0, 10.0));
            blocks.push(para(&format!("b{line}"), 175.0 + line as f32 * 7.0, y, 100.0, 10.0));
            blocks.push(para(&format!("c{line}"), 330.0, y, 90.0, 10.0));
            blocks.push(para(&format!("d{line}"), 425.0 - line as f32 * 3.0, y, 130.0, 10.0));
        }
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert!(layout.rejected_splits >= 1);
        assert!(layout.columns.iter().all(|&c| c == 0));
        // Line by line, left to right.
        let order = texts(&blocks, &layout);
        assert_eq!(&order[..4], ["a0", "b0", "c0", "d0"]);
    }

    #[test]
    fn full_width_title_and_footer_frame_the_columns() {
        let blocks = vec![
            para("footer", 50.0, 760.0, 510.0, 20.0),
            para("R1", 320.0, 120.0, 240.0, 300.0),
            para("L1", 50.0, 120.0, 240.0, 300.0),
            para("title", 50.0, 40.0, 510.0, 40.0),
            para("L2", 50.0, 430.0, 240.0, 300.0),
            para("R2", 320.0, 430.0, 240.0, 300.0),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(
            texts(&blocks, &layout),
            ["title", "L1", "L2", "R1", "R2", "footer"]
        );
    }

    #[test]
    fn equal_positions_keep_adapter_order() {
        let blocks = vec![
            para("first", 50.0, 100.0, 100.0, 10.0),
            para("second", 50.0, 100.0, 100.0, 10.0),
            para("third", 50.0, 100.0, 100.0, 10.0),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(texts(&blocks, &layout), ["first", "second", "third"]);
    }

    #[test]
    fn empty_page_has_empty_layout() {
        let layout = resolve(&[], W, H, &LayoutConfig::default());
        assert!(layout.order.is_empty());
    }

    #[test]
    fn widely_spaced_table_stays_one_column() {
        // Two table columns far apart, tall enough to pass the height check.
        let cell = |text: &str, x: f32, y: f32| {
            RawBlock::table_cell(text, BoundingBox::new(x, y, 80.0, 150.0))
        };
        let blocks = vec![
            cell("Name", 50.0, 100.0),
            cell("Score", 420.0, 100.0),
            cell("Ada", 50.0, 300.0),
            cell("9", 420.0, 300.0),
            cell("Bob", 50.0, 500.0),
            cell("7", 420.0, 500.0),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(layout.columns, [0; 6]);
        assert_eq!(
            texts(&blocks, &layout),
            ["Name", "Score", "Ada", "9", "Bob", "7"]
        );
    }

    #[test]
    fn table_run_moves_with_its_column() {
        let blocks = vec![
            para("L1", 50.0, 100.0, 240.0, 300.0),
            RawBlock::table_cell("a", BoundingBox::new(320.0, 100.0, 100.0, 150.0)),
            RawBlock::table_cell("b", BoundingBox::new(440.0, 100.0, 100.0, 150.0)),
            para("R1", 320.0, 300.0, 240.0, 200.0),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(texts(&blocks, &layout), ["L1", "a", "b", "R1"]);
        assert_eq!(layout.columns, [0, 1, 1, 1]);
    }

    #[test]
    fn unhinted_cells_count_individually_on_hinted_page() {
        let blocks = vec![
            para("left", 50.0, 80.0, 240.0, 100.0).with_column(0),
            RawBlock::table_cell("x", BoundingBox::new(320.0, 80.0, 100.0, 20.0)),
            RawBlock::table_cell("y", BoundingBox::new(440.0, 80.0, 100.0, 20.0)),
        ];
        let layout = resolve(&blocks, W, H, &LayoutConfig::default());
        assert_eq!(layout.unhinted, 2);
        assert_eq!(layout.order.len(), 3);
    }
}
