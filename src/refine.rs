//! Repairs applied to solver output.
//!
//! A solver stopped by its time budget returns a feasible but not necessarily optimal assignment. The passes here
//! fix the easy cases it leaves behind. Each is a local rewrite that keeps every cell's colours inside its palette,
//! never pushes a palette past the colour limit and never changes which colour a pixel shows.

use std::ops::Range;

use itertools::Itertools;
use log::debug;

use crate::grid::{GridLayer, Palette, PaletteIndexGrid};

/// Move colours back from `released` to `retained` wherever the cell's palette already holds them or has room for
/// them. Palettes outside `palette_range` are left alone.
///
/// Returns the number of colours moved.
pub fn optimize_unnecessary_overlay_colors(
    retained: &mut GridLayer,
    released: &mut GridLayer,
    palette_indices: &PaletteIndexGrid,
    palette_range: Range<usize>,
    palettes: &mut [Palette],
    cell_color_limit: usize,
) -> usize {
    let mut moved = 0;
    for (x, y) in released.positions().collect_vec() {
        let p = palette_indices.get(x, y);
        if !palette_range.contains(&p) || p >= palettes.len() {
            continue;
        }

        let candidates = released.cell(x, y).colors.iter().copied().collect_vec();
        for c in candidates {
            let palette = &mut palettes[p];
            if !palette.contains(&c) {
                if palette.len() >= cell_color_limit {
                    continue;
                }
                palette.insert(c);
            }

            let columns = released.cell(x, y).columns_of(c);
            let from = released.cell_mut(x, y);
            from.colors.remove(&c);
            from.column_count.remove(&c);
            let to = retained.cell_mut(x, y);
            to.colors.insert(c);
            if columns > 0 {
                to.column_count.insert(c, columns);
            }
            moved += 1;
        }
    }

    debug!("moved {moved} unnecessarily released colors back");
    moved
}

/// Merge pairs of palettes within `palette_range` whose union still fits in `cell_color_limit`, renumbering the
/// cells that used the higher-numbered palette. Freed palettes are left empty.
///
/// Returns the number of merges performed.
pub fn optimize_unnecessary_palettes(
    palette_indices: &mut PaletteIndexGrid,
    palette_range: Range<usize>,
    palettes: &mut [Palette],
    cell_color_limit: usize,
) -> usize {
    let range = palette_range.start..palette_range.end.min(palettes.len());
    let mut merges = 0;

    // colours only ever move to lower-numbered palettes, so this terminates
    while let Some((a, b)) = range.clone().tuple_combinations().find(|&(a, b)| {
        let live = !palettes[b].is_empty() || palette_indices.uses(b);
        live && palettes[a].union(&palettes[b]).count() <= cell_color_limit
    }) {
        let absorbed = std::mem::take(&mut palettes[b]);
        palettes[a].extend(absorbed);
        palette_indices.renumber(b, a);
        merges += 1;
        debug!("merged palette {b} into palette {a}");
    }

    merges
}

/// Give cells the palette of their left or upper neighbour when that palette already holds all of the cell's
/// colours, so runs of neighbouring cells share one palette.
///
/// Returns the number of cells reassigned.
pub fn optimize_continuity(layer: &GridLayer, palette_indices: &mut PaletteIndexGrid, palette_range: Range<usize>, palettes: &[Palette]) -> usize {
    let mut reassigned = 0;
    for (x, y) in layer.positions() {
        let current = palette_indices.get(x, y);
        let neighbours = [
            x.checked_sub(1).map(|left| palette_indices.get(left, y)),
            y.checked_sub(1).map(|up| palette_indices.get(x, up)),
        ];

        for candidate in neighbours.into_iter().flatten() {
            if candidate == current {
                break;
            }
            let admits = palette_range.contains(&candidate)
                && palettes.get(candidate).is_some_and(|palette| layer.cell(x, y).colors.is_subset(palette));
            if admits {
                palette_indices.set(x, y, candidate);
                reassigned += 1;
                break;
            }
        }
    }

    debug!("reassigned {reassigned} cells for palette continuity");
    reassigned
}
