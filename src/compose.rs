use std::ops::Range;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::grid::{GridLayer, Palette, PaletteIndexGrid};
use crate::image::{Color, Image};
use crate::sprite::Sprite;

/// Hardware index of `color` within `palette`: `palette_index * group_size + rank`, where rank counts from 1 since
/// entry 0 of every group is transparent.
pub fn hardware_index(palettes: &[Palette], palette_index: usize, color: Color, group_size: usize) -> Option<Color> {
    let rank = palettes.get(palette_index)?.iter().position(|&c| c == color)? + 1;
    Color::try_from(palette_index * group_size + rank).ok()
}

/// Rewrite the raw colours of `image` as hardware indices, using the palette assigned to each cell of `layer`.
/// Background pixels become 0.
pub fn remap_colors(image: &Image, layer: &GridLayer, palettes: &[Palette], palette_indices: &PaletteIndexGrid, group_size: usize, background: Color) -> Result<Image> {
    let mut remapped = Image::new(image.width(), image.height(), 0);
    for (y, x) in (0..image.height()).cartesian_product(0..image.width()) {
        let c = image.get(x, y);
        if c == background {
            continue;
        }
        let (cell_x, cell_y) = (x / layer.cell_width(), y / layer.cell_height());
        if cell_x >= palette_indices.width() || cell_y >= palette_indices.height() {
            continue;
        }
        let p = palette_indices.get(cell_x, cell_y);
        let index = hardware_index(palettes, p, c, group_size)
            .ok_or_else(|| Error::Inconsistent(format!("color {c} at ({x}, {y}) is not in palette {p}")))?;
        remapped.set(x, y, index);
    }
    Ok(remapped)
}

/// Draw `sprites` onto a blank `width` by `height` image in hardware indices.
pub fn render_sprites(sprites: &[Sprite], (width, height): (usize, usize), palettes: &[Palette], group_size: usize, background: Color) -> Result<Image> {
    let mut rendered = Image::new(width, height, 0);
    for sprite in sprites {
        for ((x, y), c) in sprite.visible_pixels(background) {
            if x >= width || y >= height {
                continue;
            }
            let index = hardware_index(palettes, sprite.palette, c, group_size)
                .ok_or_else(|| Error::Inconsistent(format!("sprite color {c} at ({x}, {y}) is not in palette {}", sprite.palette)))?;
            rendered.set(x, y, index);
        }
    }
    Ok(rendered)
}

/// Merge the three remapped layers, free sprites over grid sprites over background. At most one layer may be inked at
/// any pixel.
pub fn merge_layers(background: &Image, overlay_grid: &Image, overlay_free: &Image) -> Result<Image> {
    let (width, height) = (background.width(), background.height());
    for layer in [overlay_grid, overlay_free] {
        if layer.width() != width || layer.height() != height {
            return Err(Error::Inconsistent("layer dimensions differ".to_string()));
        }
    }

    let mut merged = Image::new(width, height, 0);
    for (y, x) in (0..height).cartesian_product(0..width) {
        let inked = [overlay_free.get(x, y), overlay_grid.get(x, y), background.get(x, y)].into_iter().filter(|&c| c != 0).collect_vec();
        match inked[..] {
            [] => {}
            [c] => merged.set(x, y, c),
            _ => return Err(Error::Inconsistent(format!("more than one layer is inked at ({x}, {y})"))),
        }
    }
    Ok(merged)
}

/// Verify that every cell's colours lie in its palette, that its palette index falls in `palette_range`, that no cell
/// exceeds `cell_color_limit`, and that every inked pixel of `image` belongs to its cell's colour set.
pub fn check_consistency(
    image: &Image,
    layer: &GridLayer,
    palettes: &[Palette],
    palette_indices: &PaletteIndexGrid,
    palette_range: Range<usize>,
    cell_color_limit: usize,
    background: Color,
) -> Result<()> {
    if layer.width() != palette_indices.width() || layer.height() != palette_indices.height() {
        return Err(Error::Inconsistent("palette index grid does not match layer".to_string()));
    }

    for (x, y) in layer.positions() {
        let cell = layer.cell(x, y);
        let p = palette_indices.get(x, y);
        if !palette_range.contains(&p) {
            return Err(Error::Inconsistent(format!("cell ({x}, {y}) uses palette {p}, outside {palette_range:?}")));
        }
        let palette = palettes.get(p).ok_or_else(|| Error::Inconsistent(format!("cell ({x}, {y}) uses missing palette {p}")))?;
        if cell.colors.len() > cell_color_limit {
            return Err(Error::Inconsistent(format!("cell ({x}, {y}) has {} colors, limit is {cell_color_limit}", cell.colors.len())));
        }
        if let Some(c) = cell.colors.difference(palette).next() {
            return Err(Error::Inconsistent(format!("cell ({x}, {y}) color {c} is not in palette {p}")));
        }
        for (xx, yy) in layer.pixels_of(x, y) {
            let c = image.get(xx, yy);
            if c != background && !cell.colors.contains(&c) {
                return Err(Error::Inconsistent(format!("pixel ({xx}, {yy}) color {c} is not in cell ({x}, {y})")));
            }
        }
    }
    Ok(())
}
