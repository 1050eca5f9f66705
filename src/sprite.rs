//! Cutting overlay images into hardware sprites.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::grid::{GridLayer, Palette, PaletteIndexGrid};
use crate::hardware::Hardware;
use crate::image::{Color, Image};

/// A hardware sprite cut out of an overlay image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sprite {
    /// Left edge in image pixels.
    pub x: usize,
    /// Top edge in image pixels.
    pub y: usize,
    /// Index into the flat palette list.
    pub palette: usize,
    /// Sprite-sized pixel block; pixels not drawn by the sprite hold the background colour.
    pub pixels: Image,
    /// Every non-background colour in [`Self::pixels`].
    pub colors: BTreeSet<Color>,
    /// Number of fully blank pixel columns at the left edge.
    pub blank_left: usize,
    /// Number of fully blank pixel columns at the right edge.
    pub blank_right: usize,
}

impl Sprite {
    /// Wrap a pixel block, deriving its colour set and blank edge columns.
    pub fn new(x: usize, y: usize, palette: usize, pixels: Image, background: Color) -> Self {
        let colors = pixels.to_vec().into_iter().filter(|&c| c != background).collect();
        let mut sprite = Self { x, y, palette, pixels, colors, blank_left: 0, blank_right: 0 };
        sprite.update_blank_columns(background);
        sprite
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    fn column_is_blank(&self, column: usize, background: Color) -> bool {
        (0..self.height()).all(|row| self.pixels.get(column, row) == background)
    }

    /// Recount the fully blank columns at either edge. A blank sprite counts its whole width on both sides.
    pub fn update_blank_columns(&mut self, background: Color) {
        let width = self.width();
        self.blank_left = (0..width).find(|&column| !self.column_is_blank(column, background)).unwrap_or(width);
        self.blank_right = (0..width).rev().find(|&column| !self.column_is_blank(column, background)).map_or(width, |column| width - 1 - column);
    }

    /// Image positions and colours of every pixel this sprite draws.
    pub fn visible_pixels(&self, background: Color) -> impl Iterator<Item = ((usize, usize), Color)> + '_ {
        (0..self.height())
            .cartesian_product(0..self.width())
            .map(move |(row, column)| ((self.x + column, self.y + row), self.pixels.get(column, row)))
            .filter(move |&(_, c)| c != background)
    }
}

/// Cut a `width` by `height` block at `(x, y)` out of `image`, keeping only pixels whose colour is in `palette`.
///
/// With `remove`, the kept pixels are cleared to `background` in `image`. Positions past the image edge read as
/// background.
pub fn extract_sprite(image: &mut Image, (x, y): (usize, usize), (width, height): (usize, usize), palette: &Palette, background: Color, remove: bool) -> Image {
    let mut pixels = Image::new(width, height, background);
    for (row, column) in (0..height).cartesian_product(0..width) {
        let (xx, yy) = (x + column, y + row);
        let c = image.get_or(xx, yy, background);
        if c != background && palette.contains(&c) {
            pixels.set(column, row, c);
            if remove {
                image.set(xx, yy, background);
            }
        }
    }
    pixels
}

/// Turns overlay images into sprite lists.
pub struct SpriteExtractor<'a> {
    pub(crate) hardware: Hardware,
    pub(crate) sprite_height: usize,
    pub(crate) background: Color,
    pub(crate) palettes: &'a [Palette],
}

impl<'a> SpriteExtractor<'a> {
    /// An extractor cutting `sprite_height` pixel tall sprites coloured from the flat `palettes` list.
    pub fn new(hardware: Hardware, sprite_height: usize, background: Color, palettes: &'a [Palette]) -> Self {
        Self { hardware, sprite_height, background, palettes }
    }

    #[inline]
    fn sprite_size(&self) -> (usize, usize) {
        (self.hardware.sprite_width, self.sprite_height)
    }

    fn palette(&self, index: usize) -> Palette {
        self.palettes.get(index).cloned().unwrap_or_default()
    }

    /// One sprite per inked cell of the grid-aligned `layer`, drawn from `image` with the cell's assigned palette.
    pub fn grid_sprites(&self, layer: &GridLayer, palette_indices: &PaletteIndexGrid, image: &Image) -> Vec<Sprite> {
        let mut image = image.clone();
        layer
            .positions()
            .filter(|&(x, y)| !layer.cell(x, y).is_empty())
            .map(|(x, y)| {
                let p = palette_indices.get(x, y);
                let origin = (x * layer.cell_width(), y * layer.cell_height());
                let pixels = extract_sprite(&mut image, origin, self.sprite_size(), &self.palette(p), self.background, false);
                Sprite::new(origin.0, origin.1, p, pixels, self.background)
            })
            .collect()
    }

    /// Cut a sprite at `(x, y)` using whichever sprite palette keeps the most colours of the block, removing the
    /// extracted pixels from `image`. Ties go to the lowest palette index.
    pub fn extract_with_best_palette(&self, image: &mut Image, x: usize, y: usize) -> Sprite {
        let mut best = self.hardware.num_background_palettes;
        let mut best_colors = 0;
        for p in self.hardware.sprite_palette_range() {
            let trial = extract_sprite(image, (x, y), self.sprite_size(), &self.palette(p), self.background, false);
            let kept = trial.to_vec().into_iter().filter(|&c| c != self.background).unique().count();
            if kept > best_colors {
                best = p;
                best_colors = kept;
            }
        }

        let pixels = extract_sprite(image, (x, y), self.sprite_size(), &self.palette(best), self.background, true);
        Sprite::new(x, y, best, pixels, self.background)
    }

    /// Cover the free overlay `image` with sprites at arbitrary positions.
    ///
    /// Bands one sprite tall start at the first inked row; each band is swept left to right, cutting sprites at the
    /// current column while it still has extractable ink and moving one column on otherwise.
    pub fn free_sprites(&self, image: &Image) -> Vec<Sprite> {
        let mut image = image.clone();
        let mut sprites = Vec::new();
        let mut y = 0;
        while y < image.height() {
            while y < image.height() && image.row_is_empty(y, self.background) {
                y += 1;
            }
            if y >= image.height() {
                break;
            }

            let mut x = 0;
            while x < image.width() {
                let column_has_ink = (y..(y + self.sprite_height).min(image.height())).any(|row| image.get(x, row) != self.background);
                if !column_has_ink {
                    x += 1;
                    continue;
                }

                let sprite = self.extract_with_best_palette(&mut image, x, y);
                if sprite.colors.is_empty() {
                    // ink here fits no sprite palette
                    x += 1;
                } else {
                    sprites.push(sprite);
                }
            }

            y += self.sprite_height;
        }
        sprites
    }
}

/// Split `sprites` into maximal runs of consecutive sprites on the same row, with the same palette, each exactly
/// `sprite_width` right of the previous one.
fn adjacent_runs(sprites: Vec<Sprite>, sprite_width: usize) -> Vec<Vec<Sprite>> {
    let mut runs: Vec<Vec<Sprite>> = Vec::new();
    for sprite in sprites {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|prev| sprite.x == prev.x + sprite_width && sprite.y == prev.y && sprite.palette == prev.palette) => {
                run.push(sprite)
            }
            _ => runs.push(vec![sprite]),
        }
    }
    runs
}

/// Re-cut `run[first..=last]` shifted right by the blank columns of `run[first]`, then drop `run[last]`, whose content the
/// shifted sprites now cover.
fn merge_run(run: &mut Vec<Sprite>, first: usize, last: usize, background: Color) {
    let width = run[first].width();
    let height = run[first].height();
    let shift = run[first].blank_left;

    let mut strip = Image::new(width * (last - first + 1), height, background);
    for (k, sprite) in run[first..=last].iter().enumerate() {
        for (row, column) in (0..height).cartesian_product(0..width) {
            strip.set(k * width + column, row, sprite.pixels.get(column, row));
        }
    }

    for k in first..last {
        let offset = (k - first) * width + shift;
        let mut pixels = Image::new(width, height, background);
        for (row, column) in (0..height).cartesian_product(0..width) {
            pixels.set(column, row, strip.get_or(offset + column, row, background));
        }
        let (x, y, palette) = (run[k].x, run[k].y, run[k].palette);
        run[k] = Sprite::new(x + shift, y, palette, pixels, background);
    }
    run.remove(last);
}

/// Reduce the sprite count of horizontally adjacent runs without changing any visible pixel.
///
/// Within a run, if the blank columns at the left of sprite `i` and at the right of a later sprite `j` together span
/// a whole sprite, shifting sprites `i..j` right by the left blank count covers all the content and sprite `j` can go.
/// Scanning resumes after the shifted group.
pub fn optimize_horizontally_adjacent_sprites(sprites: Vec<Sprite>, sprite_width: usize, background: Color) -> Vec<Sprite> {
    let mut optimized = Vec::with_capacity(sprites.len());
    for mut run in adjacent_runs(sprites, sprite_width) {
        let mut first = 0;
        while first < run.len() {
            let partner = (first + 1..run.len()).find(|&last| run[first].blank_left + run[last].blank_right >= sprite_width);
            match partner {
                Some(last) => {
                    merge_run(&mut run, first, last, background);
                    first = last;
                }
                None => first += 1,
            }
        }
        optimized.extend(run);
    }
    optimized
}

/// The largest number of sprites overlapping any single scanline of an image `image_height` pixels tall.
pub fn max_sprites_per_scanline(sprites: &[Sprite], image_height: usize) -> usize {
    let mut per_scanline = vec![0; image_height];
    for sprite in sprites {
        for y in sprite.y..(sprite.y + sprite.height()).min(image_height) {
            per_scanline[y] += 1;
        }
    }
    per_scanline.into_iter().max().unwrap_or(0)
}
