use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use ndarray::Array2;

use crate::image::{Color, Image};

/// An ordered set of colours. A colour's hardware index within its palette group is its 1-based rank in the set.
pub type Palette = BTreeSet<Color>;

/// The inked colours of one tile of an image.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GridCell {
    /// Every non-background colour present in the tile.
    pub colors: BTreeSet<Color>,
    /// For each colour in [`Self::colors`], the number of tile columns it appears in.
    pub column_count: BTreeMap<Color, usize>,
}

impl GridCell {
    /// Whether the cell has no inked colours.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Number of columns `color` occupies, or 0 if it is absent from the cell.
    #[inline]
    pub fn columns_of(&self, color: Color) -> usize {
        self.column_count.get(&color).copied().unwrap_or(0)
    }
}

/// A grid of [`GridCell`]s decomposing an image into fixed-size tiles.
///
/// Cells are addressed `(x, y)` in cell units; the pixel block of cell `(x, y)` starts at `(x * cell_width, y * cell_height)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GridLayer {
    cells: Array2<GridCell>,
    cell_width: usize,
    cell_height: usize,
}

impl GridLayer {
    /// A layer of `width` by `height` empty cells.
    pub fn blank(cell_width: usize, cell_height: usize, width: usize, height: usize) -> Self {
        Self {
            cells: Array2::from_shape_simple_fn((height, width), GridCell::default),
            cell_width,
            cell_height,
        }
    }

    /// Decompose `image` into cells, collecting each cell's non-`background` colours and the columns they occupy.
    ///
    /// Pixels past the last whole cell are ignored.
    pub fn from_image(image: &Image, background: Color, cell_width: usize, cell_height: usize) -> Self {
        let mut layer = Self::blank(cell_width, cell_height, image.width() / cell_width, image.height() / cell_height);
        for ((y, x), cell) in layer.cells.indexed_iter_mut() {
            for j in 0..cell_width {
                // colours seen in this column of the cell, counted once per column
                let column_colors: BTreeSet<Color> = (0..cell_height)
                    .map(|i| image.get(x * cell_width + j, y * cell_height + i))
                    .filter(|&c| c != background)
                    .collect();
                for c in column_colors {
                    cell.colors.insert(c);
                    *cell.column_count.entry(c).or_insert(0) += 1;
                }
            }
        }
        layer
    }

    /// Width in cells.
    #[inline]
    pub fn width(&self) -> usize {
        self.cells.ncols()
    }

    /// Height in cells.
    #[inline]
    pub fn height(&self) -> usize {
        self.cells.nrows()
    }

    /// Width of a cell in pixels.
    #[inline]
    pub fn cell_width(&self) -> usize {
        self.cell_width
    }

    /// Height of a cell in pixels.
    #[inline]
    pub fn cell_height(&self) -> usize {
        self.cell_height
    }

    /// The cell at `(x, y)`.
    #[inline]
    pub fn cell(&self, x: usize, y: usize) -> &GridCell {
        &self.cells[[y, x]]
    }

    /// Mutable access to the cell at `(x, y)`.
    #[inline]
    pub fn cell_mut(&mut self, x: usize, y: usize) -> &mut GridCell {
        &mut self.cells[[y, x]]
    }

    /// Mutable access to a cell, or `None` if `(x, y)` lies outside the grid.
    #[inline]
    pub fn try_cell_mut(&mut self, x: usize, y: usize) -> Option<&mut GridCell> {
        self.cells.get_mut([y, x])
    }

    /// All cell coordinates in raster order, top row first.
    pub fn positions(&self) -> impl Iterator<Item = (usize, usize)> {
        (0..self.height()).cartesian_product(0..self.width()).map(|(y, x)| (x, y))
    }

    /// The pixel positions covered by cell `(x, y)`.
    pub fn pixels_of(&self, x: usize, y: usize) -> impl Iterator<Item = (usize, usize)> {
        let (cw, ch) = (self.cell_width, self.cell_height);
        (0..ch).cartesian_product(0..cw).map(move |(i, j)| (x * cw + j, y * ch + i))
    }

    /// Every colour used anywhere in the layer, in ascending order.
    pub fn colors(&self) -> BTreeSet<Color> {
        self.cells.iter().flat_map(|cell| cell.colors.iter().copied()).collect()
    }

    /// Number of inked cells in the busiest row.
    pub fn max_cells_in_row(&self) -> usize {
        self.cells.rows().into_iter().map(|row| row.iter().filter(|cell| !cell.is_empty()).count()).max().unwrap_or(0)
    }
}

/// Assignment of a palette to every cell of a [`GridLayer`], in the flat palette index space shared by background and sprites.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaletteIndexGrid {
    indices: Array2<usize>,
}

impl PaletteIndexGrid {
    /// A `width` by `height` grid with every cell assigned palette `fill`.
    pub fn new(width: usize, height: usize, fill: usize) -> Self {
        Self { indices: Array2::from_elem((height, width), fill) }
    }

    /// Width in cells.
    #[inline]
    pub fn width(&self) -> usize {
        self.indices.ncols()
    }

    /// Height in cells.
    #[inline]
    pub fn height(&self) -> usize {
        self.indices.nrows()
    }

    /// Palette assigned to cell `(x, y)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> usize {
        self.indices[[y, x]]
    }

    /// Assign `palette` to cell `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, palette: usize) {
        self.indices[[y, x]] = palette;
    }

    /// Like [`Self::set`], but reports `false` instead of panicking when `(x, y)` lies outside the grid.
    #[inline]
    pub fn try_set(&mut self, x: usize, y: usize, palette: usize) -> bool {
        match self.indices.get_mut([y, x]) {
            Some(slot) => {
                *slot = palette;
                true
            }
            None => false,
        }
    }

    /// Assign palette `empty_index` to every cell that has no colours in `layer`.
    pub fn set_empty(&mut self, layer: &GridLayer, empty_index: usize) {
        for (x, y) in layer.positions() {
            if layer.cell(x, y).is_empty() {
                self.set(x, y, empty_index);
            }
        }
    }

    /// Replace every use of palette `from` with palette `to`.
    pub fn renumber(&mut self, from: usize, to: usize) {
        self.indices.map_inplace(|p| if *p == from { *p = to });
    }

    /// Whether any cell uses palette `palette`.
    pub fn uses(&self, palette: usize) -> bool {
        self.indices.iter().any(|&p| p == palette)
    }
}
