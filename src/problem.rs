use std::fmt::{Display, Formatter, Write};

use crate::grid::GridLayer;
use crate::image::Color;

/// Numeric bounds handed to the solver alongside the layer data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Limits {
    /// Most colours any single cell (and palette) may hold.
    pub cell_color_limit: usize,
    /// Palettes the retained layer may use. Zero on the second pass.
    pub max_background_palettes: usize,
    /// Palettes the released layer may use.
    pub max_sprite_palettes: usize,
    /// Most inked cells of the released layer allowed in one grid row.
    pub max_row_size: usize,
}

/// A declarative description of one palette assignment problem, rendered through [`Display`] in the
/// line-oriented data format read by the solver model.
///
/// Per cell and colour the solver decides whether the colour stays in the cell (the background or
/// grid-sprite layer) or is released to the overlay, which colours form each palette, and which palette every cell
/// uses. `layerColorColumnCount` weights the objective so colours spanning more columns are preferably kept.
pub struct Problem<'a> {
    pub(crate) layer: &'a GridLayer,
    pub(crate) limits: Limits,
}

impl<'a> Problem<'a> {
    /// Describe the assignment problem over `layer` under `limits`.
    pub fn new(layer: &'a GridLayer, limits: Limits) -> Self {
        Self { layer, limits }
    }

    /// The cells whose colours are being assigned.
    #[inline]
    pub fn layer(&self) -> &GridLayer {
        self.layer
    }

    /// Numeric bounds of the problem.
    #[inline]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Write a `%name[XRANGE, YRANGE, COLORS] <` table: one line per `(x, y)`, x-major, holding one value per colour.
    fn write_table(&self, f: &mut Formatter<'_>, name: &str, colors: &[Color], value: impl Fn(usize, usize, Color) -> usize) -> std::fmt::Result {
        writeln!(f, "%{name}[XRANGE, YRANGE, COLORS] <")?;
        for x in 0..self.layer.width() {
            for y in 0..self.layer.height() {
                let mut line = String::new();
                for &c in colors {
                    write!(line, "{} ", value(x, y, c))?;
                }
                writeln!(f, "{line}")?;
            }
        }
        writeln!(f, ">")
    }
}

/// An inclusive `0..n-1` set range. An empty range renders as `0..-1`, which the solver reads as the empty set.
fn set_range(n: usize) -> String {
    format!("0..{}", n as isize - 1)
}

impl Display for Problem<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let Limits { cell_color_limit, max_background_palettes, max_sprite_palettes, max_row_size } = self.limits;
        writeln!(f, "%CELL_COLOR_LIMIT < {cell_color_limit} >")?;
        writeln!(f, "%MAX_BG_PALETTES < {max_background_palettes} >")?;
        writeln!(f, "%BG_PALETTES set < {} >", set_range(max_background_palettes))?;
        writeln!(f, "%MAX_SPR_PALETTES < {max_sprite_palettes} >")?;
        writeln!(f, "%SPR_PALETTES set < {} >", set_range(max_sprite_palettes))?;
        writeln!(f, "%OVERLAY_ROW_SIZE_LIMIT < {max_row_size} >")?;
        writeln!(f, "%XRANGE set < {} >", set_range(self.layer.width()))?;
        writeln!(f, "%YRANGE set < {} >", set_range(self.layer.height()))?;

        let colors = self.layer.colors().into_iter().collect::<Vec<_>>();
        let mut color_list = String::new();
        for c in &colors {
            write!(color_list, "{c} ")?;
        }
        writeln!(f, "%COLORS set < {color_list} >")?;

        self.write_table(f, "layerColors", &colors, |x, y, c| usize::from(self.layer.cell(x, y).colors.contains(&c)))?;
        self.write_table(f, "layerColorColumnCount", &colors, |x, y, c| self.layer.cell(x, y).columns_of(c))
    }
}
