use ndarray::Array2;

use crate::error::{Error, Result};

/// A colour index, one byte per pixel.
pub type Color = u8;

/// A two-dimensional grid of colour indices.
///
/// Pixels are stored row-major, so the underlying array is indexed `[[y, x]]`; the accessors take `(x, y)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    pixels: Array2<Color>,
}

impl Image {
    /// A `width` by `height` image with every pixel set to `fill`.
    pub fn new(width: usize, height: usize, fill: Color) -> Self {
        Self { pixels: Array2::from_elem((height, width), fill) }
    }

    /// Build an image from row-major pixel data.
    pub fn from_vec(width: usize, height: usize, data: Vec<Color>) -> Result<Self> {
        let pixels = Array2::from_shape_vec((height, width), data)
            .map_err(|e| Error::InvalidParameters(format!("pixel data does not describe a {width}x{height} image: {e}")))?;
        Ok(Self { pixels })
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    /// Colour at `(x, y)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Color {
        self.pixels[[y, x]]
    }

    /// Like [`Self::get`], but out-of-bounds positions read as `outside`.
    #[inline]
    pub fn get_or(&self, x: usize, y: usize, outside: Color) -> Color {
        self.pixels.get([y, x]).copied().unwrap_or(outside)
    }

    /// Set the colour at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, color: Color) {
        self.pixels[[y, x]] = color;
    }

    /// Whether every pixel is `background`.
    pub fn is_empty(&self, background: Color) -> bool {
        self.pixels.iter().all(|&c| c == background)
    }

    /// Whether every pixel in row `y` is `background`.
    pub fn row_is_empty(&self, y: usize, background: Color) -> bool {
        self.pixels.row(y).iter().all(|&c| c == background)
    }

    /// Row-major pixel data.
    pub fn to_vec(&self) -> Vec<Color> {
        self.pixels.iter().copied().collect()
    }
}
