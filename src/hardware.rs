use serde::Deserialize;

/// Fixed properties of the target video hardware.
///
/// The defaults describe the NES PPU: groups of four palette entries where entry 0 is transparent,
/// four background palettes, four sprite palettes and sprites that are eight pixels wide.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Number of hardware palette entries per palette, including the transparent entry 0.
    pub palette_group_size: usize,
    /// Number of palettes available to the background layer.
    pub num_background_palettes: usize,
    /// Number of palettes available to sprites. Sprite palettes are numbered after the background ones.
    pub num_sprite_palettes: usize,
    /// Width of a hardware sprite in pixels.
    pub sprite_width: usize,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            palette_group_size: 4,
            num_background_palettes: 4,
            num_sprite_palettes: 4,
            sprite_width: 8,
        }
    }
}

impl Hardware {
    /// Total number of palettes, background and sprite combined.
    #[inline]
    pub fn num_palettes(&self) -> usize {
        self.num_background_palettes + self.num_sprite_palettes
    }

    /// The flat palette index range used by sprites.
    #[inline]
    pub fn sprite_palette_range(&self) -> std::ops::Range<usize> {
        self.num_background_palettes..self.num_palettes()
    }

    /// Most colours a single palette can hold, since entry 0 of every group is transparent.
    #[inline]
    pub fn max_palette_colors(&self) -> usize {
        self.palette_group_size.saturating_sub(1)
    }
}
