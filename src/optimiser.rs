use std::fmt::{Display, Formatter};

use log::{info, warn};

use crate::compose::{check_consistency, merge_layers, remap_colors, render_sprites};
use crate::error::{Error, Result};
use crate::grid::{GridLayer, Palette, PaletteIndexGrid};
use crate::hardware::Hardware;
use crate::image::{Color, Image};
use crate::problem::{Limits, Problem};
use crate::refine::{optimize_continuity, optimize_unnecessary_overlay_colors, optimize_unnecessary_palettes};
use crate::solution::Solution;
use crate::solver::{Pass, Solver};
use crate::sprite::{max_sprites_per_scanline, optimize_horizontally_adjacent_sprites, Sprite, SpriteExtractor};

/// Parameters of one conversion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConvertParams {
    /// Colour index meaning "no ink" in the source image.
    pub background_color: Color,
    /// Width in pixels of a background cell.
    pub cell_width: usize,
    /// Height in pixels of a background cell.
    pub cell_height: usize,
    /// Height in pixels of a sprite, typically 8 or 16.
    pub sprite_height: usize,
    /// Most colours a cell or palette may hold, not counting transparency.
    pub cell_color_limit: usize,
    /// Background palettes the conversion may use, at most the hardware's count.
    pub max_background_palettes: usize,
    /// Sprite palettes the conversion may use, at most the hardware's count.
    pub max_sprite_palettes: usize,
    /// Sprites the hardware can show on one scanline.
    pub max_sprites_per_scanline: usize,
    /// Soft time budget for each solver pass; 0 lets the solver run to optimality.
    pub timeout_seconds: u32,
}

impl Default for ConvertParams {
    fn default() -> Self {
        Self {
            background_color: 0,
            cell_width: 16,
            cell_height: 16,
            sprite_height: 16,
            cell_color_limit: 3,
            max_background_palettes: 4,
            max_sprite_palettes: 4,
            max_sprites_per_scanline: 8,
            timeout_seconds: 0,
        }
    }
}

/// Outcome of a conversion that ran to completion.
///
/// Every variant other than [`Success`](Self::Success) still leaves all layers, palettes and sprites available for
/// inspection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConversionStatus {
    /// Every layer fits the hardware.
    Success,
    /// Colours had to be moved to the overlay but no sprite palettes were allowed.
    SpritePalettesRequired,
    /// More sprites share a scanline than the hardware can display.
    TooManySpritesPerScanline {
        /// Most sprites found on one scanline.
        observed: usize,
        /// The requested maximum.
        limit: usize,
    },
}

impl ConversionStatus {
    /// Whether the conversion fits the hardware.
    #[inline]
    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

/// The status message: empty on success, a description of the failure otherwise.
impl Display for ConversionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => Ok(()),
            Self::SpritePalettesRequired => write!(f, "Sprite palettes required."),
            Self::TooManySpritesPerScanline { observed, limit } => write!(f, "Too many sprites / scanline ({observed} > {limit})"),
        }
    }
}

/// Everything computed by the most recent conversion.
#[derive(Clone, Debug)]
pub struct Conversion {
    pub(crate) source: Image,
    pub(crate) image_background: Image,
    pub(crate) image_overlay: Image,
    pub(crate) image_overlay_grid: Image,
    pub(crate) image_overlay_free: Image,
    pub(crate) layer_background: GridLayer,
    pub(crate) layer_overlay_grid: GridLayer,
    pub(crate) layer_overlay_free: GridLayer,
    pub(crate) palettes: Vec<Palette>,
    pub(crate) palette_indices_background: PaletteIndexGrid,
    pub(crate) palette_indices_overlay: PaletteIndexGrid,
    pub(crate) sprites_grid: Vec<Sprite>,
    pub(crate) sprites_free: Vec<Sprite>,
    pub(crate) sprites: Vec<Sprite>,
    pub(crate) max_sprites_per_scanline: usize,
    pub(crate) output_background: Image,
    pub(crate) output_overlay_grid: Image,
    pub(crate) output_overlay_free: Image,
    pub(crate) output: Image,
}

impl Conversion {
    fn blank(image: &Image, params: &ConvertParams, hardware: Hardware) -> Self {
        let (width, height) = (image.width(), image.height());
        let blank = Image::new(width, height, params.background_color);
        let unmapped = Image::new(width, height, 0);
        let (cells_x, cells_y) = (width / params.cell_width.max(1), height / params.cell_height.max(1));
        let (sprites_x, sprites_y) = (width / hardware.sprite_width.max(1), height / params.sprite_height.max(1));
        let blank_overlay = GridLayer::blank(hardware.sprite_width, params.sprite_height, sprites_x, sprites_y);

        Self {
            source: image.clone(),
            image_background: blank.clone(),
            image_overlay: blank.clone(),
            image_overlay_grid: blank.clone(),
            image_overlay_free: blank,
            layer_background: GridLayer::blank(params.cell_width, params.cell_height, cells_x, cells_y),
            layer_overlay_grid: blank_overlay.clone(),
            layer_overlay_free: blank_overlay,
            palettes: Vec::new(),
            palette_indices_background: PaletteIndexGrid::new(cells_x, cells_y, 0),
            palette_indices_overlay: PaletteIndexGrid::new(sprites_x, sprites_y, hardware.num_background_palettes),
            sprites_grid: Vec::new(),
            sprites_free: Vec::new(),
            sprites: Vec::new(),
            max_sprites_per_scanline: 0,
            output_background: unmapped.clone(),
            output_overlay_grid: unmapped.clone(),
            output_overlay_free: unmapped.clone(),
            output: unmapped,
        }
    }

    /// The source image as given to the conversion.
    pub fn source(&self) -> &Image {
        &self.source
    }

    /// Pixels kept in the background layer, in source colours.
    pub fn image_background(&self) -> &Image {
        &self.image_background
    }

    /// Pixels moved out of the background by the first pass, in source colours.
    pub fn image_overlay(&self) -> &Image {
        &self.image_overlay
    }

    /// Overlay pixels drawn by grid-aligned sprites, in source colours.
    pub fn image_overlay_grid(&self) -> &Image {
        &self.image_overlay_grid
    }

    /// Overlay pixels drawn by freely positioned sprites, in source colours.
    pub fn image_overlay_free(&self) -> &Image {
        &self.image_overlay_free
    }

    /// Colours each background cell keeps.
    pub fn layer_background(&self) -> &GridLayer {
        &self.layer_background
    }

    /// Colours each sprite cell draws with a grid-aligned sprite.
    pub fn layer_overlay_grid(&self) -> &GridLayer {
        &self.layer_overlay_grid
    }

    /// Colours each sprite cell leaves to freely positioned sprites.
    pub fn layer_overlay_free(&self) -> &GridLayer {
        &self.layer_overlay_free
    }

    /// Background palettes followed by sprite palettes.
    pub fn palettes(&self) -> &[Palette] {
        &self.palettes
    }

    /// Palette of each background cell.
    pub fn palette_indices_background(&self) -> &PaletteIndexGrid {
        &self.palette_indices_background
    }

    /// Palette of each sprite cell, numbered after the background palettes.
    pub fn palette_indices_overlay(&self) -> &PaletteIndexGrid {
        &self.palette_indices_overlay
    }

    /// Sprites aligned to the sprite grid, before merging.
    pub fn sprites_grid(&self) -> &[Sprite] {
        &self.sprites_grid
    }

    /// Freely positioned sprites, before merging.
    pub fn sprites_free(&self) -> &[Sprite] {
        &self.sprites_free
    }

    /// Grid and free sprites after horizontal adjacency optimisation.
    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    /// Most sprites sharing one scanline in [`Self::sprites`].
    pub fn max_sprites_per_scanline(&self) -> usize {
        self.max_sprites_per_scanline
    }

    /// Background layer in hardware indices.
    pub fn output_background(&self) -> &Image {
        &self.output_background
    }

    /// Grid-aligned sprite layer in hardware indices.
    pub fn output_overlay_grid(&self) -> &Image {
        &self.output_overlay_grid
    }

    /// Free sprite layer in hardware indices.
    pub fn output_overlay_free(&self) -> &Image {
        &self.output_overlay_free
    }

    /// The composited image in hardware indices, 0 being transparent.
    pub fn output(&self) -> &Image {
        &self.output
    }
}

/// Split `image` into a background and an overlay image: pixels whose colour is in their cell's colour set in
/// `released` go to the overlay, all other pixels stay in the background.
pub fn split_layers(image: &Image, released: &GridLayer, background: Color) -> (Image, Image) {
    let mut kept = image.clone();
    let mut moved = Image::new(image.width(), image.height(), background);
    for (x, y) in released.positions() {
        let colors = &released.cell(x, y).colors;
        for (xx, yy) in released.pixels_of(x, y) {
            let c = image.get(xx, yy);
            if colors.contains(&c) {
                moved.set(xx, yy, c);
                kept.set(xx, yy, background);
            }
        }
    }
    (kept, moved)
}

/// Converts indexed images into a background layer and sprites under hardware palette constraints, delegating the
/// palette assignment problems to a [`Solver`].
///
/// Conversion runs in two solver passes:
/// 1. Every background cell either keeps each of its colours or releases it to the overlay, and kept colours are
///    grouped into background palettes.
/// 2. The overlay, cut into sprite-sized cells, is split the same way into grid-aligned sprites and a remainder
///    covered by freely positioned sprites.
///
/// Between and after the passes, the heuristics in [`refine`](crate::refine) repair what a time-limited solver left
/// unoptimised, and the [`sprite`](crate::sprite) module cuts the final sprites.
pub struct OverlayOptimiser<S: Solver> {
    solver: S,
    hardware: Hardware,
    conversion: Option<Conversion>,
}

impl<S: Solver> OverlayOptimiser<S> {
    /// An optimiser for `hardware` that hands its palette problems to `solver`.
    pub fn new(solver: S, hardware: Hardware) -> Self {
        Self { solver, hardware, conversion: None }
    }

    /// The target hardware.
    pub fn hardware(&self) -> Hardware {
        self.hardware
    }

    /// The solver problems are handed to.
    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Results of the most recent conversion, including one that failed part way. After a fatal error only the data
    /// computed before the failure is meaningful.
    pub fn conversion(&self) -> Option<&Conversion> {
        self.conversion.as_ref()
    }

    /// Convert `image`, replacing any previous results.
    ///
    /// Returns `Err` for fatal failures and `Ok` with a [`ConversionStatus`] otherwise, in which case every layer is
    /// available through [`Self::conversion`].
    ///
    /// [`Error::NoBackgroundBudgetExceeded`] still leaves the overlay image and the blank palettes readable through
    /// [`Self::conversion`].
    pub fn convert(&mut self, image: &Image, params: &ConvertParams) -> Result<ConversionStatus> {
        self.conversion = None;
        let cell_color_limit = self.validate(image, params)?;
        self.solver.reset()?;

        let mut conversion = Conversion::blank(image, params, self.hardware);
        let status = self.run(image, params, cell_color_limit, &mut conversion);
        self.conversion = Some(conversion);
        match &status {
            Ok(status) if status.is_success() => info!("conversion succeeded"),
            Ok(status) => warn!("conversion finished: {status}"),
            Err(e) => warn!("conversion failed: {e}"),
        }
        status
    }

    /// Check `params` against `image` and the hardware, returning the effective cell colour limit.
    fn validate(&self, image: &Image, params: &ConvertParams) -> Result<usize> {
        let hw = self.hardware;
        let invalid = |message: String| Err(Error::InvalidParameters(message));

        if params.cell_width == 0 || params.cell_height == 0 || params.sprite_height == 0 || hw.sprite_width == 0 {
            return invalid("cell and sprite dimensions must be non-zero".to_string());
        }
        if image.width() % params.cell_width != 0 || image.height() % params.cell_height != 0 {
            return invalid(format!("{}x{} image is not a whole number of {}x{} cells", image.width(), image.height(), params.cell_width, params.cell_height));
        }
        if image.width() % hw.sprite_width != 0 || image.height() % params.sprite_height != 0 {
            return invalid(format!("{}x{} image is not a whole number of {}x{} sprites", image.width(), image.height(), hw.sprite_width, params.sprite_height));
        }
        if hw.num_background_palettes == 0 || hw.num_sprite_palettes == 0 {
            return invalid("hardware must provide background and sprite palettes".to_string());
        }
        if hw.num_palettes() * hw.palette_group_size > usize::from(Color::MAX) + 1 {
            return invalid("hardware palette indices do not fit in a byte".to_string());
        }
        if params.max_background_palettes > hw.num_background_palettes {
            return invalid(format!("{} background palettes requested, hardware has {}", params.max_background_palettes, hw.num_background_palettes));
        }
        if params.max_sprite_palettes > hw.num_sprite_palettes {
            return invalid(format!("{} sprite palettes requested, hardware has {}", params.max_sprite_palettes, hw.num_sprite_palettes));
        }

        let limit = params.cell_color_limit.min(hw.max_palette_colors());
        if limit == 0 {
            return invalid("cell color limit must be at least 1".to_string());
        }
        if limit < params.cell_color_limit {
            warn!("cell color limit {} exceeds the {} colors a palette can hold; using {limit}", params.cell_color_limit, hw.max_palette_colors());
        }
        Ok(limit)
    }

    fn run(&mut self, image: &Image, params: &ConvertParams, cell_color_limit: usize, out: &mut Conversion) -> Result<ConversionStatus> {
        let hw = self.hardware;
        let bg = params.background_color;
        let (sprite_width, sprite_height) = (hw.sprite_width, params.sprite_height);

        if image.is_empty(bg) {
            info!("image has no ink; nothing to convert");
            out.palettes = vec![Palette::new(); hw.num_palettes()];
            return Ok(ConversionStatus::Success);
        }

        // first pass
        let layer = GridLayer::from_image(image, bg, params.cell_width, params.cell_height);
        // four times the hardware budget so a visible, if over-budget, solution always exists
        let max_row_size = (4 * sprite_width / params.cell_width) * params.max_sprites_per_scanline;
        let background_range = 0..params.max_background_palettes;

        let (mut layer_background, mut layer_overlay, mut palettes, mut indices_background) = if params.max_background_palettes == 0 {
            let colors = layer.colors().len();
            let busiest_row = layer.max_cells_in_row();
            let max_colors = params.max_sprite_palettes * cell_color_limit;
            out.image_overlay = image.clone();
            out.palettes = vec![Palette::new(); hw.num_palettes()];
            if colors > max_colors || busiest_row > max_row_size {
                return Err(Error::NoBackgroundBudgetExceeded { colors, max_colors, busiest_row, max_row_size });
            }
            let indices = PaletteIndexGrid::new(layer.width(), layer.height(), 0);
            let blank = GridLayer::blank(layer.cell_width(), layer.cell_height(), layer.width(), layer.height());
            (blank, layer.clone(), Vec::new(), indices)
        } else {
            info!("{}: {}x{} cells of {}x{}", Pass::First, layer.width(), layer.height(), params.cell_width, params.cell_height);
            let limits = Limits {
                cell_color_limit,
                max_background_palettes: params.max_background_palettes,
                max_sprite_palettes: params.max_sprite_palettes,
                max_row_size,
            };
            let table = self.solver.solve(Pass::First, &Problem::new(&layer, limits), params.timeout_seconds)?;
            let solution = Solution::parse(&table, Pass::First, (params.cell_width, params.cell_height), (layer.width(), layer.height()), background_range.clone())?;
            (solution.retained, solution.released, solution.palettes, solution.palette_indices)
        };
        palettes.resize(params.max_background_palettes, Palette::new());
        indices_background.set_empty(&layer_background, 0);

        optimize_unnecessary_overlay_colors(&mut layer_background, &mut layer_overlay, &indices_background, background_range.clone(), &mut palettes, cell_color_limit);
        optimize_unnecessary_palettes(&mut indices_background, background_range.clone(), &mut palettes, cell_color_limit);
        palettes.resize(hw.num_background_palettes, Palette::new());

        let (image_background, image_overlay) = split_layers(image, &layer_overlay, bg);
        optimize_continuity(&layer_background, &mut indices_background, background_range, &palettes);
        check_consistency(&image_background, &layer_background, &palettes, &indices_background, 0..hw.num_background_palettes, cell_color_limit, bg)?;

        out.output_background = remap_colors(&image_background, &layer_background, &palettes, &indices_background, hw.palette_group_size, bg)?;
        out.output = out.output_background.clone();
        out.image_background = image_background;
        out.layer_background = layer_background;
        out.palette_indices_background = indices_background;
        out.image_overlay = image_overlay.clone();

        if image_overlay.is_empty(bg) || params.max_sprite_palettes == 0 {
            palettes.resize(hw.num_palettes(), Palette::new());
            out.palettes = palettes;
            return Ok(if image_overlay.is_empty(bg) { ConversionStatus::Success } else { ConversionStatus::SpritePalettesRequired });
        }

        // second pass, over the overlay in sprite-sized cells
        let sprite_range = hw.num_background_palettes..hw.num_background_palettes + params.max_sprite_palettes;
        let overlay = GridLayer::from_image(&image_overlay, bg, sprite_width, sprite_height);
        info!("{}: {}x{} cells of {}x{}", Pass::Second, overlay.width(), overlay.height(), sprite_width, sprite_height);
        let limits = Limits {
            cell_color_limit,
            max_background_palettes: 0,
            max_sprite_palettes: params.max_sprite_palettes,
            max_row_size: 4 * params.max_sprites_per_scanline,
        };
        let table = self.solver.solve(Pass::Second, &Problem::new(&overlay, limits), params.timeout_seconds)?;
        let solution = Solution::parse(&table, Pass::Second, (sprite_width, sprite_height), (overlay.width(), overlay.height()), sprite_range.clone())?;
        let (mut layer_grid, mut layer_free, mut indices_overlay) = (solution.retained, solution.released, solution.palette_indices);
        palettes.extend(solution.palettes);
        palettes.resize(sprite_range.end, Palette::new());
        indices_overlay.set_empty(&layer_grid, hw.num_background_palettes);

        optimize_unnecessary_overlay_colors(&mut layer_grid, &mut layer_free, &indices_overlay, sprite_range.clone(), &mut palettes, cell_color_limit);
        optimize_unnecessary_palettes(&mut indices_overlay, sprite_range.clone(), &mut palettes, cell_color_limit);
        palettes.resize(hw.num_palettes(), Palette::new());

        let (image_grid, image_free) = split_layers(&image_overlay, &layer_free, bg);
        optimize_continuity(&layer_grid, &mut indices_overlay, sprite_range, &palettes);
        check_consistency(&image_grid, &layer_grid, &palettes, &indices_overlay, hw.sprite_palette_range(), cell_color_limit, bg)?;

        // sprites
        let extractor = SpriteExtractor::new(hw, sprite_height, bg, &palettes);
        let sprites_grid = extractor.grid_sprites(&layer_grid, &indices_overlay, &image_grid);
        let sprites_free = extractor.free_sprites(&image_free);
        let combined = sprites_grid.iter().chain(&sprites_free).cloned().collect();
        let sprites = optimize_horizontally_adjacent_sprites(combined, sprite_width, bg);
        let observed = max_sprites_per_scanline(&sprites, image.height());
        info!("{} grid and {} free sprites, {} after merging, at most {observed} per scanline", sprites_grid.len(), sprites_free.len(), sprites.len());

        out.output_overlay_grid = remap_colors(&image_grid, &layer_grid, &palettes, &indices_overlay, hw.palette_group_size, bg)?;
        out.output_overlay_free = render_sprites(&sprites_free, (image.width(), image.height()), &palettes, hw.palette_group_size, bg)?;
        out.output = merge_layers(&out.output_background, &out.output_overlay_grid, &out.output_overlay_free)?;
        out.image_overlay_grid = image_grid;
        out.image_overlay_free = image_free;
        out.layer_overlay_grid = layer_grid;
        out.layer_overlay_free = layer_free;
        out.palette_indices_overlay = indices_overlay;
        out.palettes = palettes;
        out.sprites_grid = sprites_grid;
        out.sprites_free = sprites_free;
        out.sprites = sprites;
        out.max_sprites_per_scanline = observed;

        if observed > params.max_sprites_per_scanline {
            Ok(ConversionStatus::TooManySpritesPerScanline { observed, limit: params.max_sprites_per_scanline })
        } else {
            Ok(ConversionStatus::Success)
        }
    }
}
