#![warn(missing_docs)]

//! # `overlaypal`
//!
//! Converts an indexed-colour image into the layers retro console hardware can display: a background built from
//! tiles, each tile restricted to one small palette, plus sprites that overlay the colours the background cannot
//! hold.
//! Begin by constructing an [`OverlayOptimiser`] around a [`Solver`] such as [`CmplSolver`](solver::CmplSolver),
//! then call [`convert()`](OverlayOptimiser::convert) and read the layers, palettes and sprites back from
//! [`Conversion`].
//!
//! # Internals
//! Choosing which colours stay in the background, which move to sprites and how colours group into palettes is a
//! combinatorial optimisation problem. This crate does not solve it directly; it expresses it as a data file for a
//! mixed-integer model run by an external solver, reads the solver's solution table back and repairs what a
//! time-limited solver leaves unoptimised.
//!
//! A high level overview is as follows:
//!
//! 1. Decompose the image into a [`GridLayer`] of background cells, recording each cell's colours and how many
//!    columns each colour spans.
//! 2. First pass: the solver decides per cell and colour whether the colour stays in the background or is released
//!    to the overlay, subject to the per-cell colour limit, the number of background palettes and a row budget for
//!    released cells. Columns spanned weight the objective, so wide colours preferably stay.
//! 3. Refine: move back released colours that fit their cell's palette after all, merge palettes whose union still
//!    fits, and let neighbouring cells share palettes.
//! 4. Second pass: the overlay, cut into sprite-sized cells, is split the same way into grid-aligned sprites and a
//!    remainder, which is covered by freely positioned sprites choosing the best-fitting sprite palette.
//! 5. Merge horizontally adjacent sprites whose blank edges allow it, count sprites per scanline, and remap every
//!    layer to hardware palette indices.

pub use compose::{check_consistency, hardware_index, merge_layers, remap_colors, render_sprites};
pub use error::{Error, Result};
pub use grid::{GridCell, GridLayer, Palette, PaletteIndexGrid};
pub use hardware::Hardware;
pub use image::{Color, Image};
pub use optimiser::{split_layers, Conversion, ConversionStatus, ConvertParams, OverlayOptimiser};
pub use problem::{Limits, Problem};
pub use solution::Solution;
pub use solver::{CmplConfig, CmplSolver, Pass, Solver};
pub use sprite::Sprite;

pub(crate) mod compose;
pub(crate) mod error;
pub(crate) mod grid;
pub(crate) mod hardware;
pub(crate) mod image;
pub(crate) mod optimiser;
pub(crate) mod problem;
pub mod refine;
pub(crate) mod solution;
pub mod solver;
pub mod sprite;
