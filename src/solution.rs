use std::ops::Range;

use log::debug;

use crate::error::{Error, Result};
use crate::grid::{GridLayer, Palette, PaletteIndexGrid};
use crate::image::Color;
use crate::solver::Pass;

const HEADER_MARKER: &str = "Problem;";
const NO_SOLUTION: &str = "No solution has been found";

/// The decoded assignment of one solver pass.
#[derive(Clone, Debug)]
pub struct Solution {
    /// Colours each cell keeps: the background layer on the first pass, grid-aligned sprites on the second.
    pub retained: GridLayer,
    /// Colours each cell releases: the overlay on the first pass, freely positioned sprites on the second.
    pub released: GridLayer,
    /// Palettes in the order the solver numbered them.
    pub palettes: Vec<Palette>,
    /// Palette used by each cell, already shifted into the flat palette index space.
    pub palette_indices: PaletteIndexGrid,
}

/// One variable assignment, e.g. `colorsBG[3,1,7];B;1`.
struct Assignment<'a> {
    name: &'a str,
    indices: Vec<usize>,
    active: bool,
}

impl<'a> Assignment<'a> {
    /// Parse `name[i,j,...];TYPE;activity[;...]`. Both boolean (`B`) and integer (`I`) types are accepted, since
    /// the solver sometimes reports binary variables as integers.
    fn parse(line: &'a str) -> Option<Self> {
        let mut fields = line.split(';');
        let variable = fields.next()?;
        let kind = fields.next()?.trim();
        if kind != "B" && kind != "I" {
            return None;
        }
        let activity: f64 = fields.next()?.trim().parse().ok()?;

        let (name, rest) = variable.split_once('[')?;
        let indices = rest
            .strip_suffix(']')?
            .split(',')
            .map(|i| i.trim().parse::<usize>().ok())
            .collect::<Option<Vec<_>>>()?;

        Some(Self { name: name.trim(), indices, active: activity.round() == 1.0 })
    }
}

impl Solution {
    /// Decode the solution table `table` produced for `pass` on a problem over a `width` by `height` grid of
    /// `cell_width` by `cell_height` cells.
    ///
    /// The pass may number at most `palette_range.len()` palettes. Palette usage is mapped into `palette_range`, so
    /// second-pass sprite palettes continue numbering after the background palettes. Nothing is returned if the table
    /// reports that no solution was found.
    pub fn parse(
        table: &str,
        pass: Pass,
        (cell_width, cell_height): (usize, usize),
        (width, height): (usize, usize),
        palette_range: Range<usize>,
    ) -> Result<Self> {
        let mut lines = table.lines();
        if !lines.next().is_some_and(|header| header.contains(HEADER_MARKER)) {
            return Err(Error::UnrecognizedHeader);
        }

        let mut solution = Self {
            retained: GridLayer::blank(cell_width, cell_height, width, height),
            released: GridLayer::blank(cell_width, cell_height, width, height),
            palettes: Vec::new(),
            palette_indices: PaletteIndexGrid::new(width, height, palette_range.start),
        };
        let [retained_name, released_name, palette_name, uses_name] = pass.variable_names();

        for (line_number, line) in lines.enumerate().map(|(n, l)| (n + 2, l)) {
            if line.starts_with(NO_SOLUTION) {
                return Err(Error::NoSolutionFound { pass });
            }

            let known = [retained_name, released_name, palette_name, uses_name]
                .iter()
                .any(|name| line.strip_prefix(name).is_some_and(|rest| rest.starts_with('[')));
            if !known {
                continue;
            }

            let malformed = || Error::MalformedLine { line_number, line: line.to_string() };
            let out_of_range = || Error::IndexOutOfRange { line_number, line: line.to_string() };
            let assignment = Assignment::parse(line).ok_or_else(malformed)?;
            if !assignment.active {
                continue;
            }

            let name = assignment.name;
            match assignment.indices[..] {
                [x, y, c] if name == retained_name || name == released_name => {
                    let color = Color::try_from(c).map_err(|_| out_of_range())?;
                    let layer = if name == retained_name { &mut solution.retained } else { &mut solution.released };
                    layer.try_cell_mut(x, y).ok_or_else(out_of_range)?.colors.insert(color);
                }
                [p, c] if name == palette_name => {
                    if p >= palette_range.len() {
                        return Err(out_of_range());
                    }
                    let color = Color::try_from(c).map_err(|_| out_of_range())?;
                    if p >= solution.palettes.len() {
                        solution.palettes.resize_with(p + 1, Palette::new);
                    }
                    solution.palettes[p].insert(color);
                }
                [x, y, p] if name == uses_name => {
                    if p >= palette_range.len() || !solution.palette_indices.try_set(x, y, palette_range.start + p) {
                        return Err(out_of_range());
                    }
                }
                _ => return Err(malformed()),
            }
        }

        debug!("{pass} solution uses {} palettes", solution.palettes.len());
        Ok(solution)
    }
}
