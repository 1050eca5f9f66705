use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::solver::Pass;

/// Reasons a conversion may fail outright.
///
/// Soft failures, where every layer is still computed, are reported through
/// [`ConversionStatus`](crate::ConversionStatus) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A solver input or output file could not be read or written.
    #[error("failed to access '{}': {source}", path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying failure.
        source: io::Error,
    },
    /// The solver executable could not be started.
    #[error("failed to launch solver '{}': {source}", executable.display())]
    SolverLaunch {
        /// The executable that failed to start.
        executable: PathBuf,
        /// The underlying failure.
        source: io::Error,
    },
    /// The solver ran but exited unsuccessfully.
    #[error("non-zero exit code from solver ({})", code.map_or_else(|| "killed by signal".to_string(), |c| c.to_string()))]
    SolverExit {
        /// Exit code, absent when the process was killed by a signal.
        code: Option<i32>,
    },
    /// The first line of a solution table did not carry the `Problem;` marker.
    #[error("solution file header unrecognized")]
    UnrecognizedHeader,
    /// A solution line named a known variable but could not be parsed.
    #[error("malformed solution line {line_number}: '{line}'")]
    MalformedLine {
        /// 1-based line number within the table.
        line_number: usize,
        /// The offending line.
        line: String,
    },
    /// A solution line referenced a cell, colour or palette outside the problem.
    #[error("solution line {line_number} indexes outside the problem: '{line}'")]
    IndexOutOfRange {
        /// 1-based line number within the table.
        line_number: usize,
        /// The offending line.
        line: String,
    },
    /// The solver reported the problem infeasible.
    #[error("no solution found ({pass})")]
    NoSolutionFound {
        /// The pass that could not be solved.
        pass: Pass,
    },
    /// Without background palettes every colour must fit in the sprite palettes.
    #[error("first pass of no-background conversion failed: {colors} colors (max {max_colors}), {busiest_row} cells in busiest row (max {max_row_size})")]
    NoBackgroundBudgetExceeded {
        /// Distinct colours in the image.
        colors: usize,
        /// Colours the sprite palettes can hold together.
        max_colors: usize,
        /// Inked cells in the busiest cell row.
        busiest_row: usize,
        /// Inked cells allowed in one row.
        max_row_size: usize,
    },
    /// The conversion parameters do not describe a valid conversion.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// An internal consistency check failed; this indicates a defect, not bad input.
    #[error("internal consistency check failed: {0}")]
    Inconsistent(String),
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
