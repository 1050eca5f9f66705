//! Handing palette assignment problems to an external solver.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use strum::{Display, VariantArray};

use crate::error::{Error, Result};
use crate::problem::Problem;

/// The two solver passes of a conversion.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display, VariantArray)]
pub enum Pass {
    /// Split the image into background and overlay.
    #[strum(serialize = "first pass")]
    First,
    /// Split the overlay into grid-aligned and freely positioned sprites.
    #[strum(serialize = "second pass")]
    Second,
}

impl Pass {
    /// Base name shared by this pass's model program and intermediate files.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::First => "firstPass",
            Self::Second => "secondPass",
        }
    }

    /// Names of the solution variables holding, in order: colours kept in the cell, colours released to the
    /// overlay, palette membership, and per-cell palette usage.
    pub(crate) fn variable_names(&self) -> [&'static str; 4] {
        match self {
            Self::First => ["colorsBG", "colorsOverlay", "palettesBG", "usesPaletteBG"],
            Self::Second => ["colorsOverlayGrid", "colorsOverlayFree", "palettesOverlay", "usesPaletteOverlay"],
        }
    }
}

/// An external optimisation solver.
///
/// Implementors receive a [`Problem`] and return the solver's solution table as text, in the format read by
/// [`Solution::parse`](crate::Solution::parse). Reporting infeasibility is done through the table itself.
pub trait Solver {
    /// Solve `problem` for `pass`. A non-zero `timeout_seconds` is a soft budget for the solver's search.
    fn solve(&mut self, pass: Pass, problem: &Problem, timeout_seconds: u32) -> Result<String>;

    /// Discard any state left over from a previous conversion.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Locations used by [`CmplSolver`].
#[derive(Clone, Debug)]
pub struct CmplConfig {
    /// The `cmpl` executable.
    pub executable: PathBuf,
    /// Directory holding the `firstPass.cmpl` and `secondPass.cmpl` model programs.
    pub model_dir: PathBuf,
    /// Directory receiving problem data, prepared programs and solution tables.
    pub work_dir: PathBuf,
}

/// [`Solver`] backed by the CMPL modelling language and its bundled CBC solver, run as a subprocess.
pub struct CmplSolver {
    config: CmplConfig,
}

/// Prefix `program` with the CBC time-budget directive, if a budget is set.
///
/// CMPL offers no command-line switch for the CBC time limit, so the budget travels inside the program text.
pub fn with_time_budget(program: &str, timeout_seconds: u32) -> String {
    if timeout_seconds > 0 {
        format!("%opt cbc seconds {timeout_seconds}\n{program}")
    } else {
        program.to_string()
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|source| Error::Io { path: path.to_path_buf(), source })
}

impl CmplSolver {
    /// A solver running `cmpl` with the locations in `config`.
    pub fn new(config: CmplConfig) -> Self {
        Self { config }
    }

    /// Locations this solver reads and writes.
    pub fn config(&self) -> &CmplConfig {
        &self.config
    }

    fn data_path(&self, pass: Pass) -> PathBuf {
        self.config.work_dir.join(format!("{}.cdat", pass.file_stem()))
    }

    fn program_path(&self, pass: Pass) -> PathBuf {
        self.config.model_dir.join(format!("{}.cmpl", pass.file_stem()))
    }

    fn prepared_program_path(&self, pass: Pass) -> PathBuf {
        self.config.work_dir.join(format!("{}_out.cmpl", pass.file_stem()))
    }

    fn solution_path(&self, pass: Pass) -> PathBuf {
        self.config.work_dir.join(format!("{}.csv", pass.file_stem()))
    }

    /// Every intermediate file a pass may leave in the work directory.
    fn intermediate_files(&self) -> Vec<PathBuf> {
        Pass::VARIANTS
            .iter()
            .flat_map(|&pass| [self.prepared_program_path(pass), self.data_path(pass), self.solution_path(pass)])
            .collect()
    }
}

impl Solver for CmplSolver {
    fn solve(&mut self, pass: Pass, problem: &Problem, timeout_seconds: u32) -> Result<String> {
        write(&self.data_path(pass), &problem.to_string())?;

        let program = read(&self.program_path(pass))?;
        let prepared = self.prepared_program_path(pass);
        write(&prepared, &with_time_budget(&program, timeout_seconds))?;

        let solution = self.solution_path(pass);
        let mut command = Command::new(&self.config.executable);
        command.arg("-i").arg(&prepared).arg("-solutionCsv").arg(&solution).current_dir(&self.config.work_dir);
        debug!("running {command:?}");
        info!("solving {pass} with a {} budget", if timeout_seconds > 0 { format!("{timeout_seconds}s") } else { "unlimited".to_string() });

        let status = command
            .status()
            .map_err(|source| Error::SolverLaunch { executable: self.config.executable.clone(), source })?;
        if !status.success() {
            return Err(Error::SolverExit { code: status.code() });
        }

        read(&solution)
    }

    fn reset(&mut self) -> Result<()> {
        for path in self.intermediate_files() {
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed stale {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(Error::Io { path, source }),
            }
        }
        Ok(())
    }
}
