use super::driver::{SolveSummary, solve_problem};
use super::error::ConstraintError;
use super::problem::{OptimizationProblem, rows_to_points};
use super::solver::{NewtonKktSolver, NonlinearSolver};
use crate::core::models::system::MolecularSystem;
use nalgebra::Point3;
use std::fmt;
use tracing::debug;

/// A molecule whose bond lengths can be snapped to their targets, repeatedly.
///
/// The optimization problem is built once from the structure's topology and
/// then re-seeded for every new geometry:
///
/// ```text
/// update_geometry(xyz) -> solve() -> coordinates()
/// ```
///
/// The molecule keeps its own copy of the structure, whose coordinates always
/// mirror [`coordinates`](Self::coordinates).
pub struct ConstrainedMolecule {
    structure: MolecularSystem,
    problem: OptimizationProblem,
    solver: Box<dyn NonlinearSolver>,
    last_summary: Option<SolveSummary>,
}

impl ConstrainedMolecule {
    /// Builds the problem for `structure` with the bundled [`NewtonKktSolver`].
    pub fn new(structure: &MolecularSystem) -> Result<Self, ConstraintError> {
        Self::with_solver(structure, NewtonKktSolver::default())
    }

    /// Builds the problem for `structure`, solving it with `solver`.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::EmptyTopology`] when the structure has no
    /// bonds and [`ConstraintError::InvalidInput`] when it is not a complete,
    /// parameterized structure.
    pub fn with_solver<S>(structure: &MolecularSystem, solver: S) -> Result<Self, ConstraintError>
    where
        S: NonlinearSolver + 'static,
    {
        let problem = OptimizationProblem::from_system(structure)?;
        Ok(Self {
            structure: structure.clone(),
            problem,
            solver: Box::new(solver),
            last_summary: None,
        })
    }

    /// Starts over from a new geometry of the same molecule.
    ///
    /// The new positions become both the anchors and the starting guess, and
    /// the solved flag is cleared. On error nothing changes.
    pub fn update_geometry(&mut self, positions: &[Point3<f64>]) -> Result<(), ConstraintError> {
        self.problem.update_starting_geometry(positions)?;
        self.sync_structure()?;
        self.last_summary = None;
        Ok(())
    }

    /// [`update_geometry`](Self::update_geometry) for `N x 3` coordinate rows.
    pub fn update_geometry_from_rows(&mut self, rows: &[Vec<f64>]) -> Result<(), ConstraintError> {
        let positions = rows_to_points(rows, self.problem.shape())?;
        self.update_geometry(&positions)
    }

    /// Solves for the closest geometry with exact bond lengths.
    ///
    /// On failure the current coordinates and the solved flag are unchanged.
    pub fn solve(&mut self) -> Result<SolveSummary, ConstraintError> {
        let summary = solve_problem(&mut self.problem, self.solver.as_ref())?;
        self.sync_structure()?;
        self.last_summary = Some(summary);
        debug!(
            iterations = summary.iterations,
            max_bond_deviation = summary.max_bond_deviation,
            "Molecule constrained."
        );
        Ok(summary)
    }

    /// Current coordinates: the starting geometry until a solve succeeds, the
    /// constrained geometry afterwards.
    pub fn coordinates(&self) -> &[Point3<f64>] {
        self.problem.variables()
    }

    /// Replaces the coordinates of an unsolved molecule.
    ///
    /// Equivalent to [`update_geometry`](Self::update_geometry) while the
    /// molecule is unsolved. Once solved the coordinates are a result and
    /// cannot be overwritten; start a new cycle with `update_geometry`.
    pub fn set_coordinates(&mut self, positions: &[Point3<f64>]) -> Result<(), ConstraintError> {
        if self.is_solved() {
            return Err(ConstraintError::IllegalState(
                "coordinates are a solve result and cannot be overwritten; use update_geometry instead"
                    .to_string(),
            ));
        }
        self.update_geometry(positions)
    }

    /// The molecule's structure, carrying the current coordinates.
    pub fn structure(&self) -> &MolecularSystem {
        &self.structure
    }

    pub fn is_solved(&self) -> bool {
        self.problem.is_solved()
    }

    pub fn problem(&self) -> &OptimizationProblem {
        &self.problem
    }

    /// Statistics of the last successful solve of the current geometry.
    pub fn last_summary(&self) -> Option<&SolveSummary> {
        self.last_summary.as_ref()
    }

    fn sync_structure(&mut self) -> Result<(), ConstraintError> {
        self.structure
            .set_coordinates(self.problem.variables())
            .ok_or_else(|| ConstraintError::ShapeMismatch {
                expected: (self.structure.num_atoms(), 3),
                found: self.problem.shape(),
            })
    }
}

impl fmt::Debug for ConstrainedMolecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstrainedMolecule")
            .field("atoms", &self.problem.num_atoms())
            .field("bonds", &self.problem.num_constraints())
            .field("solved", &self.is_solved())
            .finish_non_exhaustive()
    }
}
