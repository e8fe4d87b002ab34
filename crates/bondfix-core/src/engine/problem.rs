use super::error::ConstraintError;
use super::solver::EqualityConstrainedNlp;
use crate::core::models::system::MolecularSystem;
use nalgebra::{DMatrix, DVector, Point3, Vector3};
use std::collections::HashMap;

/// Lengths closer than this are treated as the same target when a pair is
/// listed twice.
const DUPLICATE_LENGTH_TOLERANCE: f64 = 1e-12;

/// An exact distance requirement between two atoms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondConstraint {
    pub i: usize,
    pub j: usize,
    /// Target distance in Angstroms.
    pub length: f64,
}

impl BondConstraint {
    pub fn new(i: usize, j: usize, length: f64) -> Self {
        Self { i, j, length }
    }

    fn sorted_pair(&self) -> (usize, usize) {
        if self.i <= self.j {
            (self.i, self.j)
        } else {
            (self.j, self.i)
        }
    }
}

/// A bond-length constrained least-squares problem for one topology.
///
/// The problem minimizes the summed squared displacement of every atom from
/// its anchor position,
///
/// ```text
/// sum_i (x_i - xa_i)^2 + (y_i - ya_i)^2 + (z_i - za_i)^2
/// ```
///
/// subject to one quadratic equality per bonded pair `(i, j)` with target `L`,
///
/// ```text
/// (x_i - x_j)^2 + (y_i - y_j)^2 + (z_i - z_j)^2 = L^2
/// ```
///
/// The squared form keeps the constraint polynomial, so its gradient is
/// defined everywhere except at coincident atoms.
///
/// The atom count and the bond table are fixed at construction. Anchors and
/// variable start values are replaced in place by
/// [`update_starting_geometry`](Self::update_starting_geometry), which lets a
/// single problem be re-solved for many copies of the same molecule.
#[derive(Debug, Clone)]
pub struct OptimizationProblem {
    /// Reference positions the objective pulls toward.
    anchors: Vec<Point3<f64>>,
    /// Positions adjusted by the solver; the starting guess before a solve
    /// and the constrained result after a successful one.
    variables: Vec<Point3<f64>>,
    /// Target lengths keyed by sorted atom pair.
    bond_lengths: HashMap<(usize, usize), f64>,
    /// One entry per distinct bonded pair, in first-seen order.
    constraints: Vec<BondConstraint>,
    solved: bool,
}

impl OptimizationProblem {
    /// Builds a problem from starting positions and bond constraints.
    ///
    /// Both anchors and variables start as copies of `positions`.
    ///
    /// # Errors
    ///
    /// - [`ConstraintError::EmptyTopology`] if `bonds` is empty.
    /// - [`ConstraintError::InvalidInput`] if there are no atoms, a coordinate
    ///   is not finite, a bond references an unknown atom or the same atom
    ///   twice, a target length is not a positive finite number, or the same
    ///   pair is listed twice with different lengths.
    pub fn new(positions: &[Point3<f64>], bonds: &[BondConstraint]) -> Result<Self, ConstraintError> {
        if bonds.is_empty() {
            return Err(ConstraintError::EmptyTopology);
        }
        if positions.is_empty() {
            return Err(ConstraintError::InvalidInput(
                "structure contains no atoms".to_string(),
            ));
        }
        check_finite(positions)?;

        let num_atoms = positions.len();
        let mut bond_lengths = HashMap::with_capacity(bonds.len());
        let mut constraints = Vec::with_capacity(bonds.len());

        for bond in bonds {
            if bond.i >= num_atoms || bond.j >= num_atoms {
                return Err(ConstraintError::InvalidInput(format!(
                    "bond {}-{} references an atom outside 0..{}",
                    bond.i, bond.j, num_atoms
                )));
            }
            if bond.i == bond.j {
                return Err(ConstraintError::InvalidInput(format!(
                    "bond {}-{} connects an atom to itself",
                    bond.i, bond.j
                )));
            }
            if !(bond.length.is_finite() && bond.length > 0.0) {
                return Err(ConstraintError::InvalidInput(format!(
                    "bond {}-{} has invalid target length {}",
                    bond.i, bond.j, bond.length
                )));
            }

            let key = bond.sorted_pair();
            match bond_lengths.get(&key) {
                Some(&existing) if f64::abs(existing - bond.length) <= DUPLICATE_LENGTH_TOLERANCE => {}
                Some(&existing) => {
                    return Err(ConstraintError::InvalidInput(format!(
                        "bond {}-{} listed twice with conflicting lengths {} and {}",
                        key.0, key.1, existing, bond.length
                    )));
                }
                None => {
                    bond_lengths.insert(key, bond.length);
                    constraints.push(BondConstraint::new(key.0, key.1, bond.length));
                }
            }
        }

        Ok(Self {
            anchors: positions.to_vec(),
            variables: positions.to_vec(),
            bond_lengths,
            constraints,
            solved: false,
        })
    }

    /// Builds a problem from a parameterized molecular system.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError::InvalidInput`] if any bond carries no
    /// equilibrium length, and otherwise the errors of [`Self::new`].
    pub fn from_system(system: &MolecularSystem) -> Result<Self, ConstraintError> {
        let bonds = system
            .bonds()
            .iter()
            .map(|bond| {
                bond.equilibrium_length()
                    .map(|length| BondConstraint::new(bond.atom1, bond.atom2, length))
                    .ok_or_else(|| {
                        ConstraintError::InvalidInput(format!(
                            "bond {}-{} has no equilibrium length; the structure is not parameterized",
                            bond.atom1, bond.atom2
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(&system.coordinates(), &bonds)
    }

    /// Replaces the anchors and the variable start values with new positions.
    ///
    /// Clears the solved flag. Validation happens before anything is written,
    /// so on error the problem is unchanged.
    ///
    /// # Errors
    ///
    /// - [`ConstraintError::ShapeMismatch`] if `positions` does not hold one
    ///   entry per atom.
    /// - [`ConstraintError::InvalidInput`] if a coordinate is not finite.
    pub fn update_starting_geometry(&mut self, positions: &[Point3<f64>]) -> Result<(), ConstraintError> {
        if positions.len() != self.num_atoms() {
            return Err(ConstraintError::ShapeMismatch {
                expected: self.shape(),
                found: (positions.len(), 3),
            });
        }
        check_finite(positions)?;

        self.anchors.copy_from_slice(positions);
        self.variables.copy_from_slice(positions);
        self.solved = false;
        Ok(())
    }

    /// Like [`Self::update_starting_geometry`], for coordinates given as
    /// `N x 3` rows.
    pub fn update_starting_geometry_from_rows(&mut self, rows: &[Vec<f64>]) -> Result<(), ConstraintError> {
        let positions = rows_to_points(rows, self.shape())?;
        self.update_starting_geometry(&positions)
    }

    pub fn num_atoms(&self) -> usize {
        self.anchors.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// The `(atoms, 3)` shape every coordinate array must have.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_atoms(), 3)
    }

    pub fn anchors(&self) -> &[Point3<f64>] {
        &self.anchors
    }

    pub fn variables(&self) -> &[Point3<f64>] {
        &self.variables
    }

    pub fn constraints(&self) -> &[BondConstraint] {
        &self.constraints
    }

    /// Target length of the bond between `i` and `j`, in either orientation.
    pub fn bond_length(&self, i: usize, j: usize) -> Option<f64> {
        let key = if i <= j { (i, j) } else { (j, i) };
        self.bond_lengths.get(&key).copied()
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// The constrained positions, if the current anchors have been solved.
    pub fn solution(&self) -> Option<&[Point3<f64>]> {
        self.solved.then_some(self.variables.as_slice())
    }

    /// Summed squared displacement of the current variables from the anchors.
    pub fn objective_value(&self) -> f64 {
        self.variables
            .iter()
            .zip(&self.anchors)
            .map(|(p, a)| (p - a).norm_squared())
            .sum()
    }

    /// Largest `|distance - target|` over all bonds at the current variables.
    pub fn max_constraint_violation(&self) -> f64 {
        self.constraints
            .iter()
            .map(|c| ((self.variables[c.i] - self.variables[c.j]).norm() - c.length).abs())
            .fold(0.0, f64::max)
    }

    /// Stores converged solver values and marks the problem solved.
    pub(crate) fn accept_solution(&mut self, values: &DVector<f64>) {
        for (index, position) in self.variables.iter_mut().enumerate() {
            *position = point_at(values, index);
        }
        self.solved = true;
    }
}

impl EqualityConstrainedNlp for OptimizationProblem {
    fn num_variables(&self) -> usize {
        3 * self.num_atoms()
    }

    fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    fn initial_point(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.num_variables(),
            self.variables.iter().flat_map(|p| [p.x, p.y, p.z]),
        )
    }

    fn objective(&self, x: &DVector<f64>) -> f64 {
        self.anchors
            .iter()
            .enumerate()
            .map(|(index, anchor)| (point_at(x, index) - anchor).norm_squared())
            .sum()
    }

    fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut gradient = DVector::zeros(self.num_variables());
        for (index, anchor) in self.anchors.iter().enumerate() {
            let g = (point_at(x, index) - anchor) * 2.0;
            gradient.fixed_rows_mut::<3>(3 * index).copy_from(&g);
        }
        gradient
    }

    fn constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.constraints.len(),
            self.constraints
                .iter()
                .map(|c| separation(x, c).norm_squared() - c.length * c.length),
        )
    }

    fn constraint_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jacobian = DMatrix::zeros(self.constraints.len(), self.num_variables());
        for (row, c) in self.constraints.iter().enumerate() {
            let d = separation(x, c) * 2.0;
            jacobian
                .fixed_view_mut::<1, 3>(row, 3 * c.i)
                .copy_from(&d.transpose());
            jacobian
                .fixed_view_mut::<1, 3>(row, 3 * c.j)
                .copy_from(&(-d).transpose());
        }
        jacobian
    }

    fn lagrangian_hessian(&self, _x: &DVector<f64>, multipliers: &DVector<f64>) -> DMatrix<f64> {
        let n = self.num_variables();
        let mut hessian = DMatrix::from_diagonal_element(n, n, 2.0);
        // Each bond contributes 2*lambda*[I -I; -I I] on its two atom blocks.
        for (c, &lambda) in self.constraints.iter().zip(multipliers.iter()) {
            let w = 2.0 * lambda;
            for axis in 0..3 {
                let (a, b) = (3 * c.i + axis, 3 * c.j + axis);
                hessian[(a, a)] += w;
                hessian[(b, b)] += w;
                hessian[(a, b)] -= w;
                hessian[(b, a)] -= w;
            }
        }
        hessian
    }

    fn constraint_scales(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.constraints.len(),
            self.constraints.iter().map(|c| c.length * c.length),
        )
    }
}

fn point_at(x: &DVector<f64>, index: usize) -> Point3<f64> {
    Point3::new(x[3 * index], x[3 * index + 1], x[3 * index + 2])
}

fn separation(x: &DVector<f64>, c: &BondConstraint) -> Vector3<f64> {
    point_at(x, c.i) - point_at(x, c.j)
}

fn check_finite(positions: &[Point3<f64>]) -> Result<(), ConstraintError> {
    match positions
        .iter()
        .position(|p| !p.coords.iter().all(|v| v.is_finite()))
    {
        Some(index) => Err(ConstraintError::InvalidInput(format!(
            "coordinates of atom {} are not finite numbers",
            index
        ))),
        None => Ok(()),
    }
}

/// Converts `N x 3` rows into points, checking the shape against `expected`.
pub(crate) fn rows_to_points(
    rows: &[Vec<f64>],
    expected: (usize, usize),
) -> Result<Vec<Point3<f64>>, ConstraintError> {
    if let Some(bad) = rows.iter().find(|row| row.len() != 3) {
        return Err(ConstraintError::ShapeMismatch {
            expected,
            found: (rows.len(), bad.len()),
        });
    }
    if rows.len() != expected.0 {
        return Err(ConstraintError::ShapeMismatch {
            expected,
            found: (rows.len(), 3),
        });
    }
    Ok(rows
        .iter()
        .map(|row| Point3::new(row[0], row[1], row[2]))
        .collect())
}
