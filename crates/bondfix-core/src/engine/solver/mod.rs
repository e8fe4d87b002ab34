//! # Solver Module
//!
//! The seam between the optimization problem and the numerical method that
//! solves it.
//!
//! A problem describes itself through [`EqualityConstrainedNlp`]: a smooth
//! objective, a vector of equality constraints `c(x) = 0`, and their first and
//! second derivatives over a flat variable vector. A [`NonlinearSolver`]
//! consumes that description and reports a [`TerminationStatus`] together
//! with the final variable values. Backends are interchangeable; the problem
//! builder never depends on a particular one.

mod newton;

pub use newton::NewtonKktSolver;

use nalgebra::{DMatrix, DVector};
use std::fmt;

/// A nonlinear program with equality constraints only:
/// minimize `f(x)` subject to `c(x) = 0`.
pub trait EqualityConstrainedNlp {
    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    /// The starting point of the iteration.
    fn initial_point(&self) -> DVector<f64>;

    fn objective(&self, x: &DVector<f64>) -> f64;

    fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Constraint residuals `c(x)`, one entry per constraint.
    fn constraints(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of `c`, shaped `num_constraints x num_variables`.
    fn constraint_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Hessian of the Lagrangian `f(x) + sum_k lambda_k c_k(x)`.
    fn lagrangian_hessian(&self, x: &DVector<f64>, multipliers: &DVector<f64>) -> DMatrix<f64>;

    /// Scale used to judge each constraint residual, e.g. its target magnitude.
    ///
    /// Defaults to `1.0` for every constraint.
    fn constraint_scales(&self) -> DVector<f64> {
        DVector::from_element(self.num_constraints(), 1.0)
    }
}

/// The solver's own classification of how an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationStatus {
    /// Converged to a feasible, locally optimal point.
    Optimal,
    /// Hit the iteration limit before converging.
    MaxIterationsExceeded,
    /// Stopped making progress while the constraints were still violated.
    LocallyInfeasible,
    /// Produced non-finite values or could not factor the step equations.
    NumericalFailure,
}

impl TerminationStatus {
    pub fn is_optimal(self) -> bool {
        self == Self::Optimal
    }
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Optimal => "optimal",
                Self::MaxIterationsExceeded => "maxIterations",
                Self::LocallyInfeasible => "infeasible",
                Self::NumericalFailure => "numericalFailure",
            }
        )
    }
}

/// Result of one [`NonlinearSolver::minimize`] call.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub status: TerminationStatus,
    /// Variable values at termination. Only meaningful when `status` is optimal.
    pub values: DVector<f64>,
    pub iterations: usize,
    pub objective: f64,
    /// Largest scaled constraint residual at termination.
    pub constraint_violation: f64,
}

/// A numerical method for [`EqualityConstrainedNlp`] problems.
///
/// Implementations must not keep state between calls: every resource a solve
/// needs is acquired and released inside `minimize`.
pub trait NonlinearSolver: Send + Sync {
    fn minimize(&self, nlp: &dyn EqualityConstrainedNlp) -> SolverOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_optimal_counts_as_success() {
        assert!(TerminationStatus::Optimal.is_optimal());
        assert!(!TerminationStatus::MaxIterationsExceeded.is_optimal());
        assert!(!TerminationStatus::LocallyInfeasible.is_optimal());
        assert!(!TerminationStatus::NumericalFailure.is_optimal());
    }

    #[test]
    fn status_display_outputs_expected_strings() {
        assert_eq!(TerminationStatus::Optimal.to_string(), "optimal");
        assert_eq!(TerminationStatus::LocallyInfeasible.to_string(), "infeasible");
        assert_eq!(
            TerminationStatus::MaxIterationsExceeded.to_string(),
            "maxIterations"
        );
    }
}
