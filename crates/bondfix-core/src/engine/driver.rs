use super::error::ConstraintError;
use super::problem::OptimizationProblem;
use super::solver::{EqualityConstrainedNlp, NonlinearSolver, TerminationStatus};
use tracing::debug;

/// Statistics of a successful solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveSummary {
    pub iterations: usize,
    /// Summed squared displacement from the anchors at the solution.
    pub objective: f64,
    /// Largest `|distance - target|` over all bonds at the solution.
    pub max_bond_deviation: f64,
}

/// Runs `solver` on `problem` and stores the result on success.
///
/// Only a [`TerminationStatus::Optimal`] outcome is accepted. Any other
/// status is reported as [`ConstraintError::Convergence`] and the problem's
/// variables and solved flag are left exactly as they were.
pub fn solve_problem(
    problem: &mut OptimizationProblem,
    solver: &dyn NonlinearSolver,
) -> Result<SolveSummary, ConstraintError> {
    debug!(
        atoms = problem.num_atoms(),
        bonds = problem.num_constraints(),
        "Solving bond-length constraints."
    );

    let outcome = solver.minimize(&*problem);

    if !outcome.status.is_optimal() {
        debug!(
            status = %outcome.status,
            iterations = outcome.iterations,
            "Constraint solve did not converge."
        );
        return Err(ConstraintError::Convergence {
            status: outcome.status,
            iterations: outcome.iterations,
        });
    }

    if outcome.values.len() != problem.num_variables() {
        debug!(
            values = outcome.values.len(),
            variables = problem.num_variables(),
            "Solver returned a solution of the wrong size."
        );
        return Err(ConstraintError::Convergence {
            status: TerminationStatus::NumericalFailure,
            iterations: outcome.iterations,
        });
    }

    problem.accept_solution(&outcome.values);

    let summary = SolveSummary {
        iterations: outcome.iterations,
        objective: problem.objective_value(),
        max_bond_deviation: problem.max_constraint_violation(),
    };
    debug!(
        iterations = summary.iterations,
        objective = summary.objective,
        max_bond_deviation = summary.max_bond_deviation,
        "Constraint solve converged."
    );
    Ok(summary)
}
