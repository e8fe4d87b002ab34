use super::{EqualityConstrainedNlp, NonlinearSolver, SolverOutcome, TerminationStatus};
use crate::engine::config::SolverConfig;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

const ARMIJO_FRACTION: f64 = 1e-4;
const MAX_REGULARIZATION_ATTEMPTS: usize = 30;
const REGULARIZATION_GROWTH: f64 = 10.0;
const TINY_STEP: f64 = 1e-14;
const MULTIPLIER_SCALE_CAP: f64 = 100.0;
const PENALTY_MARGIN: f64 = 1.0;

/// Lagrange-Newton solver for equality-constrained problems.
///
/// Each iteration solves the KKT system
///
/// ```text
/// [ H + dw*I   J^T     ] [dx]     [ grad f + J^T lambda ]
/// [ J          -dc*I   ] [dl] = - [ c(x)                ]
/// ```
///
/// with a dense LU factorization, shifting `dw`/`dc` away from zero only when
/// the matrix is singular or the step has non-positive curvature. Steps are
/// globalized by backtracking on the l1 merit function
/// `f(x) + nu * |c(x)|_1`. After every accepted step the multipliers are
/// re-estimated by least squares, which keeps `H` from drifting indefinite
/// on damped steps.
///
/// When the line search stalls, or the Newton step vanishes, while the
/// constraints are still violated, the solver enters a restoration phase:
/// minimum-norm Gauss-Newton steps `dx = -J^T (J J^T)^-1 c` backtracked on
/// `|c|_2^2`, until the iterate is feasible again. Newton iteration then
/// resumes with a fresh penalty. Only a stalled restoration is reported as
/// [`TerminationStatus::LocallyInfeasible`].
///
/// The iteration is deterministic: the same problem and starting point always
/// produce the same iterates. Matrices are dense and every iteration factors
/// a `(3N + m)` square KKT matrix, so the cost grows cubically with the atom
/// count. Molecules of a few hundred atoms solve in seconds; systems beyond
/// that should be split into molecules first, as the constrain workflow does.
#[derive(Debug, Clone, Default)]
pub struct NewtonKktSolver {
    config: SolverConfig,
}

struct NewtonStep {
    dx: DVector<f64>,
    dlambda: DVector<f64>,
}

/// How a restoration phase ended, with the iterations it used.
enum Restoration {
    Feasible(usize),
    Stalled(usize),
    OutOfIterations,
}

impl NewtonKktSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    fn solve_kkt(
        &self,
        hessian: &DMatrix<f64>,
        jacobian: &DMatrix<f64>,
        residual: &DVector<f64>,
        constraints: &DVector<f64>,
    ) -> Option<NewtonStep> {
        let n = hessian.nrows();
        let m = jacobian.nrows();

        let mut rhs = DVector::zeros(n + m);
        rhs.rows_mut(0, n).copy_from(&(-residual));
        rhs.rows_mut(n, m).copy_from(&(-constraints));

        let mut delta_w = 0.0;
        let mut delta_c = 0.0;

        for _ in 0..MAX_REGULARIZATION_ATTEMPTS {
            let mut kkt = DMatrix::zeros(n + m, n + m);
            kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
            kkt.view_mut((0, n), (n, m)).copy_from(&jacobian.transpose());
            kkt.view_mut((n, 0), (m, n)).copy_from(jacobian);
            for i in 0..n {
                kkt[(i, i)] += delta_w;
            }
            for i in 0..m {
                kkt[(n + i, n + i)] = -delta_c;
            }

            if let Some(solution) = kkt.lu().solve(&rhs) {
                if solution.iter().all(|v| v.is_finite()) {
                    let dx = solution.rows(0, n).into_owned();
                    let curvature = dx.dot(&(hessian * &dx)) + delta_w * dx.norm_squared();
                    if curvature > 0.0 || dx.norm_squared() == 0.0 {
                        return Some(NewtonStep {
                            dx,
                            dlambda: solution.rows(n, m).into_owned(),
                        });
                    }
                }
            }

            delta_w = if delta_w == 0.0 {
                self.config.initial_regularization
            } else {
                delta_w * REGULARIZATION_GROWTH
            };
            delta_c = self.config.initial_regularization;
            debug!(delta_w, delta_c, "Regularizing KKT matrix.");
        }

        None
    }

    /// Minimum-norm Gauss-Newton step toward `c(x) = 0`.
    ///
    /// `J J^T` is shifted only when it cannot be factored, which happens when a
    /// constraint gradient vanishes.
    fn gauss_newton_step(
        &self,
        jacobian: &DMatrix<f64>,
        constraints: &DVector<f64>,
    ) -> Option<DVector<f64>> {
        let normal = jacobian * jacobian.transpose();
        let mut shift = 0.0;

        for _ in 0..MAX_REGULARIZATION_ATTEMPTS {
            let mut shifted = normal.clone();
            for i in 0..shifted.nrows() {
                shifted[(i, i)] += shift;
            }
            if let Some(factor) = shifted.cholesky() {
                let step = -(jacobian.transpose() * factor.solve(constraints));
                if all_finite(&step) {
                    return Some(step);
                }
            }
            shift = if shift == 0.0 {
                self.config.initial_regularization
            } else {
                shift * REGULARIZATION_GROWTH
            };
        }

        None
    }

    /// Drives `x` back onto the constraint manifold, ignoring the objective.
    fn restore_feasibility(
        &self,
        nlp: &dyn EqualityConstrainedNlp,
        x: &mut DVector<f64>,
        scales: &DVector<f64>,
        budget: usize,
    ) -> Restoration {
        for used in 0..budget {
            let constraints = nlp.constraints(x);
            let violation = scaled_violation(&constraints, scales);
            trace!(used, violation, "Restoration iterate.");
            if violation <= self.config.constraint_tolerance {
                return Restoration::Feasible(used);
            }

            let jacobian = nlp.constraint_jacobian(x);
            let Some(dx) = self.gauss_newton_step(&jacobian, &constraints) else {
                return Restoration::Stalled(used);
            };
            if max_abs(&dx) <= TINY_STEP * (1.0 + max_abs(x)) {
                return Restoration::Stalled(used);
            }

            // Directional derivative of |c|^2 / 2 along dx.
            let slope = constraints.dot(&(&jacobian * &dx));
            if slope >= 0.0 || !slope.is_finite() {
                return Restoration::Stalled(used);
            }

            let current = 0.5 * constraints.norm_squared();
            let mut alpha = 1.0;
            let mut accepted = false;
            for _ in 0..self.config.max_line_search_steps {
                let trial = &*x + &dx * alpha;
                let reduced = 0.5 * nlp.constraints(&trial).norm_squared();
                if reduced <= current + ARMIJO_FRACTION * alpha * slope {
                    accepted = true;
                    break;
                }
                alpha *= 0.5;
            }
            if !accepted {
                return Restoration::Stalled(used);
            }

            *x += &dx * alpha;
            if !all_finite(x) {
                return Restoration::Stalled(used + 1);
            }
        }

        if scaled_violation(&nlp.constraints(x), scales) <= self.config.constraint_tolerance {
            Restoration::Feasible(budget)
        } else {
            Restoration::OutOfIterations
        }
    }

    /// Backtracks from a full step until the l1 merit function decreases
    /// sufficiently. Returns the accepted step length.
    fn line_search(
        &self,
        nlp: &dyn EqualityConstrainedNlp,
        x: &DVector<f64>,
        dx: &DVector<f64>,
        gradient: &DVector<f64>,
        constraints: &DVector<f64>,
        penalty: f64,
    ) -> Option<f64> {
        let merit = |point: &DVector<f64>| {
            nlp.objective(point) + penalty * nlp.constraints(point).lp_norm(1)
        };
        let slope = gradient.dot(dx) - penalty * constraints.lp_norm(1);
        if slope >= 0.0 {
            return Some(1.0);
        }

        let current_merit = merit(x);
        let mut alpha = 1.0;
        for _ in 0..self.config.max_line_search_steps {
            let trial = x + dx * alpha;
            if merit(&trial) <= current_merit + ARMIJO_FRACTION * alpha * slope {
                return Some(alpha);
            }
            alpha *= 0.5;
        }
        None
    }

    fn finish(
        &self,
        nlp: &dyn EqualityConstrainedNlp,
        x: DVector<f64>,
        status: TerminationStatus,
        iterations: usize,
    ) -> SolverOutcome {
        let objective = nlp.objective(&x);
        let constraint_violation = scaled_violation(&nlp.constraints(&x), &nlp.constraint_scales());
        debug!(
            %status,
            iterations,
            objective,
            constraint_violation,
            "Newton-KKT solver finished."
        );
        SolverOutcome {
            status,
            values: x,
            iterations,
            objective,
            constraint_violation,
        }
    }
}

impl NonlinearSolver for NewtonKktSolver {
    fn minimize(&self, nlp: &dyn EqualityConstrainedNlp) -> SolverOutcome {
        let scales = nlp.constraint_scales();
        let tolerance = &self.config;
        let max_iterations = self.config.max_iterations;

        let mut x = nlp.initial_point();
        let mut lambda = least_squares_multipliers(nlp, &x)
            .unwrap_or_else(|| DVector::zeros(nlp.num_constraints()));
        let mut penalty: f64 = 0.0;
        let mut iteration = 0;

        while iteration < max_iterations {
            let gradient = nlp.objective_gradient(&x);
            let constraints = nlp.constraints(&x);
            let jacobian = nlp.constraint_jacobian(&x);
            let residual = &gradient + jacobian.transpose() * &lambda;

            if !all_finite(&x) || !all_finite(&residual) || !all_finite(&constraints) {
                return self.finish(nlp, x, TerminationStatus::NumericalFailure, iteration);
            }

            let violation = scaled_violation(&constraints, &scales);
            let stationarity = max_abs(&residual) / multiplier_scale(&lambda);
            trace!(iteration, violation, stationarity, "Newton iterate.");

            if violation <= tolerance.constraint_tolerance
                && stationarity <= tolerance.optimality_tolerance
            {
                return self.finish(nlp, x, TerminationStatus::Optimal, iteration);
            }

            let hessian = nlp.lagrangian_hessian(&x, &lambda);
            let Some(step) = self.solve_kkt(&hessian, &jacobian, &residual, &constraints) else {
                return self.finish(nlp, x, TerminationStatus::NumericalFailure, iteration);
            };

            let stalled = if max_abs(&step.dx) <= TINY_STEP * (1.0 + max_abs(&x)) {
                if violation <= tolerance.constraint_tolerance {
                    return self.finish(nlp, x, TerminationStatus::Optimal, iteration);
                }
                true
            } else {
                let trial_lambda = &lambda + &step.dlambda;
                penalty = penalty.max(max_abs(&trial_lambda) + PENALTY_MARGIN);
                match self.line_search(nlp, &x, &step.dx, &gradient, &constraints, penalty) {
                    Some(alpha) => {
                        x += &step.dx * alpha;
                        lambda = least_squares_multipliers(nlp, &x)
                            .unwrap_or_else(|| &lambda + &step.dlambda * alpha);
                        iteration += 1;
                        false
                    }
                    None if violation <= tolerance.constraint_tolerance => {
                        debug!(iteration, "Line search failed at a feasible point.");
                        let status = if stationarity <= tolerance.optimality_tolerance.sqrt() {
                            TerminationStatus::Optimal
                        } else {
                            TerminationStatus::NumericalFailure
                        };
                        return self.finish(nlp, x, status, iteration);
                    }
                    None => true,
                }
            };

            if stalled {
                debug!(iteration, violation, "Newton step stalled; restoring feasibility.");
                match self.restore_feasibility(nlp, &mut x, &scales, max_iterations - iteration) {
                    Restoration::Feasible(used) => {
                        iteration += used;
                        penalty = 0.0;
                        lambda = least_squares_multipliers(nlp, &x)
                            .unwrap_or_else(|| DVector::zeros(nlp.num_constraints()));
                        debug!(iteration, "Feasibility restored.");
                    }
                    Restoration::Stalled(used) => {
                        return self.finish(
                            nlp,
                            x,
                            TerminationStatus::LocallyInfeasible,
                            iteration + used,
                        );
                    }
                    Restoration::OutOfIterations => break,
                }
            }
        }

        self.finish(nlp, x, TerminationStatus::MaxIterationsExceeded, max_iterations)
    }
}

/// Least-squares multiplier estimate: `argmin |grad f + J^T lambda|`.
///
/// `None` when the constraint gradients are linearly dependent.
fn least_squares_multipliers(
    nlp: &dyn EqualityConstrainedNlp,
    x: &DVector<f64>,
) -> Option<DVector<f64>> {
    let jacobian = nlp.constraint_jacobian(x);
    let gradient = nlp.objective_gradient(x);
    let normal = &jacobian * jacobian.transpose();
    normal
        .lu()
        .solve(&(-(&jacobian * &gradient)))
        .filter(all_finite)
}

fn scaled_violation(constraints: &DVector<f64>, scales: &DVector<f64>) -> f64 {
    constraints
        .iter()
        .zip(scales.iter())
        .map(|(c, s)| c.abs() / s.abs().max(f64::MIN_POSITIVE))
        .fold(0.0, f64::max)
}

fn multiplier_scale(lambda: &DVector<f64>) -> f64 {
    if lambda.is_empty() {
        return 1.0;
    }
    let mean = lambda.lp_norm(1) / lambda.len() as f64;
    (mean / MULTIPLIER_SCALE_CAP).max(1.0)
}

fn max_abs(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc, e| acc.max(e.abs()))
}

fn all_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|e| e.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// minimize |x - anchor|^2 subject to |x|^2 = radius^2, in two dimensions.
    struct CircleProjection {
        anchor: [f64; 2],
        radius: f64,
    }

    impl EqualityConstrainedNlp for CircleProjection {
        fn num_variables(&self) -> usize {
            2
        }
        fn num_constraints(&self) -> usize {
            1
        }
        fn initial_point(&self) -> DVector<f64> {
            DVector::from_column_slice(&self.anchor)
        }
        fn objective(&self, x: &DVector<f64>) -> f64 {
            (x[0] - self.anchor[0]).powi(2) + (x[1] - self.anchor[1]).powi(2)
        }
        fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![
                2.0 * (x[0] - self.anchor[0]),
                2.0 * (x[1] - self.anchor[1]),
            ])
        }
        fn constraints(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_element(1, x[0] * x[0] + x[1] * x[1] - self.radius * self.radius)
        }
        fn constraint_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(1, 2, &[2.0 * x[0], 2.0 * x[1]])
        }
        fn lagrangian_hessian(&self, _x: &DVector<f64>, multipliers: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::identity(2, 2) * (2.0 + 2.0 * multipliers[0])
        }
    }

    /// minimize x^2 subject to x^2 + 1 = 0, which has no real solution.
    struct Unsatisfiable;

    impl EqualityConstrainedNlp for Unsatisfiable {
        fn num_variables(&self) -> usize {
            1
        }
        fn num_constraints(&self) -> usize {
            1
        }
        fn initial_point(&self) -> DVector<f64> {
            DVector::zeros(1)
        }
        fn objective(&self, x: &DVector<f64>) -> f64 {
            x[0] * x[0]
        }
        fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_element(1, 2.0 * x[0])
        }
        fn constraints(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_element(1, x[0] * x[0] + 1.0)
        }
        fn constraint_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_element(1, 1, 2.0 * x[0])
        }
        fn lagrangian_hessian(&self, _x: &DVector<f64>, multipliers: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_element(1, 1, 2.0 + 2.0 * multipliers[0])
        }
    }

    #[test]
    fn projects_outside_point_onto_circle() {
        let nlp = CircleProjection {
            anchor: [2.0, 0.0],
            radius: 1.0,
        };
        let outcome = NewtonKktSolver::default().minimize(&nlp);
        assert_eq!(outcome.status, TerminationStatus::Optimal);
        assert!((outcome.values[0] - 1.0).abs() < 1e-8);
        assert!(outcome.values[1].abs() < 1e-8);
        assert!((outcome.objective - 1.0).abs() < 1e-8);
        assert!(outcome.constraint_violation <= 1e-10);
    }

    #[test]
    fn projects_inside_point_onto_circle() {
        let nlp = CircleProjection {
            anchor: [0.3, 0.4],
            radius: 2.0,
        };
        let outcome = NewtonKktSolver::default().minimize(&nlp);
        assert_eq!(outcome.status, TerminationStatus::Optimal);
        assert!((outcome.values[0] - 1.2).abs() < 1e-8);
        assert!((outcome.values[1] - 1.6).abs() < 1e-8);
    }

    #[test]
    fn feasible_start_terminates_immediately() {
        let nlp = CircleProjection {
            anchor: [0.0, 1.0],
            radius: 1.0,
        };
        let outcome = NewtonKktSolver::default().minimize(&nlp);
        assert_eq!(outcome.status, TerminationStatus::Optimal);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.values, DVector::from_vec(vec![0.0, 1.0]));
    }

    #[test]
    fn unsatisfiable_constraint_is_reported_infeasible() {
        let outcome = NewtonKktSolver::default().minimize(&Unsatisfiable);
        assert_eq!(outcome.status, TerminationStatus::LocallyInfeasible);
    }

    #[test]
    fn iteration_limit_is_reported() {
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let nlp = CircleProjection {
            anchor: [2.0, 0.0],
            radius: 1.0,
        };
        let outcome = NewtonKktSolver::new(config).minimize(&nlp);
        assert_eq!(outcome.status, TerminationStatus::MaxIterationsExceeded);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn repeated_runs_are_bitwise_identical() {
        let nlp = CircleProjection {
            anchor: [3.0, -1.0],
            radius: 1.5,
        };
        let solver = NewtonKktSolver::default();
        let first = solver.minimize(&nlp);
        let second = solver.minimize(&nlp);
        assert_eq!(first.values, second.values);
        assert_eq!(first.iterations, second.iterations);
    }

    #[test]
    fn restoration_projects_onto_the_constraint() {
        let nlp = CircleProjection {
            anchor: [3.0, 4.0],
            radius: 1.0,
        };
        let solver = NewtonKktSolver::default();
        let mut x = nlp.initial_point();

        let restored = solver.restore_feasibility(&nlp, &mut x, &nlp.constraint_scales(), 50);
        assert!(matches!(restored, Restoration::Feasible(used) if used > 0));
        assert!((x.norm() - 1.0).abs() < 1e-9);
        // Gauss-Newton steps on |x|^2 keep the direction of x.
        assert!((x[0] / x[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn restoration_stalls_on_vanishing_constraint_gradient() {
        let solver = NewtonKktSolver::default();
        let mut x = Unsatisfiable.initial_point();
        let scales = DVector::from_element(1, 1.0);

        let restored = solver.restore_feasibility(&Unsatisfiable, &mut x, &scales, 50);
        assert!(matches!(restored, Restoration::Stalled(0)));
        assert_eq!(x[0], 0.0);
    }

    #[test]
    fn restoration_reports_an_exhausted_budget() {
        let nlp = CircleProjection {
            anchor: [300.0, 400.0],
            radius: 1.0,
        };
        let solver = NewtonKktSolver::default();
        let mut x = nlp.initial_point();

        let restored = solver.restore_feasibility(&nlp, &mut x, &nlp.constraint_scales(), 2);
        assert!(matches!(restored, Restoration::OutOfIterations));
    }
}
