use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Settings for the bundled Newton-KKT solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Maximum number of Newton iterations before giving up.
    pub max_iterations: usize,
    /// Tolerance on the scaled stationarity residual of the Lagrangian.
    pub optimality_tolerance: f64,
    /// Tolerance on the largest squared-length constraint residual, relative
    /// to the squared target length.
    pub constraint_tolerance: f64,
    /// Maximum number of step halvings in the backtracking line search.
    pub max_line_search_steps: usize,
    /// First diagonal shift tried when the KKT matrix is singular.
    pub initial_regularization: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3000,
            optimality_tolerance: 1e-8,
            constraint_tolerance: 1e-10,
            max_line_search_steps: 40,
            initial_regularization: 1e-8,
        }
    }
}

#[derive(Default)]
pub struct SolverConfigBuilder {
    max_iterations: Option<usize>,
    optimality_tolerance: Option<f64>,
    constraint_tolerance: Option<f64>,
    max_line_search_steps: Option<usize>,
    initial_regularization: Option<f64>,
}

impl SolverConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn optimality_tolerance(mut self, tolerance: f64) -> Self {
        self.optimality_tolerance = Some(tolerance);
        self
    }
    pub fn constraint_tolerance(mut self, tolerance: f64) -> Self {
        self.constraint_tolerance = Some(tolerance);
        self
    }
    pub fn max_line_search_steps(mut self, steps: usize) -> Self {
        self.max_line_search_steps = Some(steps);
        self
    }
    pub fn initial_regularization(mut self, shift: f64) -> Self {
        self.initial_regularization = Some(shift);
        self
    }

    /// Builds the configuration, filling unset values from
    /// [`SolverConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if an iteration count is zero
    /// or a tolerance or regularization shift is not a positive finite number.
    pub fn build(self) -> Result<SolverConfig, ConfigError> {
        let defaults = SolverConfig::default();
        let config = SolverConfig {
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            optimality_tolerance: self
                .optimality_tolerance
                .unwrap_or(defaults.optimality_tolerance),
            constraint_tolerance: self
                .constraint_tolerance
                .unwrap_or(defaults.constraint_tolerance),
            max_line_search_steps: self
                .max_line_search_steps
                .unwrap_or(defaults.max_line_search_steps),
            initial_regularization: self
                .initial_regularization
                .unwrap_or(defaults.initial_regularization),
        };

        if config.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.max_line_search_steps == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_line_search_steps",
                reason: "must be at least 1".to_string(),
            });
        }
        check_positive("optimality_tolerance", config.optimality_tolerance)?;
        check_positive("constraint_tolerance", config.constraint_tolerance)?;
        check_positive("initial_regularization", config.initial_regularization)?;

        Ok(config)
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be a positive finite number, got {}", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_yields_defaults() {
        assert_eq!(SolverConfigBuilder::new().build().unwrap(), SolverConfig::default());
    }

    #[test]
    fn builder_overrides_selected_values() {
        let config = SolverConfigBuilder::new()
            .max_iterations(50)
            .optimality_tolerance(1e-6)
            .build()
            .unwrap();
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.optimality_tolerance, 1e-6);
        assert_eq!(config.constraint_tolerance, SolverConfig::default().constraint_tolerance);
    }

    #[test]
    fn builder_rejects_zero_iterations() {
        let result = SolverConfigBuilder::new().max_iterations(0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "max_iterations",
                ..
            })
        ));
    }

    #[test]
    fn builder_rejects_non_positive_or_nan_tolerances() {
        assert!(
            SolverConfigBuilder::new()
                .constraint_tolerance(0.0)
                .build()
                .is_err()
        );
        assert!(
            SolverConfigBuilder::new()
                .optimality_tolerance(f64::NAN)
                .build()
                .is_err()
        );
        assert!(
            SolverConfigBuilder::new()
                .initial_regularization(-1.0)
                .build()
                .is_err()
        );
    }
}
