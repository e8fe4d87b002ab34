use thiserror::Error;

use super::config::ConfigError;
use super::solver::TerminationStatus;

#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Topology contains no bonds; there is nothing to constrain")]
    EmptyTopology,

    #[error(
        "Coordinate shape {found:?} does not match the {expected:?} shape the problem was built with"
    )]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Solver terminated with status '{status}' after {iterations} iterations")]
    Convergence {
        status: TerminationStatus,
        iterations: usize,
    },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid solver configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
}
