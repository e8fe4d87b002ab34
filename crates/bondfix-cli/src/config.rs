use crate::cli::ConstrainArgs;
use crate::error::{CliError, Result};
use bondfix::engine::config as core_config;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSolverConfig {
    max_iterations: Option<usize>,
    optimality_tolerance: Option<f64>,
    constraint_tolerance: Option<f64>,
    max_line_search_steps: Option<usize>,
    initial_regularization: Option<f64>,
}

/// The contents of a `--config` file. Every key is optional:
///
/// ```toml
/// [solver]
/// max-iterations = 500
/// constraint-tolerance = 1e-10
/// ```
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConstrainConfig {
    solver: Option<PartialSolverConfig>,
}

impl PartialConstrainConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Builds the solver configuration. Precedence, highest first: dedicated
    /// CLI flags, `--set` values, the config file, library defaults.
    pub fn merge_with_cli(mut self, args: &ConstrainArgs) -> Result<core_config::SolverConfig> {
        self.apply_set_values(&args.set_values)?;
        let solver = self.solver.take().unwrap_or_default();

        let mut builder = core_config::SolverConfigBuilder::new();
        if let Some(v) = args.max_iterations.or(solver.max_iterations) {
            builder = builder.max_iterations(v);
        }
        if let Some(v) = args.optimality_tolerance.or(solver.optimality_tolerance) {
            builder = builder.optimality_tolerance(v);
        }
        if let Some(v) = args.tolerance.or(solver.constraint_tolerance) {
            builder = builder.constraint_tolerance(v);
        }
        if let Some(v) = solver.max_line_search_steps {
            builder = builder.max_line_search_steps(v);
        }
        if let Some(v) = solver.initial_regularization {
            builder = builder.initial_regularization(v);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            let solver = self.solver.get_or_insert_with(Default::default);
            match key {
                "solver.max-iterations" => {
                    solver.max_iterations = Some(parse_value(key, value_str)?);
                }
                "solver.optimality-tolerance" => {
                    solver.optimality_tolerance = Some(parse_value(key, value_str)?);
                }
                "solver.constraint-tolerance" => {
                    solver.constraint_tolerance = Some(parse_value(key, value_str)?);
                }
                "solver.max-line-search-steps" => {
                    solver.max_line_search_steps = Some(parse_value(key, value_str)?);
                }
                "solver.initial-regularization" => {
                    solver.initial_regularization = Some(parse_value(key, value_str)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}
