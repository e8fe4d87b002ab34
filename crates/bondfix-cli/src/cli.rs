use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "BondFix Developers",
    version,
    about = "BondFix CLI - Snap the bond lengths of molecular structures to exact target values with minimal atom displacement.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Constrain every bond of a structure to its target length.
    Constrain(ConstrainArgs),
}

/// Arguments for the `constrain` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConstrainArgs {
    // --- Input/Output ---
    /// Positions table (CSV with header `id,x,y,z`).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub positions: PathBuf,

    /// Constraints table (CSV with header `id_i,id_j,req`).
    #[arg(short = 'b', long, required = true, value_name = "PATH")]
    pub constraints: PathBuf,

    /// Path for the constrained positions table.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Optional solver configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Solver Overrides ---
    /// Override the maximum number of solver iterations.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    /// Override the constraint tolerance (squared-length residual relative to the squared target).
    #[arg(short, long, value_name = "FLOAT")]
    pub tolerance: Option<f64>,

    /// Override the optimality tolerance on the Lagrangian gradient.
    #[arg(long, value_name = "FLOAT")]
    pub optimality_tolerance: Option<f64>,

    /// Solve each molecule separately, reusing one problem per distinct topology.
    #[arg(long)]
    pub per_molecule: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S solver.max-iterations=500
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
