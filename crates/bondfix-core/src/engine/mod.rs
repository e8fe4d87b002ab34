//! # Engine Module
//!
//! The stateful layer that turns a molecule into a bond-length constrained
//! optimization problem and solves it.
//!
//! ## Overview
//!
//! A molecule's topology is compiled once into an [`problem::OptimizationProblem`]:
//! anchors, variables, and one squared-distance equality per bonded pair. The
//! problem is handed to a [`solver::NonlinearSolver`] through the
//! [`driver`], which only accepts an optimal termination. The
//! [`molecule::ConstrainedMolecule`] ties the two together into the
//! `update -> solve -> read` cycle used to re-solve many geometries of the
//! same molecule without rebuilding anything.
//!
//! ## Architecture
//!
//! - **Problem Builder** ([`problem`]) - Validation, anchors, bond table and derivatives
//! - **Solvers** ([`solver`]) - The solver seam and the bundled Newton-KKT backend
//! - **Solver Driver** ([`driver`]) - Runs a solver and commits only optimal results
//! - **Orchestration** ([`molecule`]) - Per-molecule lifecycle and coordinate access
//! - **Configuration** ([`config`]) - Solver limits and tolerances
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine error types

pub mod config;
pub mod driver;
pub mod error;
pub mod molecule;
pub mod problem;
pub mod progress;
pub mod solver;
