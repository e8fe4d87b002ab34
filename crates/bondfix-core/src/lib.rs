//! # BondFix Core Library
//!
//! Snaps the bond lengths of a molecule to exact target values while moving
//! every atom as little as possible from its input position.
//!
//! Each bonded pair `(i, j)` with target length `L` becomes the equality
//! `|p_i - p_j|^2 = L^2`, and the objective is the summed squared displacement
//! of all atoms from their starting positions. The resulting problem is built
//! once per topology and re-solved for as many geometries as needed.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`MolecularSystem`,
//!   `Atom`, `Bond`), CSV table I/O and geometry helpers.
//!
//! - **[`engine`]: The Logic Core.** The optimization problem, the solver seam
//!   with its bundled Newton-KKT backend, the solve driver and the
//!   `ConstrainedMolecule` orchestrator.
//!
//! - **[`workflows`]: The Public API.** Complete procedures such as constraining
//!   every molecule of a multi-molecule system, reusing one problem per
//!   distinct topology.

pub mod core;
pub mod engine;
pub mod workflows;
