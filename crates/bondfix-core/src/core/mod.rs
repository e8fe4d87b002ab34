//! # Core Module
//!
//! Stateless building blocks shared by the rest of the library.
//!
//! - **Molecular Representation** ([`models`]) - Atoms, bonds and systems
//! - **File I/O** ([`io`]) - Position and constraint tables
//! - **Geometry** ([`utils`]) - Distances, displacement and RMSD helpers

pub mod io;
pub mod models;
pub mod utils;
