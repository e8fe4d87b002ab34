//! Provides input/output for the tabular molecule description.
//!
//! A molecule is exchanged as two CSV tables: atom positions and bond length
//! constraints. The surrounding tooling that generates structures and assigns
//! force-field parameters writes these tables; this module turns them into a
//! [`MolecularSystem`](crate::core::models::system::MolecularSystem) and back.

pub mod tables;
