//! # Core Models Module
//!
//! Data structures used to describe the molecules whose bond lengths are
//! constrained.
//!
//! ## Key Components
//!
//! - [`atom`] - Individual atom with name, residue label and coordinates
//! - [`topology`] - Bonds between atoms and their force-field parameters
//! - [`system`] - Ordered atoms plus bonds, with connectivity queries
//!
//! ## Usage
//!
//! ```ignore
//! use bondfix::core::models::{atom::Atom, system::MolecularSystem, topology::BondType};
//! use nalgebra::Point3;
//!
//! let mut system = MolecularSystem::new();
//! let c1 = system.add_atom(Atom::new("C1", Point3::new(0.0, 0.0, 0.0)));
//! let c2 = system.add_atom(Atom::new("C2", Point3::new(1.4, 0.0, 0.0)));
//! system.add_bond(c1, c2, Some(BondType::new(268.0, 1.529)));
//! ```

pub mod atom;
pub mod system;
pub mod topology;
