use crate::core::models::atom::Atom;
use crate::core::models::system::MolecularSystem;
use crate::core::models::topology::BondType;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// One row of a positions table (`id,x,y,z[,name,residue,residue_number]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub residue: Option<String>,
    #[serde(default)]
    pub residue_number: Option<isize>,
}

/// One row of a constraints table (`id_i,id_j,req`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub id_i: usize,
    pub id_j: usize,
    pub req: f64,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Inconsistent {table} table at row {row}: {message}")]
    Inconsistent {
        table: &'static str,
        row: usize,
        message: String,
    },
}

/// Reads and writes the pair of CSV tables describing a constrained molecule:
/// one row per atom with its coordinates, one row per bond with its target
/// length.
///
/// Extra columns are ignored when reading, so tables carrying an unnamed
/// leading index column are accepted as-is.
pub struct TableFile;

impl TableFile {
    /// Builds a system from a positions table and a constraints table.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Inconsistent`] if position ids do not run
    /// `0..N` in order, or if a constraint references an unknown atom, bonds
    /// an atom to itself, or contradicts an earlier row for the same pair.
    pub fn read_system(
        positions: impl Read,
        constraints: impl Read,
    ) -> Result<MolecularSystem, TableError> {
        let mut system = MolecularSystem::new();

        let mut reader = csv::Reader::from_reader(positions);
        for (row, result) in reader.deserialize::<PositionRecord>().enumerate() {
            let record = result?;
            if record.id != row {
                return Err(TableError::Inconsistent {
                    table: "positions",
                    row: row + 1,
                    message: format!("expected id {} but found {}", row, record.id),
                });
            }
            let name = record.name.unwrap_or_default();
            let atom = Atom::new(&name, Point3::new(record.x, record.y, record.z)).with_residue(
                record.residue.as_deref().unwrap_or_default(),
                record.residue_number.unwrap_or_default(),
            );
            system.add_atom(atom);
        }

        let mut reader = csv::Reader::from_reader(constraints);
        for (row, result) in reader.deserialize::<ConstraintRecord>().enumerate() {
            let record = result?;
            // Tables carry no force constant.
            let bond_type = BondType::new(0.0, record.req);
            system
                .add_bond(record.id_i, record.id_j, Some(bond_type))
                .ok_or_else(|| TableError::Inconsistent {
                    table: "constraints",
                    row: row + 1,
                    message: format!(
                        "cannot bond atoms {} and {} (unknown atom, self-bond or conflicting duplicate)",
                        record.id_i, record.id_j
                    ),
                })?;
        }

        Ok(system)
    }

    pub fn read_system_from_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        positions: P,
        constraints: Q,
    ) -> Result<MolecularSystem, TableError> {
        let positions = BufReader::new(File::open(positions)?);
        let constraints = BufReader::new(File::open(constraints)?);
        Self::read_system(positions, constraints)
    }

    pub fn write_positions(system: &MolecularSystem, writer: impl Write) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_writer(writer);
        for (id, atom) in system.atoms().iter().enumerate() {
            writer.serialize(PositionRecord {
                id,
                x: atom.position.x,
                y: atom.position.y,
                z: atom.position.z,
                name: Some(atom.name.clone()),
                residue: Some(atom.residue_name.clone()),
                residue_number: Some(atom.residue_number),
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes one row per bond.
    ///
    /// # Errors
    ///
    /// Fails with [`TableError::Inconsistent`] on the first bond that has no
    /// equilibrium length, since such a bond cannot be expressed as a row.
    pub fn write_constraints(
        system: &MolecularSystem,
        writer: impl Write,
    ) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_writer(writer);
        for (row, bond) in system.bonds().iter().enumerate() {
            let req = bond
                .equilibrium_length()
                .ok_or_else(|| TableError::Inconsistent {
                    table: "constraints",
                    row: row + 1,
                    message: format!(
                        "bond {}-{} has no equilibrium length",
                        bond.atom1, bond.atom2
                    ),
                })?;
            writer.serialize(ConstraintRecord {
                id_i: bond.atom1,
                id_j: bond.atom2,
                req,
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_positions_to_path<P: AsRef<Path>>(
        system: &MolecularSystem,
        path: P,
    ) -> Result<(), TableError> {
        let file = File::create(path)?;
        Self::write_positions(system, BufWriter::new(file))
    }

    pub fn write_constraints_to_path<P: AsRef<Path>>(
        system: &MolecularSystem,
        path: P,
    ) -> Result<(), TableError> {
        let file = File::create(path)?;
        Self::write_constraints(system, BufWriter::new(file))
    }
}
