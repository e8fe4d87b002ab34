use nalgebra::Point3;

/// Represents an atom in a molecular structure.
///
/// Atoms carry no identifier of their own: their index inside the owning
/// [`MolecularSystem`](super::system::MolecularSystem) is their identity, and
/// that index is what bonds and coordinate arrays refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom (e.g., "C1", "OW").
    pub name: String,
    /// The name of the residue or molecule this atom belongs to (e.g., "DEE").
    pub residue_name: String,
    /// The residue sequence number.
    pub residue_number: isize,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
}

impl Atom {
    /// Creates a new `Atom` with an unnamed residue.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the atom.
    /// * `position` - The 3D coordinates of the atom.
    pub fn new(name: &str, position: Point3<f64>) -> Self {
        Self {
            name: name.to_string(),
            residue_name: String::new(),
            residue_number: 0,
            position,
        }
    }

    /// Returns the atom with its residue name and number set.
    pub fn with_residue(mut self, residue_name: &str, residue_number: isize) -> Self {
        self.residue_name = residue_name.to_string();
        self.residue_number = residue_number;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_has_expected_default_fields() {
        let atom = Atom::new("C1", Point3::new(1.0, 2.0, 3.0));

        assert_eq!(atom.name, "C1");
        assert_eq!(atom.position, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(atom.residue_name, "");
        assert_eq!(atom.residue_number, 0);
    }

    #[test]
    fn with_residue_sets_residue_fields() {
        let atom = Atom::new("O1", Point3::origin()).with_residue("DEE", 7);
        assert_eq!(atom.residue_name, "DEE");
        assert_eq!(atom.residue_number, 7);
    }

    #[test]
    fn atom_equality_and_clone_works() {
        let atom1 = Atom::new("N", Point3::new(0.0, 0.0, 0.0)).with_residue("RES", 1);
        let atom2 = atom1.clone();
        assert_eq!(atom1, atom2);
    }
}
