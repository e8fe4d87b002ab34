use serde::{Deserialize, Serialize};

/// Harmonic bond parameters attached to a bond by a force field.
///
/// Only the equilibrium length is used for constraining geometries; the force
/// constant is carried so that parameterized structures round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BondType {
    /// Force constant in kcal/mol/A^2.
    pub k: f64,
    /// Equilibrium bond length in Angstroms.
    pub req: f64,
}

impl BondType {
    pub fn new(k: f64, req: f64) -> Self {
        Self { k, req }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bond {
    pub atom1: usize,                // index of the first atom
    pub atom2: usize,                // index of the second atom
    pub bond_type: Option<BondType>, // parameters, if the structure was parameterized
}

impl Bond {
    pub fn new(atom1: usize, atom2: usize, bond_type: Option<BondType>) -> Self {
        Self {
            atom1,
            atom2,
            bond_type,
        }
    }

    /// The atom indices ordered so that the smaller index comes first.
    pub fn sorted_pair(&self) -> (usize, usize) {
        if self.atom1 <= self.atom2 {
            (self.atom1, self.atom2)
        } else {
            (self.atom2, self.atom1)
        }
    }

    /// Target length of this bond, if it carries parameters.
    pub fn equilibrium_length(&self) -> Option<f64> {
        self.bond_type.map(|t| t.req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bond_new_initializes_fields_correctly() {
        let bond = Bond::new(1, 2, Some(BondType::new(300.0, 1.53)));
        assert_eq!(bond.atom1, 1);
        assert_eq!(bond.atom2, 2);
        assert_eq!(bond.bond_type, Some(BondType { k: 300.0, req: 1.53 }));
    }

    #[test]
    fn sorted_pair_orders_indices() {
        assert_eq!(Bond::new(5, 2, None).sorted_pair(), (2, 5));
        assert_eq!(Bond::new(2, 5, None).sorted_pair(), (2, 5));
    }

    #[test]
    fn equilibrium_length_is_none_without_parameters() {
        assert_eq!(Bond::new(0, 1, None).equilibrium_length(), None);
        assert_eq!(
            Bond::new(0, 1, Some(BondType::new(1.0, 1.1))).equilibrium_length(),
            Some(1.1)
        );
    }
}
