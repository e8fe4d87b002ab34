use super::atom::Atom;
use super::topology::{Bond, BondType};
use nalgebra::Point3;
use std::collections::{HashMap, VecDeque};

/// Canonical key describing a molecule's topology.
///
/// Two systems with equal signatures have the same atom count and the same
/// bonded pairs with bitwise-identical target lengths, so a problem built for
/// one of them can be re-solved for the other after a geometry update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopologySignature {
    atom_count: usize,
    bonds: Vec<(usize, usize, Option<u64>)>,
}

impl TopologySignature {
    pub fn atom_count(&self) -> usize {
        self.atom_count
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }
}

/// Represents a complete molecular system with ordered atoms and bonds.
///
/// Atom order is load-bearing: bonds refer to atoms by index and every
/// coordinate array read from or written to the system follows the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MolecularSystem {
    /// Primary storage for atoms, indexed `0..N`.
    atoms: Vec<Atom>,
    /// List of all bonds in the system.
    bonds: Vec<Bond>,
    /// Cached adjacency list for bond connectivity, indexed by atom.
    bond_adjacency: Vec<Vec<usize>>,
    /// Lookup from sorted atom pair to position in `bonds`.
    bond_index: HashMap<(usize, usize), usize>,
}

impl MolecularSystem {
    /// Creates a new, empty molecular system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves an immutable reference to an atom by its index.
    ///
    /// # Return
    ///
    /// Returns `Some(&Atom)` if the atom exists, otherwise `None`.
    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    /// Retrieves a mutable reference to an atom by its index.
    pub fn atom_mut(&mut self, index: usize) -> Option<&mut Atom> {
        self.atoms.get_mut(index)
    }

    /// Returns all atoms in index order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Returns a slice of all bonds in the system.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn num_bonds(&self) -> usize {
        self.bonds.len()
    }

    /// Appends an atom and returns its index.
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.bond_adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    /// Adds a bond between two atoms.
    ///
    /// Adding a bond that already exists with the same parameters succeeds
    /// without creating a duplicate.
    ///
    /// # Arguments
    ///
    /// * `atom1` - Index of the first atom.
    /// * `atom2` - Index of the second atom.
    /// * `bond_type` - Optional force-field parameters of the bond.
    ///
    /// # Return
    ///
    /// Returns `None` if either index is out of range, the two indices are
    /// equal, or the pair is already bonded with different parameters.
    pub fn add_bond(
        &mut self,
        atom1: usize,
        atom2: usize,
        bond_type: Option<BondType>,
    ) -> Option<()> {
        if atom1 == atom2 || atom1 >= self.atoms.len() || atom2 >= self.atoms.len() {
            return None;
        }

        let bond = Bond::new(atom1, atom2, bond_type);
        let key = bond.sorted_pair();
        if let Some(&existing) = self.bond_index.get(&key) {
            return (self.bonds[existing].bond_type == bond_type).then_some(());
        }

        self.bond_index.insert(key, self.bonds.len());
        self.bonds.push(bond);
        self.bond_adjacency[atom1].push(atom2);
        self.bond_adjacency[atom2].push(atom1);
        Some(())
    }

    /// Returns a copy of every atom position, in index order.
    pub fn coordinates(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// Overwrites every atom position.
    ///
    /// # Return
    ///
    /// Returns `None` without modifying anything if `positions` does not
    /// contain exactly one entry per atom.
    pub fn set_coordinates(&mut self, positions: &[Point3<f64>]) -> Option<()> {
        if positions.len() != self.atoms.len() {
            return None;
        }
        for (atom, position) in self.atoms.iter_mut().zip(positions) {
            atom.position = *position;
        }
        Some(())
    }

    /// Splits the system into molecules: connected components of the bond graph.
    ///
    /// Each molecule lists its atom indices in ascending order, and molecules
    /// are ordered by their lowest atom index. Unbonded atoms form molecules of
    /// their own.
    pub fn molecules(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.atoms.len()];
        let mut molecules = Vec::new();

        for start in 0..self.atoms.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut members = vec![start];
            let mut queue = VecDeque::from([start]);

            while let Some(current) = queue.pop_front() {
                for &next in &self.bond_adjacency[current] {
                    if !visited[next] {
                        visited[next] = true;
                        members.push(next);
                        queue.push_back(next);
                    }
                }
            }

            members.sort_unstable();
            molecules.push(members);
        }

        molecules
    }

    /// Builds an independent system from a subset of atoms.
    ///
    /// Atoms are renumbered `0..indices.len()` in the order given, and only
    /// bonds with both ends inside the subset are kept.
    ///
    /// # Return
    ///
    /// Returns `None` if any index is out of range or repeated.
    pub fn extract(&self, indices: &[usize]) -> Option<MolecularSystem> {
        let mut local_of = HashMap::with_capacity(indices.len());
        let mut subsystem = MolecularSystem::new();

        for &global in indices {
            let atom = self.atoms.get(global)?.clone();
            if local_of.insert(global, subsystem.add_atom(atom)).is_some() {
                return None;
            }
        }

        for bond in &self.bonds {
            if let (Some(&a), Some(&b)) = (local_of.get(&bond.atom1), local_of.get(&bond.atom2)) {
                subsystem.add_bond(a, b, bond.bond_type)?;
            }
        }

        Some(subsystem)
    }

    /// Computes the topology signature of the whole system.
    pub fn topology_signature(&self) -> TopologySignature {
        let mut bonds: Vec<_> = self
            .bonds
            .iter()
            .map(|b| {
                let (i, j) = b.sorted_pair();
                (i, j, b.equilibrium_length().map(f64::to_bits))
            })
            .collect();
        bonds.sort_unstable();
        TopologySignature {
            atom_count: self.atoms.len(),
            bonds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bt(req: f64) -> Option<BondType> {
        Some(BondType::new(100.0, req))
    }

    fn chain(n: usize, offset: f64) -> MolecularSystem {
        let mut system = MolecularSystem::new();
        for i in 0..n {
            system.add_atom(Atom::new("C", Point3::new(offset + i as f64, 0.0, 0.0)));
        }
        for i in 1..n {
            system.add_bond(i - 1, i, bt(1.5)).unwrap();
        }
        system
    }

    #[test]
    fn add_atom_returns_sequential_indices() {
        let mut system = MolecularSystem::new();
        assert_eq!(system.add_atom(Atom::new("A", Point3::origin())), 0);
        assert_eq!(system.add_atom(Atom::new("B", Point3::origin())), 1);
        assert_eq!(system.num_atoms(), 2);
        assert_eq!(system.atom(1).unwrap().name, "B");
        assert!(system.atom(2).is_none());
    }

    #[test]
    fn add_bond_links_atoms_into_one_molecule() {
        let mut system = chain(3, 0.0);
        system.add_atom(Atom::new("C", Point3::new(3.0, 0.0, 0.0)));
        assert_eq!(system.molecules(), vec![vec![0, 1, 2], vec![3]]);

        system.add_bond(3, 0, bt(1.5)).unwrap();
        assert_eq!(system.num_bonds(), 3);
        assert_eq!(system.molecules(), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn add_bond_rejects_invalid_indices_and_self_bonds() {
        let mut system = chain(2, 0.0);
        assert!(system.add_bond(0, 5, bt(1.0)).is_none());
        assert!(system.add_bond(1, 1, bt(1.0)).is_none());
        assert_eq!(system.num_bonds(), 1);
    }

    #[test]
    fn add_bond_is_idempotent_for_identical_bonds() {
        let mut system = chain(2, 0.0);
        assert!(system.add_bond(1, 0, bt(1.5)).is_some());
        assert_eq!(system.num_bonds(), 1);
    }

    #[test]
    fn add_bond_rejects_conflicting_duplicate() {
        let mut system = chain(2, 0.0);
        assert!(system.add_bond(1, 0, bt(1.2)).is_none());
        assert_eq!(system.num_bonds(), 1);
        assert_eq!(system.bonds()[0].equilibrium_length(), Some(1.5));
    }

    #[test]
    fn set_coordinates_rejects_wrong_length() {
        let mut system = chain(2, 0.0);
        let before = system.coordinates();
        assert!(system.set_coordinates(&[Point3::origin()]).is_none());
        assert_eq!(system.coordinates(), before);

        let new = vec![Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0)];
        assert!(system.set_coordinates(&new).is_some());
        assert_eq!(system.coordinates(), new);
    }

    #[test]
    fn molecules_returns_connected_components() {
        let mut system = chain(3, 0.0);
        let ion = system.add_atom(Atom::new("NA", Point3::new(9.0, 0.0, 0.0)));
        let a = system.add_atom(Atom::new("O", Point3::new(20.0, 0.0, 0.0)));
        let b = system.add_atom(Atom::new("H", Point3::new(21.0, 0.0, 0.0)));
        system.add_bond(b, a, bt(1.0)).unwrap();

        assert_eq!(system.molecules(), vec![vec![0, 1, 2], vec![ion], vec![a, b]]);
    }

    #[test]
    fn extract_renumbers_atoms_and_keeps_internal_bonds() {
        let system = chain(4, 0.0);
        let sub = system.extract(&[2, 3]).unwrap();
        assert_eq!(sub.num_atoms(), 2);
        assert_eq!(sub.num_bonds(), 1);
        assert_eq!(sub.bonds()[0].sorted_pair(), (0, 1));
        assert_eq!(sub.atom(0).unwrap().position, Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn extract_rejects_out_of_range_and_repeated_indices() {
        let system = chain(2, 0.0);
        assert!(system.extract(&[0, 7]).is_none());
        assert!(system.extract(&[1, 1]).is_none());
    }

    #[test]
    fn topology_signature_ignores_coordinates() {
        let first = chain(3, 0.0);
        let second = chain(3, 50.0);
        assert_eq!(first.topology_signature(), second.topology_signature());
        assert_eq!(first.topology_signature().atom_count(), 3);
        assert_eq!(first.topology_signature().bond_count(), 2);
    }

    #[test]
    fn topology_signature_distinguishes_bond_lengths() {
        let first = chain(2, 0.0);
        let mut second = MolecularSystem::new();
        second.add_atom(Atom::new("C", Point3::origin()));
        second.add_atom(Atom::new("C", Point3::new(1.0, 0.0, 0.0)));
        second.add_bond(0, 1, bt(1.4)).unwrap();
        assert_ne!(first.topology_signature(), second.topology_signature());
    }
}
