use bondfix::core::io::tables::TableFile;
use bondfix::core::models::atom::Atom;
use bondfix::core::models::system::MolecularSystem;
use bondfix::core::models::topology::BondType;
use bondfix::core::utils::geometry::distance;
use bondfix::engine::config::SolverConfig;
use bondfix::engine::error::ConstraintError;
use bondfix::engine::molecule::ConstrainedMolecule;
use bondfix::engine::progress::ProgressReporter;
use bondfix::workflows::constrain;
use nalgebra::Point3;
use tempfile::tempdir;

fn build_system(coords: &[[f64; 3]], bonds: &[(usize, usize, f64)]) -> MolecularSystem {
    let mut system = MolecularSystem::new();
    for (i, c) in coords.iter().enumerate() {
        system.add_atom(Atom::new(&format!("C{}", i + 1), Point3::new(c[0], c[1], c[2])));
    }
    for &(i, j, req) in bonds {
        system.add_bond(i, j, Some(BondType::new(300.0, req))).unwrap();
    }
    system
}

fn ethane(req: f64) -> MolecularSystem {
    build_system(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]], &[(0, 1, req)])
}

fn propane() -> MolecularSystem {
    build_system(
        &[[0.0, 0.1, 0.2], [1.0, 0.3, 0.1], [2.0, 0.4, 0.2]],
        &[(0, 1, 1.5), (1, 2, 1.5)],
    )
}

fn assert_bond_lengths_exact(molecule: &ConstrainedMolecule) {
    let coords = molecule.coordinates();
    for bond in molecule.problem().constraints() {
        let d = distance(&coords[bond.i], &coords[bond.j]);
        assert!(
            ((d - bond.length) / bond.length).abs() < 1e-6,
            "bond {}-{} measures {} instead of {}",
            bond.i,
            bond.j,
            d,
            bond.length
        );
    }
}

#[test]
fn feasible_diatomic_is_left_in_place() {
    let system = ethane(1.0);
    let mut molecule = ConstrainedMolecule::new(&system).unwrap();
    molecule.solve().unwrap();

    assert!(molecule.is_solved());
    assert_eq!(molecule.coordinates(), system.coordinates().as_slice());
}

#[test]
fn stretched_diatomic_moves_symmetrically() {
    let mut molecule = ConstrainedMolecule::new(&ethane(1.5)).unwrap();
    let summary = molecule.solve().unwrap();

    let coords = molecule.coordinates();
    assert!((coords[0].x + 0.25).abs() < 1e-8);
    assert!((coords[1].x - 1.25).abs() < 1e-8);
    for p in coords {
        assert!(p.y.abs() < 1e-12 && p.z.abs() < 1e-12);
    }
    assert!((summary.objective - 0.125).abs() < 1e-8);
    assert_bond_lengths_exact(&molecule);
}

#[test]
fn update_after_solve_resets_solved_flag() {
    let mut molecule = ConstrainedMolecule::new(&propane()).unwrap();
    molecule.solve().unwrap();
    assert!(molecule.is_solved());

    let new_geometry = [
        Point3::new(-1.0, -0.2, 0.4),
        Point3::new(0.0, 0.0, 0.3),
        Point3::new(1.0, 0.1, 0.4),
    ];
    molecule.update_geometry(&new_geometry).unwrap();
    assert!(!molecule.is_solved());
    assert_eq!(molecule.coordinates(), &new_geometry);

    molecule.solve().unwrap();
    assert!(molecule.is_solved());
    assert_bond_lengths_exact(&molecule);
}

#[test]
fn bent_chain_converges_and_keeps_its_bend() {
    let system = build_system(
        &[[0.0, 0.0, 0.0], [1.05, 0.02, 0.0], [1.6, 0.85, 0.03]],
        &[(0, 1, 1.0), (1, 2, 1.0)],
    );
    let mut molecule = ConstrainedMolecule::new(&system).unwrap();
    molecule.solve().unwrap();

    assert_bond_lengths_exact(&molecule);
    // The third atom stays on the same side of the first bond.
    assert!(molecule.coordinates()[2].y > molecule.coordinates()[1].y);
}

#[test]
fn resolving_the_same_geometry_is_deterministic() {
    let system = propane();
    let mut molecule = ConstrainedMolecule::new(&system).unwrap();
    molecule.solve().unwrap();
    let first = molecule.coordinates().to_vec();

    molecule.update_geometry(&system.coordinates()).unwrap();
    molecule.solve().unwrap();
    assert_eq!(molecule.coordinates(), first.as_slice());

    let mut fresh = ConstrainedMolecule::new(&system).unwrap();
    fresh.solve().unwrap();
    assert_eq!(fresh.coordinates(), first.as_slice());
}

#[test]
fn solving_a_solved_molecule_keeps_the_result() {
    let mut molecule = ConstrainedMolecule::new(&propane()).unwrap();
    molecule.solve().unwrap();
    let first = molecule.coordinates().to_vec();

    let summary = molecule.solve().unwrap();
    assert_eq!(summary.iterations, 0);
    assert_eq!(molecule.coordinates(), first.as_slice());
}

#[test]
fn rows_with_wrong_shape_are_rejected() {
    let mut molecule = ConstrainedMolecule::new(&propane()).unwrap();
    let rows = vec![vec![1.0, 1.0, 1.0], vec![0.0, 0.0, 0.0]];
    assert!(matches!(
        molecule.update_geometry_from_rows(&rows),
        Err(ConstraintError::ShapeMismatch {
            expected: (3, 3),
            found: (2, 3)
        })
    ));
    assert_eq!(molecule.coordinates(), propane().coordinates().as_slice());
}

#[test]
fn tables_round_trip_through_the_workflow() {
    let positions = "id,x,y,z,name,residue,residue_number\n\
                     0,0.0,0.1,0.2,C1,PRO,1\n\
                     1,1.0,0.3,0.1,C2,PRO,1\n\
                     2,2.0,0.4,0.2,C3,PRO,1\n\
                     3,0.0,5.1,0.2,C1,PRO,2\n\
                     4,1.0,5.3,0.1,C2,PRO,2\n\
                     5,2.0,5.4,0.2,C3,PRO,2\n\
                     6,9.0,9.0,9.0,NA,NA,3\n";
    let constraints = "id_i,id_j,req\n0,1,1.5\n1,2,1.5\n3,4,1.5\n4,5,1.5\n";
    let system = TableFile::read_system(positions.as_bytes(), constraints.as_bytes()).unwrap();

    let result = constrain::run(&system, &SolverConfig::default(), &ProgressReporter::new()).unwrap();
    assert_eq!(result.report.molecules, 3);
    assert_eq!(result.report.distinct_topologies, 1);
    assert_eq!(result.report.solves, 2);
    assert!(result.report.max_bond_deviation < 1e-6);

    // Both copies are the same molecule shifted along y, so they move alike.
    for i in 0..3 {
        let a = result.system.atom(i).unwrap().position;
        let b = result.system.atom(i + 3).unwrap().position;
        assert!((a.x - b.x).abs() < 1e-8);
        assert!((b.y - a.y - 5.0).abs() < 1e-8);
    }

    let dir = tempdir().unwrap();
    let out = dir.path().join("constrained.csv");
    let bonds = dir.path().join("constraints.csv");
    TableFile::write_positions_to_path(&result.system, &out).unwrap();
    TableFile::write_constraints_to_path(&result.system, &bonds).unwrap();

    let reread = TableFile::read_system_from_paths(&out, &bonds).unwrap();
    assert_eq!(reread.num_atoms(), 7);
    assert_eq!(reread.num_bonds(), 4);
    assert_eq!(reread.atom(6).unwrap().name, "NA");
    assert_eq!(reread.atom(4).unwrap().residue_number, 2);
    for (original, read_back) in result.system.atoms().iter().zip(reread.atoms()) {
        assert!((original.position - read_back.position).norm() < 1e-12);
    }
}
