use crate::core::models::system::MolecularSystem;
use nalgebra::Point3;

pub fn distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (a - b).norm()
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    Some((total_squared_displacement(coords1, coords2)? / n).sqrt())
}

/// Sum over atoms of the squared distance between paired positions.
pub fn total_squared_displacement(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() {
        return None;
    }
    Some(
        coords1
            .iter()
            .zip(coords2.iter())
            .map(|(p1, p2)| (p1 - p2).norm_squared())
            .sum(),
    )
}

/// Largest `|distance - req|` over all parameterized bonds of the system.
///
/// Bonds without parameters are ignored. Returns `0.0` when there are none.
pub fn max_bond_deviation(system: &MolecularSystem) -> f64 {
    system
        .bonds()
        .iter()
        .filter_map(|bond| {
            let req = bond.equilibrium_length()?;
            let p1 = system.atom(bond.atom1)?.position;
            let p2 = system.atom(bond.atom2)?.position;
            Some((distance(&p1, &p2) - req).abs())
        })
        .fold(0.0, f64::max)
}
