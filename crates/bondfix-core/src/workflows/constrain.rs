use crate::core::models::system::{MolecularSystem, TopologySignature};
use crate::core::utils::geometry::{calculate_rmsd, max_bond_deviation};
use crate::engine::config::SolverConfig;
use crate::engine::error::ConstraintError;
use crate::engine::molecule::ConstrainedMolecule;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::solver::NewtonKktSolver;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Failed to constrain molecule {molecule} (first atom {first_atom}): {source}")]
    Molecule {
        molecule: usize,
        first_atom: usize,
        #[source]
        source: ConstraintError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Summary of a constrain run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainReport {
    /// Connected components found in the input, bonded or not.
    pub molecules: usize,
    /// Molecules without bonds, copied through unchanged.
    pub unbonded_molecules: usize,
    /// Number of problems built, one per distinct topology.
    pub distinct_topologies: usize,
    /// Number of successful solves, one per bonded molecule.
    pub solves: usize,
    /// Newton iterations summed over all solves.
    pub total_iterations: usize,
    /// RMSD between input and output coordinates, in Angstroms.
    pub rmsd: f64,
    /// Largest remaining `|distance - req|` over all bonds of the output.
    pub max_bond_deviation: f64,
}

#[derive(Debug, Clone)]
pub struct ConstrainResult {
    pub system: MolecularSystem,
    pub report: ConstrainReport,
}

/// Constrains the bond lengths of every molecule in `system`.
///
/// The system is split into molecules (connected components of the bond
/// graph). Molecules that share a topology share one [`ConstrainedMolecule`],
/// which is re-seeded with each member's coordinates and solved again. The
/// first molecule that fails aborts the run.
#[instrument(skip_all, name = "constrain_workflow")]
pub fn run(
    system: &MolecularSystem,
    config: &SolverConfig,
    reporter: &ProgressReporter,
) -> Result<ConstrainResult, WorkflowError> {
    // === Phase 1: Split into molecules ===
    reporter.report(Progress::PhaseStart {
        name: "Analyzing Topology",
    });
    let molecules = system.molecules();
    let mut bonded = Vec::with_capacity(molecules.len());
    for (index, atoms) in molecules.iter().enumerate() {
        let subsystem = system.extract(atoms).ok_or_else(|| {
            WorkflowError::Internal(format!("molecule {} has invalid atom indices", index))
        })?;
        if subsystem.num_bonds() > 0 {
            bonded.push((index, atoms.as_slice(), subsystem));
        }
    }
    let unbonded_molecules = molecules.len() - bonded.len();
    info!(
        molecules = molecules.len(),
        bonded = bonded.len(),
        unbonded = unbonded_molecules,
        "System split into molecules."
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Solve each bonded molecule ===
    reporter.report(Progress::PhaseStart {
        name: "Constraining Bonds",
    });
    reporter.report(Progress::TaskStart {
        total_steps: bonded.len() as u64,
    });

    let mut output = system.clone();
    let mut pool: HashMap<TopologySignature, ConstrainedMolecule> = HashMap::new();
    let mut solves = 0;
    let mut total_iterations = 0;

    for (index, atoms, subsystem) in &bonded {
        let fail = |source| WorkflowError::Molecule {
            molecule: *index,
            first_atom: atoms[0],
            source,
        };

        let molecule = match pool.entry(subsystem.topology_signature()) {
            Entry::Occupied(entry) => {
                let molecule = entry.into_mut();
                molecule
                    .update_geometry(&subsystem.coordinates())
                    .map_err(fail)?;
                molecule
            }
            Entry::Vacant(entry) => {
                debug!(molecule = index, atoms = atoms.len(), "Building problem for new topology.");
                reporter.report(Progress::Message(format!(
                    "New topology: {} atoms, {} bonds (molecule {})",
                    entry.key().atom_count(),
                    entry.key().bond_count(),
                    index
                )));
                let molecule =
                    ConstrainedMolecule::with_solver(subsystem, NewtonKktSolver::new(config.clone()))
                        .map_err(fail)?;
                entry.insert(molecule)
            }
        };

        let summary = molecule.solve().map_err(fail)?;
        solves += 1;
        total_iterations += summary.iterations;

        for (local, &global) in atoms.iter().enumerate() {
            let atom = output.atom_mut(global).ok_or_else(|| {
                WorkflowError::Internal(format!("atom {} missing from output system", global))
            })?;
            atom.position = molecule.coordinates()[local];
        }
        reporter.report(Progress::TaskIncrement);
    }

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let report = ConstrainReport {
        molecules: molecules.len(),
        unbonded_molecules,
        distinct_topologies: pool.len(),
        solves,
        total_iterations,
        rmsd: calculate_rmsd(&system.coordinates(), &output.coordinates()).unwrap_or(0.0),
        max_bond_deviation: max_bond_deviation(&output),
    };

    info!(
        solves = report.solves,
        topologies = report.distinct_topologies,
        rmsd = report.rmsd,
        max_bond_deviation = report.max_bond_deviation,
        "Constrain workflow complete."
    );
    Ok(ConstrainResult {
        system: output,
        report,
    })
}
