use crate::cli::ConstrainArgs;
use crate::config::PartialConstrainConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use anyhow::Context;
use bondfix::{
    core::io::tables::TableFile,
    core::models::system::MolecularSystem,
    engine::{molecule::ConstrainedMolecule, progress::ProgressReporter, solver::NewtonKktSolver},
    workflows,
};
use std::path::Path;
use tracing::info;

pub fn run(args: &ConstrainArgs) -> Result<()> {
    if args.output == args.positions || args.output == args.constraints {
        return Err(CliError::Argument(format!(
            "output path {} would overwrite an input table",
            args.output.display()
        )));
    }

    let partial_config = match &args.config {
        Some(path) => PartialConstrainConfig::from_file(path)?,
        None => PartialConstrainConfig::default(),
    };
    info!("Merging configuration from file and CLI arguments...");
    let solver_config = partial_config.merge_with_cli(args)?;
    info!(?solver_config, "Solver configuration resolved.");

    info!(
        "Loading tables {:?} and {:?}",
        &args.positions, &args.constraints
    );
    let system = TableFile::read_system_from_paths(&args.positions, &args.constraints)?;
    println!(
        "Loaded {} atoms and {} bonds.",
        system.num_atoms(),
        system.num_bonds()
    );

    let constrained = if args.per_molecule {
        let progress_handler = CliProgressHandler::new();
        let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

        info!("Invoking the per-molecule constrain workflow...");
        let result = workflows::constrain::run(&system, &solver_config, &reporter)?;
        let report = &result.report;
        println!(
            "Constrained {} molecule(s) using {} distinct topolog{} ({} unbonded left unchanged).",
            report.solves,
            report.distinct_topologies,
            if report.distinct_topologies == 1 { "y" } else { "ies" },
            report.unbonded_molecules
        );
        println!(
            "RMSD from input: {:.6} Å, max bond deviation: {:.3e} Å",
            report.rmsd, report.max_bond_deviation
        );
        result.system
    } else {
        info!("Constraining the whole system as one problem...");
        let mut molecule =
            ConstrainedMolecule::with_solver(&system, NewtonKktSolver::new(solver_config))?;
        let summary = molecule.solve()?;
        println!(
            "Solver converged in {} iteration(s); squared displacement {:.6} Å², max bond deviation {:.3e} Å",
            summary.iterations, summary.objective, summary.max_bond_deviation
        );
        molecule.structure().clone()
    };

    write_output(&constrained, &args.output)?;
    println!("✓ Constrained positions written to: {}", args.output.display());
    Ok(())
}

fn write_output(system: &MolecularSystem, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }
    info!("Writing constrained positions to {:?}", path);
    TableFile::write_positions_to_path(system, path)?;
    Ok(())
}
