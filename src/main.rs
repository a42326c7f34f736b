use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cohort_harvest::{
    config::{self, DynHarvestSpec, StablePopSpec},
    logging,
    report::TsvSink,
    HarvestRunner, JsonSnapshotStore, ParameterSetLoader, SnapshotKey, SnapshotStore,
    StabilizationController, StabilizationOutcome,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Age/sex structured harvest model")]
struct Cli {
    /// Directory holding `<name>.yaml` species parameter sets
    #[arg(long, default_value = "params", global = true)]
    params_dir: PathBuf,

    /// Directory for stable population snapshots
    #[arg(long, default_value = "stable_pops", global = true)]
    store_dir: PathBuf,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stabilize one population per document in the spec file
    StablePop { spec: PathBuf },
    /// Run harvest simulations from a stable population
    DynHarvest { spec: PathBuf },
    /// Print a stored stable population
    ShowPop {
        species: String,
        size: u64,
        sub_steps: usize,
    },
    /// Write a commented spec template
    Template { kind: TemplateKind, path: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TemplateKind {
    StablePop,
    DynHarvest,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);
    let mut store = JsonSnapshotStore::new(&cli.store_dir);

    match cli.command {
        Command::StablePop { spec } => {
            let loader = ParameterSetLoader::new(&cli.params_dir);
            for spec in config::load_documents::<StablePopSpec>(&spec)? {
                stable_pop(&spec, &loader, &mut store)?;
            }
        }
        Command::DynHarvest { spec } => {
            for spec in config::load_documents::<DynHarvestSpec>(&spec)? {
                dyn_harvest(&spec, &store)?;
            }
        }
        Command::ShowPop {
            species,
            size,
            sub_steps,
        } => {
            let key = SnapshotKey::new(species, size, sub_steps);
            match store.load(&key)? {
                Some(snapshot) => print!("{snapshot}"),
                None => bail!("no stable population {key} in {}", cli.store_dir.display()),
            }
        }
        Command::Template { kind, path } => {
            let text = match kind {
                TemplateKind::StablePop => config::STABLE_POP_TEMPLATE,
                TemplateKind::DynHarvest => config::DYN_HARVEST_TEMPLATE,
            };
            fs::write(&path, text)
                .with_context(|| format!("Failed to write template {}", path.display()))?;
        }
    }
    Ok(())
}

fn stable_pop(
    spec: &StablePopSpec,
    loader: &ParameterSetLoader,
    store: &mut JsonSnapshotStore,
) -> Result<()> {
    spec.validate()?;
    let params = loader.load(&spec.parameter_set)?;
    if params.name != spec.parameter_set {
        bail!(
            "parameter set file {} names species '{}'",
            loader.path_for(&spec.parameter_set).display(),
            params.name
        );
    }
    let mut controller =
        StabilizationController::new(params, spec.size, spec.sub_steps, spec.rng())?;
    match controller.run_and_persist(store)? {
        StabilizationOutcome::Stabilized(snapshot) => {
            println!("Saved to {}", store.path_for(snapshot.key()).display());
            print!("{snapshot}");
        }
        StabilizationOutcome::Unstabilized { years } => {
            println!("{} did not stabilize within {years} years", spec.key());
        }
        StabilizationOutcome::Crashed { years } => {
            println!("{} crashed after {years} years", spec.key());
        }
    }
    Ok(())
}

fn dyn_harvest(spec: &DynHarvestSpec, store: &JsonSnapshotStore) -> Result<()> {
    let key = spec.key();
    let Some(snapshot) = store.load(&key)? else {
        bail!(
            "no stable population {key}; expected {}",
            store.path_for(&key).display()
        );
    };
    for run in spec.expand()? {
        let mut runner = HarvestRunner::new(&snapshot, &run.harvest, run.rng())?;
        let mut sink = TsvSink::create(&run.output)?;
        let summary = runner.run_to_sink(&mut sink)?;
        println!(
            "{}: {:?} after {} years (final rate {:.4})",
            run.output.display(),
            summary.signal,
            summary.years_completed,
            summary.final_rate
        );
    }
    Ok(())
}
