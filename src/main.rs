//! nixbreak CLI
//!
//! Entry point for corpus collection runs.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nixbreak::candidates::{self, CandidateUnit};
use nixbreak::config::{Config, DEFAULT_CONFIG_PATH};
use nixbreak::driver::NixBuildRunner;
use nixbreak::workspace::{self, Workspace};
use nixbreak::{pool, SampleCollector, SqliteStore};
use nixbreak_extract::NixLogCli;

#[derive(Parser)]
#[command(name = "nixbreak")]
#[command(about = "Corpus builder: break working Nix recipes, record the errors", version)]
struct Cli {
    /// Path to the config file
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a collection pass
    Collect {
        /// Override the configured number of candidates to draw
        #[arg(long)]
        samples: Option<usize>,
    },

    /// Validate the config and check all workspaces share one revision
    Verify,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Collect { samples } => run_collect(&cli.config, samples),
        Commands::Verify => run_verify(&cli.config),
    };

    if let Err(message) = result {
        eprintln!("error: {message}");
        process::exit(1);
    }
}

fn open_pinned_workspaces(config: &Config) -> Result<(Vec<Workspace>, nixbreak::Revision), String> {
    let workspaces =
        Workspace::open_all(config.workspaces.roots.clone()).map_err(|e| e.to_string())?;
    warn!(
        count = workspaces.len(),
        "these checkouts will be modified; stray changes are discarded on reset"
    );
    let revision = workspace::ensure_synchronized(&workspaces).map_err(|e| e.to_string())?;
    info!(%revision, "all workspaces pinned");
    Ok((workspaces, revision))
}

fn run_collect(config_path: &PathBuf, samples: Option<usize>) -> Result<(), String> {
    let mut config = Config::load(config_path).map_err(|e| e.to_string())?;
    if let Some(samples) = samples {
        config.collection.max_samples = samples;
    }
    config.validate().map_err(|e| e.to_string())?;

    let (workspaces, revision) = open_pinned_workspaces(&config)?;
    let mut store = SqliteStore::open(&config.store.path).map_err(|e| e.to_string())?;

    let raw = candidates::cached_listing(&mut store, revision, &workspaces[0])
        .map_err(|e| e.to_string())?;
    let listing = candidates::PackageListing::parse(&raw).map_err(|e| e.to_string())?;
    if listing.is_empty() {
        return Err("package listing has no usable entries".to_string());
    }

    let mut rng = match config.collection.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut selected: Vec<CandidateUnit> = Vec::new();
    for _ in 0..config.collection.max_samples {
        let Some(listed) = listing.pick(&mut rng) else {
            break;
        };
        match candidates::resolve(&workspaces[0], listed) {
            Ok(candidate) => selected.push(candidate),
            Err(err) => warn!(error = %err, "skipping candidate"),
        }
    }
    info!(selected = selected.len(), "candidates selected");

    let collector = SampleCollector::new(NixBuildRunner, NixLogCli)
        .with_argument_probability(config.collection.argument_probability);
    let report = pool::run(
        &collector,
        &workspaces,
        revision,
        selected,
        &mut store,
        config.collection.seed,
    )
    .map_err(|e| e.to_string())?;

    info!(
        total = report.total,
        stored = report.stored,
        abandoned = report.abandoned,
        "collection pass finished"
    );
    Ok(())
}

fn run_verify(config_path: &PathBuf) -> Result<(), String> {
    let config = Config::load(config_path).map_err(|e| e.to_string())?;
    let (workspaces, revision) = open_pinned_workspaces(&config)?;
    println!(
        "{} workspaces pinned to {revision}",
        workspaces.len()
    );
    Ok(())
}
