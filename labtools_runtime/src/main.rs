//! Lab Tools launcher.
//!
//! Usage: `labtools [--config labtools.json] <project>`
//!
//! Loads the configuration (defaults if the file is absent), opens or
//! creates the project, runs every initializer, loads the project's origins,
//! reports what it found and writes the project back.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use labtools_runtime::records::CellCountRecord;
use labtools_runtime::telemetry::init_tracing;
use labtools_runtime::{
    CellCountInitializer, InitializerRegistry, Project, RuntimeConfig, RuntimeError,
};
use labtools_store::Resource;
use tracing::{error, info, warn};

/// Open a Lab Tools project, load its origins and save it back.
#[derive(Parser, Debug)]
#[command(name = "labtools", version, about, long_about = None)]
struct Cli {
    /// Project name, a single directory under the projects folder.
    project: String,

    /// Path to the JSON configuration file.
    #[arg(long, short, default_value = "labtools.json")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RuntimeConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("cannot load {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_filter);

    match run(&config, &cli.project) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, project = %cli.project, "launch failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RuntimeConfig, name: &str) -> Result<(), RuntimeError> {
    let mut project = Project::<CellCountRecord>::open_or_create(config, name)?;

    let mut registry = InitializerRegistry::<CellCountRecord>::new();
    registry.register(Box::new(CellCountInitializer));
    for descriptor in registry.descriptors() {
        info!(initializer = %descriptor, "initializer available");
    }
    registry.initialize_all(&mut project)?;

    for path in project.unclaimed_origins() {
        warn!(path = %path.display(), "origin in manifest has no initializer");
    }
    project.load_origins()?;

    for origin in project.handler().origins() {
        let mut kinds = [0usize; 4];
        for record in origin.iter() {
            kinds[usize::from(record.kind().tag())] += 1;
        }
        info!(
            origin = %origin,
            counts = kinds[0],
            dilutions = kinds[1],
            counted_dilutions = kinds[2],
            series = kinds[3],
            "origin summary"
        );
    }

    project.write()?;
    info!(project = project.name(), folder = %project.folder().display(), "project saved");
    Ok(())
}
