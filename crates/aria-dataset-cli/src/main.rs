mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;

use anyhow::Context;
use aria_dataset_core::table::save_to_disk;
use aria_dataset_core::{scanner, DatasetEngine, DatasetRegistry, HubClient};
use clap::error::ErrorKind;
use clap::Parser;
use colored::*;
use commands::Cli;
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    let Some(ds_name) = commands::dataset_name(&args.base_directory) else {
        eprintln!("Usage: aria-dataset <BASE_DIRECTORY>");
        eprintln!(
            "'{}' has no directory name to derive the dataset name from",
            args.base_directory.display()
        );
        process::exit(1);
    };

    let _guard = logging::init_logger();

    if let Err(err) = run_process(&args, &ds_name) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run_process(args: &Cli, ds_name: &str) -> anyhow::Result<()> {
    let mut config = aria_dataset_core::config::load_configuration()
        .context("Error loading configuration")?;
    if args.limit.is_some() {
        config.max_rows = args.limit;
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }

    let base_directory = args.base_directory.as_path();
    info!(
        "Creating dataset from directory: {} with name: {}",
        base_directory.display(),
        ds_name
    );
    scanner::ensure_root(base_directory)?;

    let hub = if args.no_push {
        info!("Upload disabled, dataset will only be saved locally");
        None
    } else {
        let mut client = HubClient::from_env(&config.hub_endpoint)?.with_private(config.private);
        let user = client.login().context("Error logging in to the Hugging Face Hub")?;
        info!("Logged in to the Hugging Face Hub as {}", user);
        Some(client)
    };

    let engine = DatasetEngine::new(config.clone());
    let reporter = CliReporter::new();
    let result = engine.build(base_directory, &reporter)?;

    info!(
        "Metadata: {}, Pipeline: {}",
        format!("{:.2}s", result.load_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.pipeline_duration.as_secs_f64()).green(),
    );
    info!(
        "{} files found, {} duplicates, {} unreadable, {} without metadata",
        format!("{}", result.tally.files_discovered).cyan(),
        format!("{}", result.tally.duplicates).red(),
        format!("{}", result.tally.unreadable + result.tally.read_failures).red(),
        format!("{}", result.tally.missing_keys + result.tally.unmatched_keys).red(),
    );
    info!(
        "Dataset created with {} entries.",
        format!("{}", result.table.num_rows()).green()
    );

    let saved = save_to_disk(
        &result.table,
        Path::new(&config.output_dir),
        ds_name,
        base_directory,
    )
    .context("Error saving dataset")?;
    info!("Dataset saved locally to {}", saved.dir.display());

    if let Some(hub) = hub {
        info!("Pushing to Hugging Face Hub: {}...", ds_name);
        let url = hub.publish(ds_name, &saved)?;
        info!("Dataset '{}' successfully created and uploaded: {}", ds_name, url);
    }

    Ok(())
}
