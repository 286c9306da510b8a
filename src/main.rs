// ABOUTME: Entry point for the deploy-pipeline CLI application.
// ABOUTME: Parses arguments, loads configuration, and maps failures to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use deploy_pipeline::config::{self, PipelineConfig};
use deploy_pipeline::error::{Error, Result};
use deploy_pipeline::output::{Output, OutputMode};
use std::env;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose picks debug
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping");
            ctrl_c.cancel();
        }
    });

    if let Err(e) = run(cli, mode, cancel).await {
        // Pipeline failures were already rendered with the report
        if !matches!(e, Error::Pipeline(_)) {
            Output::new(mode).failure(&e.failure());
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, mode: OutputMode, cancel: CancellationToken) -> Result<()> {
    let cwd = env::current_dir()?;

    match cli.command {
        Some(Commands::Init {
            service,
            image,
            force,
        }) => {
            config::init_config(&cwd, service.as_deref(), image.as_deref(), force)?;
            Output::new(mode).success(&format!("Wrote {}", config::CONFIG_FILENAME));
            Ok(())
        }
        None => {
            let config = match cli.config {
                Some(ref path) => PipelineConfig::load(path)?,
                None => PipelineConfig::discover(&cwd)?,
            };

            // Apply destination overrides if specified
            let config = if let Some(dest) = cli.destination {
                config.for_destination(&dest)?
            } else {
                config
            };

            commands::deploy(config, &cwd, cancel, Output::new(mode)).await
        }
    }
}
