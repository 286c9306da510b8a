// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Running without a subcommand executes the pipeline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deploy-pipeline")]
#[command(about = "Push a container image and roll a service to the new revision")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Path to the configuration file (default: discovered in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Target destination (defined in config)
    #[arg(short, long)]
    pub destination: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a deploy-pipeline.yml template in the current directory
    Init {
        /// Service name to put in the template
        #[arg(long)]
        service: Option<String>,

        /// Image reference to put in the template
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
