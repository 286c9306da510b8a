// ABOUTME: Command module aggregator for the deploy-pipeline CLI.
// ABOUTME: Re-exports the pipeline run handler.

mod deploy;

pub use deploy::deploy;
