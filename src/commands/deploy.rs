// ABOUTME: Deploy command implementation.
// ABOUTME: Connects the engine, runs hooks around the pipeline, and renders the report.

use deploy_pipeline::config::PipelineConfig;
use deploy_pipeline::control_plane::{EngineControlPlane, EngineSettings};
use deploy_pipeline::credentials::{Anonymous, ConfigCredentials, CredentialsProvider};
use deploy_pipeline::diagnostics::Warning;
use deploy_pipeline::error::{Error, Result};
use deploy_pipeline::hooks::{HookContext, HookPoint, HookRunner};
use deploy_pipeline::output::Output;
use deploy_pipeline::pipeline::{Pipeline, PipelineReport};
use deploy_pipeline::registry::EngineRegistry;
use deploy_pipeline::runtime;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Run the pipeline for `config` against the local container engine.
pub async fn deploy(
    config: PipelineConfig,
    project_dir: &Path,
    cancel: CancellationToken,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let hook_runner = HookRunner::new(project_dir);

    let pre_context = HookContext::new(
        config.service.clone(),
        config.cluster.clone(),
        config.image.to_string(),
    );
    if let Some(result) = hook_runner.run(HookPoint::PreDeploy, &pre_context).await
        && !result.success
    {
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr);
        }
        return Err(Error::Hook("pre-deploy hook failed".to_string()));
    }

    output.progress("  → Connecting to container engine...");
    let (client, info) = runtime::connect(&config.engine.runtime_config()).await?;
    output.progress(&format!(
        "  → Found {} at {}",
        info.runtime_type, info.socket_path
    ));

    let settings = EngineSettings {
        max_tasks: config.engine.max_tasks,
        create_services: config.engine.create_services,
        stop_timeout: config.engine.stop_timeout,
    };
    let credentials: Box<dyn CredentialsProvider> = match config.registry.credentials {
        Some(ref creds) => Box::new(ConfigCredentials::new(creds, config.image.registry_host())),
        None => Box::new(Anonymous),
    };
    let pipeline = Pipeline::new(
        EngineRegistry::new(client.clone()),
        EngineControlPlane::new(client, settings),
        credentials,
    );

    output.progress(&format!(
        "Deploying {} ({}) to {} with {} task(s)",
        config.service, config.image, config.cluster, config.desired_count
    ));

    match pipeline.run(&config, cancel).await {
        Ok(mut report) => {
            run_hook(&hook_runner, HookPoint::PostDeploy, &mut report, &config).await;
            output.report(&report);
            Ok(())
        }
        Err(mut err) => {
            run_hook(&hook_runner, HookPoint::OnError, &mut err.report, &config).await;
            output.report(&err.report);
            Err(err.into())
        }
    }
}

/// Run a non-fatal hook, recording its failure on the report.
async fn run_hook(
    runner: &HookRunner,
    point: HookPoint,
    report: &mut PipelineReport,
    config: &PipelineConfig,
) {
    let context = HookContext::from_report(report, &config.image.to_string());
    if let Some(result) = runner.run(point, &context).await
        && !result.success
    {
        let warning = Warning::hook_failed(format!(
            "{} hook failed with exit code {:?}",
            point.filename(),
            result.exit_code
        ));
        report.warnings.push(warning);
    }
}
