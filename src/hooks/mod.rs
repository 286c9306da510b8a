// ABOUTME: Hooks system for pipeline lifecycle events.
// ABOUTME: Discovers and executes shell scripts at pre-deploy, post-deploy, and on-error points.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::pipeline::PipelineReport;
use crate::types::{ClusterName, ServiceName};

/// Hook execution points in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before the push. Failure aborts the run.
    PreDeploy,
    /// After the service became stable. Failure logs warning.
    PostDeploy,
    /// When any stage failed. Failure logs warning.
    OnError,
}

impl HookPoint {
    /// Get the hook filename for this point.
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostDeploy => "post-deploy",
            HookPoint::OnError => "on-error",
        }
    }

    /// Whether failure at this hook point should abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreDeploy)
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub service: ServiceName,
    pub cluster: ClusterName,
    /// Image as configured before the push, or pinned by digest after it.
    pub image: String,
    pub revision: Option<String>,
    pub handle: Option<String>,
    /// Failing stage, set for on-error hooks.
    pub stage: Option<String>,
    pub error: Option<String>,
}

impl HookContext {
    pub fn new(service: ServiceName, cluster: ClusterName, image: impl Into<String>) -> Self {
        Self {
            service,
            cluster,
            image: image.into(),
            revision: None,
            handle: None,
            stage: None,
            error: None,
        }
    }

    /// Context after a run, carrying whatever the report learned.
    pub fn from_report(report: &PipelineReport, configured_image: &str) -> Self {
        Self {
            service: report.service.clone(),
            cluster: report.cluster.clone(),
            image: report
                .image
                .clone()
                .unwrap_or_else(|| configured_image.to_string()),
            revision: report.revision.as_ref().map(|r| r.to_string()),
            handle: report.handle.as_ref().map(|h| h.to_string()),
            stage: report.failure.as_ref().map(|f| f.stage.to_string()),
            error: report.failure.as_ref().map(|f| f.message.clone()),
        }
    }

    /// Convert context to environment variables.
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("DEPLOY_PIPELINE_SERVICE".to_string(), self.service.to_string());
        env.insert("DEPLOY_PIPELINE_CLUSTER".to_string(), self.cluster.to_string());
        env.insert("DEPLOY_PIPELINE_IMAGE".to_string(), self.image.clone());
        let optional = [
            ("DEPLOY_PIPELINE_REVISION", &self.revision),
            ("DEPLOY_PIPELINE_HANDLE", &self.handle),
            ("DEPLOY_PIPELINE_STAGE", &self.stage),
            ("DEPLOY_PIPELINE_ERROR", &self.error),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                env.insert(key.to_string(), value.clone());
            }
        }
        env
    }
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Discovers and runs hooks from a project directory.
pub struct HookRunner {
    hooks_dir: PathBuf,
}

impl HookRunner {
    /// Create a new hook runner looking for hooks in the given project directory.
    pub fn new(project_dir: &Path) -> Self {
        Self {
            hooks_dir: project_dir.join(".deploy-pipeline").join("hooks"),
        }
    }

    /// Check if a hook exists for the given point.
    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    /// Get the path to a hook script.
    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run a hook if it exists.
    ///
    /// Returns None if the hook doesn't exist, or Some(HookResult) if it was run.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let hook_path = self.hook_path(point);

        if !hook_path.is_file() {
            return None;
        }

        tracing::info!("Running {} hook: {}", point.filename(), hook_path.display());

        let env_vars = context.to_env();

        let output = Command::new(&hook_path)
            .envs(&env_vars)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => {
                let result = HookResult {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if result.success {
                    tracing::info!("{} hook completed successfully", point.filename());
                } else {
                    tracing::warn!(
                        "{} hook failed with exit code {:?}",
                        point.filename(),
                        result.exit_code
                    );
                }

                Some(result)
            }
            Err(e) => {
                tracing::error!("Failed to execute {} hook: {}", point.filename(), e);
                Some(HookResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }
}
