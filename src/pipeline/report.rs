// ABOUTME: Pipeline stages, outcomes, the run report, and stage-annotated errors.
// ABOUTME: StageError uses snafu context selectors; exit codes derive from the failing stage.

use serde::Serialize;
use snafu::Snafu;
use std::time::Duration;

use crate::control_plane::{DeployError, DeploymentStatus};
use crate::diagnostics::Warning;
use crate::error::{EXIT_CANCELLED, EXIT_DEPLOY, EXIT_GENERAL, EXIT_PUSH, EXIT_WATCH};
use crate::registry::PushFailure;
use crate::revision::ConfigError;
use crate::types::{ClusterName, DeploymentHandle, RevisionId, ServiceName};
use crate::watch::WatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Configuration, the pre-deploy hook and the engine connection.
    Setup,
    Push,
    Revision,
    Deploy,
    Watch,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Push => "push",
            Stage::Revision => "revision",
            Stage::Deploy => "deploy",
            Stage::Watch => "watch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Stable,
    /// The revision was submitted but never became stable.
    DeployedButUnstable,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Outcome::Stable => "stable",
            Outcome::DeployedButUnstable => "deployed-but-unstable",
            Outcome::Failed => "failed",
        })
    }
}

/// The user-visible shape of every failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub error_kind: String,
    pub message: String,
}

/// What a run did, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub service: ServiceName,
    pub cluster: ClusterName,
    /// The last stage that was started.
    pub stage: Stage,
    pub outcome: Outcome,
    /// Pushed image pinned by digest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<RevisionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<DeploymentHandle>,
    pub polls: u32,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,
    /// Previous-revision tasks wound down after the rollout.
    pub retired: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    pub warnings: Vec<Warning>,
}

impl PipelineReport {
    pub fn new(service: ServiceName, cluster: ClusterName) -> Self {
        Self {
            service,
            cluster,
            stage: Stage::Push,
            outcome: Outcome::Failed,
            image: None,
            revision: None,
            handle: None,
            polls: 0,
            elapsed: Duration::ZERO,
            status: None,
            retired: 0,
            failure: None,
            warnings: Vec::new(),
        }
    }

    /// Whether the control plane accepted a revision during this run.
    pub fn deployed(&self) -> bool {
        self.handle.is_some()
    }
}

/// A stage failure with its cause.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StageError {
    #[snafu(display("{source}"))]
    Push { source: PushFailure },

    #[snafu(display("{source}"))]
    Revision { source: ConfigError },

    #[snafu(display("{source}"))]
    Deploy { source: DeployError },

    #[snafu(display("{source}"))]
    Watch { source: WatchError },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Push { .. } => Stage::Push,
            StageError::Revision { .. } => Stage::Revision,
            StageError::Deploy { .. } => Stage::Deploy,
            StageError::Watch { .. } => Stage::Watch,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Push { source } => source.kind(),
            StageError::Revision { source } => match source {
                ConfigError::MissingDigest(_) => "missing_digest",
                ConfigError::DuplicateEnvKey(_) => "duplicate_env_key",
                ConfigError::InvalidEnvKey(_) => "invalid_env_key",
                ConfigError::InvalidMemory(_) => "invalid_memory",
                ConfigError::InvalidCpus(_) => "invalid_cpus",
                ConfigError::UnresolvedEnv(_) => "unresolved_env",
            },
            StageError::Deploy { source } => source.kind(),
            StageError::Watch { source } => source.kind(),
        }
    }

    pub fn failure(&self) -> StageFailure {
        StageFailure {
            stage: self.stage(),
            error_kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            StageError::Push {
                source: PushFailure::Cancelled { .. },
            } => EXIT_CANCELLED,
            StageError::Push { .. } => EXIT_PUSH,
            StageError::Revision { .. } => EXIT_GENERAL,
            StageError::Deploy { .. } => EXIT_DEPLOY,
            StageError::Watch {
                source: WatchError::Cancelled { .. },
            } => EXIT_CANCELLED,
            StageError::Watch { .. } => EXIT_WATCH,
        }
    }
}

/// A failed run: the failing stage, its cause, and the report up to that point.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    pub source: StageError,
    pub report: Box<PipelineReport>,
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }

    pub fn failure(&self) -> StageFailure {
        self.source.failure()
    }
}
