// ABOUTME: Control-plane capability and the deployment driver that submits revisions.
// ABOUTME: Any orchestrator exposing submit + status (+ optional retire) can be driven.

mod engine;

pub use engine::{EngineControlPlane, EngineSettings};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::revision::RevisionDescriptor;
use crate::types::{ClusterName, DeploymentHandle, ServiceName};

/// A request to replace the running revision of `service` in `cluster`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub cluster: ClusterName,
    pub service: ServiceName,
    pub revision: RevisionDescriptor,
    pub desired_count: u32,
}

/// Snapshot of a rollout as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStatus {
    pub desired_count: u32,
    /// Running tasks of the new revision.
    pub running_count: u32,
    /// Running and healthy tasks of the new revision.
    pub healthy_count: u32,
    /// Running tasks of any earlier revision of the same service.
    pub previous_running_count: u32,
    /// The control plane itself reverted to an earlier revision.
    pub rolled_back: bool,
    pub last_event_timestamp: Option<DateTime<Utc>>,
    /// No further progress is expected for this deployment.
    pub terminal: bool,
}

impl DeploymentStatus {
    /// Counts-only status, for control planes that report nothing else.
    pub fn counts(desired: u32, running: u32, healthy: u32) -> Self {
        Self {
            desired_count: desired,
            running_count: running,
            healthy_count: healthy,
            previous_running_count: 0,
            rolled_back: false,
            last_event_timestamp: None,
            terminal: false,
        }
    }

    pub fn with_previous(mut self, previous_running: u32) -> Self {
        self.previous_running_count = previous_running;
        self
    }

    /// running == desired == healthy for the new revision.
    pub fn converged(&self) -> bool {
        self.running_count == self.desired_count && self.healthy_count == self.desired_count
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} running, {} healthy",
            self.running_count, self.desired_count, self.healthy_count
        )?;
        if self.previous_running_count > 0 {
            write!(f, ", {} previous", self.previous_running_count)?;
        }
        Ok(())
    }
}

/// Errors from the control plane. None of them is retried within a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("quota exceeded: requested {requested} tasks, limit is {limit}")]
    QuotaExceeded { requested: u32, limit: u32 },

    #[error("control plane unavailable: {0}")]
    ControlPlaneUnavailable(String),

    #[error("control plane rejected the revision: {0}")]
    SubmissionRejected(String),
}

impl DeployError {
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::ClusterNotFound(_) => "cluster_not_found",
            DeployError::ServiceNotFound(_) => "service_not_found",
            DeployError::QuotaExceeded { .. } => "quota_exceeded",
            DeployError::ControlPlaneUnavailable(_) => "control_plane_unavailable",
            DeployError::SubmissionRejected(_) => "submission_rejected",
        }
    }
}

/// The orchestration system that runs services.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Submit a revision to replace the one currently running.
    async fn submit_revision(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentHandle, DeployError>;

    /// Report the current rollout state for a submitted deployment.
    async fn get_status(&self, handle: &DeploymentHandle)
    -> Result<DeploymentStatus, DeployError>;

    /// Wind down tasks of earlier revisions once the new one is stable.
    ///
    /// Control planes that replace tasks themselves keep the default.
    async fn retire_previous(&self, _handle: &DeploymentHandle) -> Result<usize, DeployError> {
        Ok(0)
    }
}

/// Submit `request` exactly once and return the handle the control plane
/// assigned to it.
pub async fn deploy<C>(
    control_plane: &C,
    request: &DeploymentRequest,
) -> Result<DeploymentHandle, DeployError>
where
    C: ControlPlane + ?Sized,
{
    let revision = request.revision.id();
    tracing::info!(
        cluster = %request.cluster,
        service = %request.service,
        revision = %revision,
        desired = request.desired_count,
        image = %request.revision.pinned_image(),
        "submitting revision"
    );

    match control_plane.submit_revision(request).await {
        Ok(handle) => {
            tracing::info!(handle = %handle, revision = %revision, "revision accepted");
            Ok(handle)
        }
        Err(err) => {
            tracing::error!(revision = %revision, kind = err.kind(), "submission failed: {}", err);
            Err(err)
        }
    }
}
