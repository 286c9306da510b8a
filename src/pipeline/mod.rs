// ABOUTME: Pipeline coordinator sequencing push, revision, deploy and watch.
// ABOUTME: Each stage runs only after every earlier stage succeeded.

mod report;

pub use report::{
    Outcome, PipelineError, PipelineReport, Stage, StageError, StageFailure,
};

use report::{DeploySnafu, PushSnafu, RevisionSnafu, WatchSnafu};
use snafu::{IntoError, ResultExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::control_plane::{self, ControlPlane, DeploymentRequest};
use crate::credentials::CredentialsProvider;
use crate::diagnostics::{Diagnostics, Warning};
use crate::registry::{RegistryClient, push_with_retry};
use crate::revision;
use crate::watch;

/// Runs the deployment pipeline against injected collaborators.
///
/// Holds no per-run state, so one instance can serve concurrent runs for
/// different services.
pub struct Pipeline<R, C, P> {
    registry: R,
    control_plane: C,
    credentials: P,
}

impl<R, C, P> Pipeline<R, C, P>
where
    R: RegistryClient,
    C: ControlPlane,
    P: CredentialsProvider,
{
    pub fn new(registry: R, control_plane: C, credentials: P) -> Self {
        Self {
            registry,
            control_plane,
            credentials,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn control_plane(&self) -> &C {
        &self.control_plane
    }

    /// Push, build the revision, submit it, and wait for it to become stable.
    pub async fn run(
        &self,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let mut report = PipelineReport::new(config.service.clone(), config.cluster.clone());
        let mut diagnostics = Diagnostics::default();

        tracing::info!(
            service = %config.service,
            cluster = %config.cluster,
            image = %config.image,
            "starting pipeline"
        );

        let result = self
            .stages(config, &cancel, &mut report, &mut diagnostics)
            .await;

        report.elapsed = started.elapsed();
        report.warnings = diagnostics.into_warnings();

        match result {
            Ok(()) => {
                report.outcome = Outcome::Stable;
                tracing::info!(
                    service = %config.service,
                    polls = report.polls,
                    elapsed = ?report.elapsed,
                    "service is stable"
                );
                Ok(report)
            }
            Err(source) => {
                report.outcome = if report.deployed() {
                    Outcome::DeployedButUnstable
                } else {
                    Outcome::Failed
                };
                let failure = source.failure();
                tracing::error!(
                    stage = %failure.stage,
                    kind = %failure.error_kind,
                    outcome = %report.outcome,
                    "{}",
                    failure.message
                );
                report.failure = Some(failure);
                Err(PipelineError {
                    stage: source.stage(),
                    source,
                    report: Box::new(report),
                })
            }
        }
    }

    async fn stages(
        &self,
        config: &PipelineConfig,
        cancel: &CancellationToken,
        report: &mut PipelineReport,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), StageError> {
        report.stage = Stage::Push;
        let pushed = push_with_retry(
            &self.registry,
            &config.image,
            &self.credentials,
            &config.retry_policy(),
            cancel,
        )
        .await
        .context(PushSnafu)?;
        report.image = pushed.pinned();

        report.stage = Stage::Revision;
        let overrides = config.revision_overrides().context(RevisionSnafu)?;
        let revision = revision::build(&config.service, &pushed, &overrides).context(RevisionSnafu)?;
        report.revision = Some(revision.id());

        report.stage = Stage::Deploy;
        let request = DeploymentRequest {
            cluster: config.cluster.clone(),
            service: config.service.clone(),
            revision,
            desired_count: config.desired_count,
        };
        let handle = control_plane::deploy(&self.control_plane, &request)
            .await
            .context(DeploySnafu)?;
        report.handle = Some(handle.clone());

        report.stage = Stage::Watch;
        let stable = match watch::watch(
            &self.control_plane,
            &handle,
            &config.watch_options(),
            cancel,
        )
        .await
        {
            Ok(stable) => stable,
            Err(e) => {
                report.polls = e.polls();
                report.status = e.last_status().cloned();
                return Err(WatchSnafu.into_error(e));
            }
        };
        report.polls = stable.polls;
        report.status = Some(stable.status);

        match self.control_plane.retire_previous(&handle).await {
            Ok(retired) => report.retired = retired,
            Err(e) => diagnostics.warn(Warning::retire_failed(format!(
                "could not retire previous revision of {}: {}",
                config.service, e
            ))),
        }

        Ok(())
    }
}
