// ABOUTME: Test support utilities.
// ABOUTME: Provides tracing setup and scripted registry / control-plane doubles.

use async_trait::async_trait;
use deploy_pipeline::config::PipelineConfig;
use deploy_pipeline::control_plane::{
    ControlPlane, DeployError, DeploymentRequest, DeploymentStatus,
};
use deploy_pipeline::credentials::Credentials;
use deploy_pipeline::registry::{PushError, RegistryClient};
use deploy_pipeline::types::{DeploymentHandle, Digest, ImageRef};
use parking_lot::Mutex;
use sha2::{Digest as _, Sha256};
use std::collections::VecDeque;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("deploy_pipeline=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// The bookmanager scenario: two tasks, 300s deadline, 15s polls, no jitter.
#[allow(dead_code)]
pub fn bookmanager_config() -> PipelineConfig {
    PipelineConfig::from_yaml(
        r#"
cluster: production
service: bookmanager
image: registry.example.com/acme/bookmanager:1.4.0
desiredCount: 2
timeoutSeconds: 300
pollIntervalSeconds: 15
poll_jitter: 0s
"#,
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn status(desired: u32, running: u32, healthy: u32) -> DeploymentStatus {
    DeploymentStatus::counts(desired, running, healthy)
}

#[allow(dead_code)]
enum DigestSource {
    Fixed(Digest),
    /// sha256 of the tagged reference, standing in for image content.
    Content,
}

/// Registry double that records pushes and replays scripted failures.
#[allow(dead_code)]
pub struct FakeRegistry {
    digest: DigestSource,
    failures: Mutex<VecDeque<PushError>>,
    permanent: Option<PushError>,
    pushes: AtomicUsize,
    credentials_seen: Mutex<Vec<Option<String>>>,
}

#[allow(dead_code)]
impl FakeRegistry {
    pub fn with_digest(digest: &str) -> Self {
        Self::from_source(DigestSource::Fixed(Digest::parse(digest).unwrap()))
    }

    pub fn content_addressed() -> Self {
        Self::from_source(DigestSource::Content)
    }

    fn from_source(digest: DigestSource) -> Self {
        Self {
            digest,
            failures: Mutex::new(VecDeque::new()),
            permanent: None,
            pushes: AtomicUsize::new(0),
            credentials_seen: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next pushes with `errors`, in order, then succeed.
    pub fn failing_first(self, errors: impl IntoIterator<Item = PushError>) -> Self {
        self.failures.lock().extend(errors);
        self
    }

    /// Fail every push with `error`.
    pub fn always_failing(mut self, error: PushError) -> Self {
        self.permanent = Some(error);
        self
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Usernames presented on each push, `None` for anonymous pushes.
    pub fn credentials_seen(&self) -> Vec<Option<String>> {
        self.credentials_seen.lock().clone()
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn push(
        &self,
        image: &ImageRef,
        credentials: Option<&Credentials>,
    ) -> Result<ImageRef, PushError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen
            .lock()
            .push(credentials.map(|c| c.username.clone()));

        if let Some(ref error) = self.permanent {
            return Err(error.clone());
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let digest = match self.digest {
            DigestSource::Fixed(ref digest) => digest.clone(),
            DigestSource::Content => {
                let content = image.tagged().unwrap_or_default();
                let hash = format!("{:x}", Sha256::digest(content.as_bytes()));
                Digest::parse(&format!("sha256:{}", hash)).unwrap()
            }
        };

        image
            .clone()
            .with_digest(digest)
            .map_err(|e| PushError::RegistryRejected(e.to_string()))
    }
}

/// Control-plane double that hands out one handle and replays statuses.
///
/// Once the script runs out, the last successful status repeats.
#[allow(dead_code)]
pub struct ScriptedControlPlane {
    handle: DeploymentHandle,
    statuses: Mutex<VecDeque<Result<DeploymentStatus, DeployError>>>,
    last: Mutex<Option<DeploymentStatus>>,
    submit_error: Option<DeployError>,
    retire_error: Option<DeployError>,
    submitted: Mutex<Vec<DeploymentRequest>>,
    status_calls: AtomicUsize,
    retire_calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedControlPlane {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: DeploymentHandle::new(handle),
            statuses: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            submit_error: None,
            retire_error: None,
            submitted: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            retire_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_statuses(self, statuses: impl IntoIterator<Item = DeploymentStatus>) -> Self {
        self.statuses.lock().extend(statuses.into_iter().map(Ok));
        self
    }

    pub fn then_failing(self, error: DeployError, times: usize) -> Self {
        self.statuses
            .lock()
            .extend(std::iter::repeat_n(Err(error), times));
        self
    }

    pub fn rejecting_submissions(mut self, error: DeployError) -> Self {
        self.submit_error = Some(error);
        self
    }

    pub fn failing_retire(mut self, error: DeployError) -> Self {
        self.retire_error = Some(error);
        self
    }

    pub fn handle(&self) -> &DeploymentHandle {
        &self.handle
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().len()
    }

    pub fn submitted(&self) -> Vec<DeploymentRequest> {
        self.submitted.lock().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn retire_calls(&self) -> usize {
        self.retire_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for ScriptedControlPlane {
    async fn submit_revision(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentHandle, DeployError> {
        if let Some(ref error) = self.submit_error {
            return Err(error.clone());
        }
        self.submitted.lock().push(request.clone());
        Ok(self.handle.clone())
    }

    async fn get_status(
        &self,
        handle: &DeploymentHandle,
    ) -> Result<DeploymentStatus, DeployError> {
        assert_eq!(handle, &self.handle, "status requested for unknown handle");
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let next = self.statuses.lock().pop_front();
        match next {
            Some(Ok(status)) => {
                *self.last.lock() = Some(status.clone());
                Ok(status)
            }
            Some(Err(error)) => Err(error),
            None => self.last.lock().clone().ok_or_else(|| {
                DeployError::ControlPlaneUnavailable("no status scripted".to_string())
            }),
        }
    }

    async fn retire_previous(&self, _handle: &DeploymentHandle) -> Result<usize, DeployError> {
        self.retire_calls.fetch_add(1, Ordering::SeqCst);
        match self.retire_error {
            Some(ref error) => Err(error.clone()),
            None => Ok(0),
        }
    }
}
