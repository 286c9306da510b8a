// ABOUTME: Registry client trait, push errors and the caller-supplied retry loop.
// ABOUTME: Only auth and network failures are retryable; rejections are terminal.

mod engine;
mod retry;

pub use engine::EngineRegistry;
pub use retry::{PushFailure, RetryPolicy, push_with_retry};

use async_trait::async_trait;

use crate::credentials::Credentials;
use crate::types::ImageRef;

/// Pushes tagged images and reports the registry's content digest.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Push `image` and return it with its digest recorded.
    ///
    /// Pushing identical content again must succeed with the same digest.
    async fn push(
        &self,
        image: &ImageRef,
        credentials: Option<&Credentials>,
    ) -> Result<ImageRef, PushError>;
}

/// Errors from pushing an image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("registry authentication failed: {0}")]
    AuthFailure(String),

    #[error("network failure talking to registry: {0}")]
    NetworkFailure(String),

    #[error("registry rejected image: {0}")]
    RegistryRejected(String),
}

impl PushError {
    /// Whether a caller may retry the push after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PushError::AuthFailure(_) | PushError::NetworkFailure(_))
    }

    /// Stable identifier used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PushError::AuthFailure(_) => "auth_failure",
            PushError::NetworkFailure(_) => "network_failure",
            PushError::RegistryRejected(_) => "registry_rejected",
        }
    }
}

/// Checks shared by every client before anything is uploaded.
pub(crate) fn check_pushable(image: &ImageRef) -> Result<&str, PushError> {
    if image.digest().is_some() {
        return Err(PushError::RegistryRejected(format!(
            "{} already carries a digest",
            image
        )));
    }
    match image.tag() {
        Some(tag) if !tag.is_empty() => Ok(tag),
        _ => Err(PushError::RegistryRejected(format!("{} has no tag", image))),
    }
}
