// ABOUTME: Retry loop around RegistryClient::push with exponential backoff.
// ABOUTME: The policy is supplied by the caller; nothing here retries on its own terms.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{PushError, RegistryClient};
use crate::credentials::{CredentialsError, CredentialsProvider};
use crate::types::ImageRef;

/// How often and how patiently to retry retryable push failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let factor = self.multiplier.max(1.0).powi(exponent as i32);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Why the push stage gave up.
#[derive(Debug, thiserror::Error)]
pub enum PushFailure {
    #[error("could not resolve registry credentials: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("{source} (after {attempts} attempt(s))")]
    Push { source: PushError, attempts: u32 },

    #[error("push cancelled during attempt {attempts}")]
    Cancelled { attempts: u32 },
}

impl PushFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            PushFailure::Credentials(_) => "credentials",
            PushFailure::Push { source, .. } => source.kind(),
            PushFailure::Cancelled { .. } => "cancelled",
        }
    }

    /// The registry error, if the registry was reached at all.
    pub fn push_error(&self) -> Option<&PushError> {
        match self {
            PushFailure::Push { source, .. } => Some(source),
            PushFailure::Credentials(_) | PushFailure::Cancelled { .. } => None,
        }
    }
}

/// Push `image`, retrying auth and network failures per `policy`.
///
/// Credentials are resolved again before every attempt so rotated tokens are
/// picked up between retries. Cancelling `cancel` abandons the attempt or
/// backoff in progress.
pub async fn push_with_retry<R, P>(
    client: &R,
    image: &ImageRef,
    credentials: &P,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ImageRef, PushFailure>
where
    R: RegistryClient + ?Sized,
    P: CredentialsProvider + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let creds = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PushFailure::Cancelled { attempts: attempt }),
            creds = credentials.resolve_credentials() => creds?,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PushFailure::Cancelled { attempts: attempt }),
            result = client.push(image, creds.as_ref()) => result,
        };

        match result {
            Ok(pushed) => {
                tracing::info!(image = %pushed, attempt, "image pushed");
                return Ok(pushed);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    image = %image,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "push failed, retrying: {}",
                    err
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(PushFailure::Cancelled { attempts: attempt });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(image = %image, attempt, "push failed: {}", err);
                return Err(PushFailure::Push {
                    source: err,
                    attempts: attempt,
                });
            }
        }
    }
}
