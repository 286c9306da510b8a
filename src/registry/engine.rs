// ABOUTME: RegistryClient backed by the local container engine's push API.
// ABOUTME: Reads the content digest back from the image's RepoDigests after pushing.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::query_parameters::PushImageOptions;
use futures::StreamExt;

use super::{PushError, RegistryClient, check_pushable};
use crate::credentials::Credentials;
use crate::types::{DEFAULT_REGISTRY, Digest, ImageRef};

/// Pushes images the engine already holds (the output of an external build).
#[derive(Clone)]
pub struct EngineRegistry {
    client: Docker,
}

impl EngineRegistry {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Find the digest the registry assigned to `image`.
    async fn repo_digest(&self, image: &ImageRef, reference: &str) -> Result<Digest, PushError> {
        let details = self
            .client
            .inspect_image(reference)
            .await
            .map_err(|e| map_push_error(e, reference))?;

        pick_repo_digest(image, &details.repo_digests.unwrap_or_default())
    }
}

/// Select the `RepoDigests` entry for the registry and repository of `image`.
///
/// An image tagged for several registries lists one entry per registry; only
/// the one for the registry we pushed to counts.
fn pick_repo_digest(image: &ImageRef, repo_digests: &[String]) -> Result<Digest, PushError> {
    let name = image.name();
    repo_digests
        .iter()
        .filter_map(|entry| entry.split_once('@'))
        .find(|(repo, _)| same_repository(image, repo))
        .map(|(_, digest)| Digest::parse(digest))
        .transpose()
        .map_err(|e| PushError::RegistryRejected(format!("bad digest for {}: {}", name, e)))?
        .ok_or_else(|| {
            PushError::RegistryRejected(format!("registry reported no digest for {}", name))
        })
}

/// Whether a `RepoDigests` repository names the same host and path as `image`.
fn same_repository(image: &ImageRef, repo: &str) -> bool {
    let Ok(candidate) = ImageRef::parse(repo) else {
        return false;
    };
    candidate.registry_host() == image.registry_host()
        && hub_path(&candidate) == hub_path(image)
}

/// Repository path with Docker Hub's implicit `library/` namespace removed.
fn hub_path(image: &ImageRef) -> &str {
    let path = image.repository();
    if image.registry_host() == DEFAULT_REGISTRY {
        path.strip_prefix("library/").unwrap_or(path)
    } else {
        path
    }
}

#[async_trait]
impl RegistryClient for EngineRegistry {
    async fn push(
        &self,
        image: &ImageRef,
        credentials: Option<&Credentials>,
    ) -> Result<ImageRef, PushError> {
        let tag = check_pushable(image)?;
        let name = image.name();
        let reference = format!("{}:{}", name, tag);

        let opts = PushImageOptions {
            tag: Some(tag.to_string()),
            ..Default::default()
        };

        let credentials = credentials.map(|c| DockerCredentials {
            username: Some(c.username.clone()),
            password: Some(c.secret.clone()),
            serveraddress: c
                .server
                .clone()
                .or_else(|| Some(image.registry_host().to_string())),
            ..Default::default()
        });

        // Push returns a stream of progress updates; errors surface as items.
        let mut stream = self.client.push_image(&name, Some(opts), credentials);
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| map_push_error(e, &reference))?;
            tracing::trace!(?info, "push progress");
        }

        let digest = self.repo_digest(image, &reference).await?;
        image
            .clone()
            .with_digest(digest)
            .map_err(|e| PushError::RegistryRejected(e.to_string()))
    }
}

fn map_push_error(e: bollard::errors::Error, reference: &str) -> PushError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 401 || *status_code == 403 => {
            PushError::AuthFailure(format!("{}: {}", reference, message))
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => {
            PushError::RegistryRejected(format!("{} not found in engine: {}", reference, message))
        }
        bollard::errors::Error::DockerResponseServerError { message, .. } => {
            classify_message(reference, message)
        }
        bollard::errors::Error::DockerStreamError { error } => classify_message(reference, error),
        // Everything else is transport trouble between us and the engine.
        _ => PushError::NetworkFailure(format!("{}: {}", reference, e)),
    }
}

/// Sort a registry error message into auth, network or rejection.
fn classify_message(reference: &str, message: &str) -> PushError {
    const AUTH: &[&str] = &[
        "unauthorized",
        "authentication required",
        "denied",
        "forbidden",
        "no basic auth credentials",
    ];
    const NETWORK: &[&str] = &[
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "no such host",
        "tls handshake",
        "unexpected eof",
        "service unavailable",
    ];

    let lower = message.to_lowercase();
    let detail = format!("{}: {}", reference, message);
    if AUTH.iter().any(|needle| lower.contains(needle)) {
        PushError::AuthFailure(detail)
    } else if NETWORK.iter().any(|needle| lower.contains(needle)) {
        PushError::NetworkFailure(detail)
    } else {
        PushError::RegistryRejected(detail)
    }
}
