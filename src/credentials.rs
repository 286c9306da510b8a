// ABOUTME: Registry credentials and the providers that resolve them.
// ABOUTME: The pipeline receives a provider, never raw secret material.

use async_trait::async_trait;
use std::fmt;

use crate::config::{EnvValue, MissingEnvVar, RegistryCredentialsConfig};

/// Credentials for a single registry host.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
    /// Registry server the credentials are scoped to (e.g. "ghcr.io").
    pub server: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error(transparent)]
    MissingEnvVar(#[from] MissingEnvVar),

    #[error("credential provider failed: {0}")]
    Provider(String),
}

/// Resolves registry credentials on demand.
///
/// `Ok(None)` means the push should be attempted anonymously.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn resolve_credentials(&self) -> Result<Option<Credentials>, CredentialsError>;
}

/// Push without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl CredentialsProvider for Anonymous {
    async fn resolve_credentials(&self) -> Result<Option<Credentials>, CredentialsError> {
        Ok(None)
    }
}

/// Always hands out the same credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn resolve_credentials(&self) -> Result<Option<Credentials>, CredentialsError> {
        Ok(Some(self.0.clone()))
    }
}

#[async_trait]
impl<T: CredentialsProvider + ?Sized> CredentialsProvider for Box<T> {
    async fn resolve_credentials(&self) -> Result<Option<Credentials>, CredentialsError> {
        (**self).resolve_credentials().await
    }
}

/// Resolves `registry.credentials` from the config file at call time,
/// so values taken from the environment are read fresh on every attempt.
#[derive(Debug, Clone)]
pub struct ConfigCredentials {
    username: EnvValue,
    password: EnvValue,
    server: Option<String>,
}

impl ConfigCredentials {
    pub fn new(config: &RegistryCredentialsConfig, default_server: &str) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            server: Some(
                config
                    .server
                    .clone()
                    .unwrap_or_else(|| default_server.to_string()),
            ),
        }
    }
}

#[async_trait]
impl CredentialsProvider for ConfigCredentials {
    async fn resolve_credentials(&self) -> Result<Option<Credentials>, CredentialsError> {
        Ok(Some(Credentials {
            username: self.username.resolve()?,
            secret: self.password.resolve()?,
            server: self.server.clone(),
        }))
    }
}
