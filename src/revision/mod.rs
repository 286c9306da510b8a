// ABOUTME: Builds immutable revision descriptors from a pushed image and overrides.
// ABOUTME: A revision always pins the image digest so re-deploys are reproducible.

mod resources;

pub use resources::ResourceLimits;

use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;

use crate::config::ResourcesConfig;
use crate::types::{ImageRef, RevisionId, ServiceName};

/// Label keys starting with this prefix are owned by the pipeline.
pub const RESERVED_LABEL_PREFIX: &str = "deploy-pipeline.";

/// Length of the hex revision id derived from the descriptor content.
const REVISION_ID_LEN: usize = 12;

/// Malformed revision input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("image {0} has no digest; push it before building a revision")]
    MissingDigest(String),

    #[error("environment variable '{0}' is set more than once")]
    DuplicateEnvKey(String),

    #[error("invalid environment variable name '{0}'")]
    InvalidEnvKey(String),

    #[error("invalid memory limit '{0}' (expected e.g. 512m or 1g)")]
    InvalidMemory(String),

    #[error("invalid cpu limit '{0}' (expected e.g. 0.5 or 2)")]
    InvalidCpus(String),

    #[error("environment value could not be resolved: {0} is not set")]
    UnresolvedEnv(String),
}

/// Per-deploy settings layered onto the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionOverrides {
    pub resources: Option<ResourcesConfig>,
    /// Resolved environment, in the order given. Keys must be unique.
    pub env: Vec<(String, String)>,
    pub labels: BTreeMap<String, String>,
}

/// A fully specified, immutable deployable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionDescriptor {
    service: ServiceName,
    image: ImageRef,
    resources: ResourceLimits,
    env: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
}

impl RevisionDescriptor {
    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// The image, always carrying its digest.
    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    /// `host/repo@digest`, the form handed to the control plane.
    pub fn pinned_image(&self) -> String {
        // build() refuses images without a digest
        self.image
            .pinned()
            .unwrap_or_else(|| self.image.to_string())
    }

    pub fn resources(&self) -> &ResourceLimits {
        &self.resources
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Content-derived id: equal descriptors always share an id.
    pub fn id(&self) -> RevisionId {
        // Serializing plain maps and strings cannot fail.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let hash = format!("{:x}", Sha256::digest(&canonical));
        RevisionId::new(&hash[..REVISION_ID_LEN])
    }
}

/// Build the revision for `service` running the pushed `image`.
///
/// Pure: the same inputs always give an equal descriptor.
pub fn build(
    service: &ServiceName,
    image: &ImageRef,
    overrides: &RevisionOverrides,
) -> Result<RevisionDescriptor, ConfigError> {
    if image.digest().is_none() {
        return Err(ConfigError::MissingDigest(image.to_string()));
    }

    let mut env = BTreeMap::new();
    for (key, value) in &overrides.env {
        validate_env_key(key)?;
        if env.insert(key.clone(), value.clone()).is_some() {
            return Err(ConfigError::DuplicateEnvKey(key.clone()));
        }
    }

    let resources = overrides
        .resources
        .as_ref()
        .map(ResourceLimits::from_config)
        .transpose()?
        .unwrap_or_default();

    Ok(RevisionDescriptor {
        service: service.clone(),
        image: image.clone(),
        resources,
        env,
        labels: overrides.labels.clone(),
    })
}

/// Environment names follow the POSIX shell convention.
pub fn validate_env_key(key: &str) -> Result<(), ConfigError> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvKey(key.to_string()))
    }
}
