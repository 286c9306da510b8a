// ABOUTME: Container image reference parsing and validation.
// ABOUTME: Handles host/repo:tag and records the digest exactly once after a push.

use super::digest::{Digest, DigestError};
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Registry assumed when a reference names no host.
pub const DEFAULT_REGISTRY: &str = "docker.io";

#[derive(Debug, Error)]
pub enum ImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),

    #[error("image tag cannot be empty: {0}")]
    EmptyTag(String),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error("digest already recorded for {0}")]
    DigestAlreadySet(String),
}

/// A reference to an image in a registry.
///
/// Built images are referenced by tag; once pushed, the registry's content
/// digest is attached with [`ImageRef::with_digest`] and never changes again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ImageRefError::Empty);
        }

        if let Some(c) = input.chars().find(|c| {
            !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_' | '@')
        }) {
            return Err(ImageRefError::InvalidChar(c));
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) => (before, Some(Digest::parse(after)?)),
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag.
        let (without_tag, tag) = match without_digest.rsplit_once(':') {
            Some((_, after)) if after.contains('/') => (without_digest, None),
            Some((before, after)) => {
                if after.is_empty() {
                    return Err(ImageRefError::EmptyTag(input.to_string()));
                }
                (before, Some(after.to_string()))
            }
            None => (without_digest, None),
        };

        let (registry, repository) = split_registry(without_tag)?;

        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Registry host, `docker.io` when the reference names none.
    pub fn registry_host(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// Registry host exactly as written in the reference.
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// `host/repository` without tag or digest, as the engine API expects it.
    pub fn name(&self) -> String {
        match self.registry {
            Some(ref registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }

    /// `host/repository:tag`, when a tag is present.
    pub fn tagged(&self) -> Option<String> {
        self.tag.as_ref().map(|tag| format!("{}:{}", self.name(), tag))
    }

    /// `host/repository@digest`, the immutable form used in revisions.
    pub fn pinned(&self) -> Option<String> {
        self.digest
            .as_ref()
            .map(|digest| format!("{}@{}", self.name(), digest))
    }

    /// Record the digest returned by the registry.
    ///
    /// Fails if a digest was already recorded, even an identical one.
    pub fn with_digest(mut self, digest: Digest) -> Result<Self, ImageRefError> {
        if self.digest.is_some() {
            return Err(ImageRefError::DigestAlreadySet(self.to_string()));
        }
        self.digest = Some(digest);
        Ok(self)
    }
}

fn split_registry(input: &str) -> Result<(Option<String>, String), ImageRefError> {
    if input.is_empty() || input.starts_with('/') || input.ends_with('/') || input.contains("//")
    {
        return Err(ImageRefError::InvalidFormat(input.to_string()));
    }

    // The first component is a registry host if it looks like one
    // (has a dot or a port, or is localhost).
    match input.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            Ok((Some(first.to_string()), rest.to_string()))
        }
        _ => Ok((None, input.to_string())),
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
