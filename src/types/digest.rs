// ABOUTME: Content digest of a pushed image, e.g. sha256:9f86d081884c.
// ABOUTME: Validated once so image references can only ever pin well-formed digests.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest must have the form <algorithm>:<hex>, got '{0}'")]
    Malformed(String),

    #[error("invalid digest algorithm '{0}'")]
    InvalidAlgorithm(String),

    #[error("digest value must be lowercase hex, got '{0}'")]
    InvalidEncoding(String),
}

/// An immutable content address such as `sha256:abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    pub fn parse(input: &str) -> Result<Self, DigestError> {
        let input = input.trim();
        let (algorithm, encoded) = input
            .split_once(':')
            .ok_or_else(|| DigestError::Malformed(input.to_string()))?;

        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '+' || c == '.')
        {
            return Err(DigestError::InvalidAlgorithm(algorithm.to_string()));
        }

        if encoded.is_empty()
            || !encoded
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(DigestError::InvalidEncoding(encoded.to_string()));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            encoded: encoded.to_string(),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
