// ABOUTME: Validated service and cluster names.
// ABOUTME: Service names follow RFC 1123 labels so they double as network aliases.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("{0} name cannot be empty")]
    Empty(&'static str),

    #[error("{0} name exceeds maximum length of 63 characters")]
    TooLong(&'static str),

    #[error("{0} name cannot start or end with '{1}'")]
    BadEdge(&'static str, char),

    #[error("{0} name must be lowercase")]
    NotLowercase(&'static str),

    #[error("invalid character in {0} name: '{1}'")]
    InvalidChar(&'static str, char),
}

fn validate(value: &str, kind: &'static str, extra: &[char]) -> Result<(), NameError> {
    if value.is_empty() {
        return Err(NameError::Empty(kind));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong(kind));
    }

    for c in value.chars() {
        if c.is_ascii_uppercase() {
            return Err(NameError::NotLowercase(kind));
        }
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && !extra.contains(&c) {
            return Err(NameError::InvalidChar(kind, c));
        }
    }

    for edge in [value.chars().next(), value.chars().last()].into_iter().flatten() {
        if !edge.is_ascii_alphanumeric() {
            return Err(NameError::BadEdge(kind, edge));
        }
    }

    Ok(())
}

/// Name of the managed service being rolled to a new revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(value: &str) -> Result<Self, NameError> {
        validate(value, "service", &[])?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ServiceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Name of the cluster (control-plane scope) the service runs in.
///
/// Engine networks allow dots and underscores, so cluster names do too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterName(String);

impl ClusterName {
    pub fn new(value: &str) -> Result<Self, NameError> {
        validate(value, "cluster", &['_', '.'])?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ClusterName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
