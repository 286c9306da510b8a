// ABOUTME: Environment variable value types with interpolation support.
// ABOUTME: A value is either a literal or a reference to the invoking environment.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("missing required environment variable: {0}")]
pub struct MissingEnvVar(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String, MissingEnvVar> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default.clone().ok_or_else(|| MissingEnvVar(var.clone())),
            },
        }
    }
}

/// Resolve every value, keeping key order stable.
pub fn resolve_env_map(
    map: &BTreeMap<String, EnvValue>,
) -> Result<Vec<(String, String)>, MissingEnvVar> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}
