// ABOUTME: Configuration types and parsing for deploy-pipeline.yml.
// ABOUTME: Handles YAML parsing, load-time validation and destination merging.

mod deserialize;
mod env_value;
mod init;

pub use env_value::{EnvValue, MissingEnvVar, resolve_env_map};
pub use init::init_config;

use deserialize::{
    deserialize_cluster_name, deserialize_cluster_name_option, deserialize_image_ref,
    deserialize_service_name,
};

use crate::error::{Error, Result};
use crate::registry::RetryPolicy;
use crate::revision::{self, ConfigError, RESERVED_LABEL_PREFIX, ResourceLimits, RevisionOverrides};
use crate::runtime::{RuntimeConfig, RuntimeType};
use crate::types::{ClusterName, ImageRef, ServiceName};
use crate::watch::WatchOptions;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "deploy-pipeline.yml";
pub const CONFIG_FILENAME_ALT: &str = "deploy-pipeline.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".deploy-pipeline/config.yml";

/// Everything one pipeline run needs, validated when loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(deserialize_with = "deserialize_cluster_name")]
    pub cluster: ClusterName,

    #[serde(deserialize_with = "deserialize_service_name")]
    pub service: ServiceName,

    /// Locally built image to push, referenced by tag.
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    #[serde(default = "default_desired_count", alias = "desiredCount")]
    pub desired_count: u32,

    /// Overall deadline for the service to become stable.
    #[serde(default = "default_timeout_seconds", alias = "timeoutSeconds")]
    pub timeout_seconds: u64,

    /// Spacing between status checks.
    #[serde(
        default = "default_poll_interval_seconds",
        alias = "pollIntervalSeconds"
    )]
    pub poll_interval_seconds: u64,

    /// Upper bound of the random delay added to every poll interval.
    #[serde(default = "default_poll_jitter", with = "humantime_serde")]
    pub poll_jitter: Duration,

    /// Consecutive failed status polls tolerated before giving up.
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub resources: Option<ResourcesConfig>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
}

/// Overrides applied on top of the base config with `--destination`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Destination {
    #[serde(default, deserialize_with = "deserialize_cluster_name_option")]
    pub cluster: Option<ClusterName>,

    #[serde(default, alias = "desiredCount")]
    pub desired_count: Option<u32>,

    #[serde(default, alias = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, alias = "pollIntervalSeconds")]
    pub poll_interval_seconds: Option<u64>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub resources: Option<ResourcesConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// Omit to push anonymously.
    #[serde(default)]
    pub credentials: Option<RegistryCredentialsConfig>,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryCredentialsConfig {
    pub username: EnvValue,
    pub password: EnvValue,
    /// Defaults to the image's registry host.
    #[serde(default)]
    pub server: Option<String>,
}

/// Retry policy for retryable push failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourcesConfig {
    /// e.g. "512m", "1g".
    pub memory: Option<String>,
    /// Fractional CPUs, e.g. "0.5".
    pub cpus: Option<String>,
}

/// Container engine acting as registry client and control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(default)]
    pub socket: Option<String>,

    /// Largest desired count the engine accepts for one service.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: u32,

    /// Whether a first deploy may create the service.
    #[serde(default = "default_create_services")]
    pub create_services: bool,

    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime: None,
            socket: None,
            max_tasks: default_max_tasks(),
            create_services: default_create_services(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

impl EngineConfig {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            runtime: self.runtime,
            socket: self.socket.clone(),
        }
    }
}

fn default_desired_count() -> u32 {
    1
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_poll_interval_seconds() -> u64 {
    15
}

fn default_poll_jitter() -> Duration {
    Duration::from_secs(1)
}

fn default_max_poll_failures() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_tasks() -> u32 {
    32
}

fn default_create_services() -> bool {
    true
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn for_destination(&self, name: &str) -> Result<PipelineConfig> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(ref cluster) = dest.cluster {
            merged.cluster = cluster.clone();
        }
        if let Some(count) = dest.desired_count {
            merged.desired_count = count;
        }
        if let Some(timeout) = dest.timeout_seconds {
            merged.timeout_seconds = timeout;
        }
        if let Some(interval) = dest.poll_interval_seconds {
            merged.poll_interval_seconds = interval;
        }

        // Deep merge env and labels
        for (k, v) in &dest.env {
            merged.env.insert(k.clone(), v.clone());
        }
        for (k, v) in &dest.labels {
            merged.labels.insert(k.clone(), v.clone());
        }

        if dest.resources.is_some() {
            merged.resources = dest.resources.clone();
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Reject configurations that could only fail later, mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.desired_count == 0 {
            return invalid("desired_count must be at least 1".to_string());
        }
        if self.poll_interval_seconds == 0 {
            return invalid("poll_interval_seconds must be at least 1".to_string());
        }
        if self.timeout_seconds < self.poll_interval_seconds {
            return invalid(format!(
                "timeout_seconds ({}) must not be shorter than poll_interval_seconds ({})",
                self.timeout_seconds, self.poll_interval_seconds
            ));
        }
        if self.image.digest().is_some() {
            return invalid(format!(
                "image {} must reference a tag; the digest is assigned by the push",
                self.image
            ));
        }
        if self.registry.retry.max_attempts == 0 {
            return invalid("registry.retry.max_attempts must be at least 1".to_string());
        }
        if !(self.registry.retry.multiplier >= 1.0) {
            return invalid("registry.retry.multiplier must be at least 1.0".to_string());
        }

        for key in self.env.keys() {
            revision::validate_env_key(key).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        }
        for key in self.labels.keys() {
            if key.is_empty() || key.starts_with(RESERVED_LABEL_PREFIX) {
                return invalid(format!("label key '{}' is empty or reserved", key));
            }
        }
        if let Some(ref resources) = self.resources {
            ResourceLimits::from_config(resources)
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        }

        Ok(())
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            timeout: Duration::from_secs(self.timeout_seconds),
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            jitter: self.poll_jitter,
            max_poll_failures: self.max_poll_failures,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.registry.retry;
        RetryPolicy {
            max_attempts: retry.max_attempts,
            initial_backoff: retry.initial_backoff,
            max_backoff: retry.max_backoff,
            multiplier: retry.multiplier,
        }
    }

    /// Resolve env values and collect the per-revision overrides.
    pub fn revision_overrides(&self) -> std::result::Result<RevisionOverrides, ConfigError> {
        let env = resolve_env_map(&self.env).map_err(|e| ConfigError::UnresolvedEnv(e.0))?;
        Ok(RevisionOverrides {
            resources: self.resources.clone(),
            env,
            labels: self.labels.clone(),
        })
    }

    pub fn template() -> Result<Self> {
        Ok(PipelineConfig {
            cluster: ClusterName::new("production").map_err(|e| Error::InvalidConfig(e.to_string()))?,
            service: ServiceName::new("my-app").map_err(|e| Error::InvalidConfig(e.to_string()))?,
            image: ImageRef::parse("registry.example.com/my-org/my-app:latest")
                .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            desired_count: default_desired_count(),
            timeout_seconds: default_timeout_seconds(),
            poll_interval_seconds: default_poll_interval_seconds(),
            poll_jitter: default_poll_jitter(),
            max_poll_failures: default_max_poll_failures(),
            registry: RegistryConfig::default(),
            resources: None,
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            engine: EngineConfig::default(),
            destinations: HashMap::new(),
        })
    }
}
