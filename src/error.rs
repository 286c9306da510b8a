// ABOUTME: Application-wide error types for deploy-pipeline.
// ABOUTME: Uses thiserror and maps each failure category to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::{PipelineError, Stage, StageFailure};
use crate::runtime::{RuntimeError, RuntimeErrorKind};

/// Exit code for configuration and other general failures.
pub const EXIT_GENERAL: i32 = 1;
/// Exit code when the push stage fails.
pub const EXIT_PUSH: i32 = 3;
/// Exit code when the deploy stage fails.
pub const EXIT_DEPLOY: i32 = 4;
/// Exit code when the watch stage fails (deployed but unstable).
pub const EXIT_WATCH: i32 = 5;
/// Exit code when the run was interrupted.
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Pipeline(#[from] Box<PipelineError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code distinguishing push, deploy and watch failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Pipeline(err) => err.exit_code(),
            _ => EXIT_GENERAL,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::AlreadyExists(_) => "already_exists",
            Error::ConfigNotFound(_) => "config_not_found",
            Error::UnknownDestination(_) => "unknown_destination",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Hook(_) => "hook_failed",
            Error::Runtime(err) => match err.kind() {
                RuntimeErrorKind::NoRuntimeFound => "no_runtime_found",
                RuntimeErrorKind::SocketMissing => "socket_missing",
                RuntimeErrorKind::ConnectionFailed => "engine_unavailable",
            },
            Error::Pipeline(err) => err.source.kind(),
            Error::Io(_) => "io",
            Error::Yaml(_) => "invalid_yaml",
        }
    }

    /// The user-visible failure; errors raised before the push belong to setup.
    pub fn failure(&self) -> StageFailure {
        match self {
            Error::Pipeline(err) => err.failure(),
            _ => StageFailure {
                stage: Stage::Setup,
                error_kind: self.kind().to_string(),
                message: self.to_string(),
            },
        }
    }
}

impl From<PipelineError> for Error {
    fn from(err: PipelineError) -> Self {
        Error::Pipeline(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
