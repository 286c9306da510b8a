// ABOUTME: Runtime detection logic for the local system.
// ABOUTME: Checks for Podman sockets first, then Docker, unless configured explicitly.

use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use std::path::Path;

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("configured socket does not exist: {0}")]
    SocketMissing(String),
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Pick the engine to talk to.
///
/// An explicit `runtime` in the config wins (with its default socket unless
/// `socket` is also given). A bare `socket` is assumed to speak the Docker API.
/// Otherwise the local system is probed with [`detect_local`].
pub fn resolve(config: &RuntimeConfig) -> Result<RuntimeInfo, DetectionError> {
    let info = match (config.runtime, config.socket.as_ref()) {
        (Some(runtime_type), socket) => RuntimeInfo {
            runtime_type,
            socket_path: socket
                .cloned()
                .unwrap_or_else(|| default_socket_path(runtime_type)),
        },
        (None, Some(socket)) => RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket_path: socket.clone(),
        },
        (None, None) => return detect_local(),
    };

    if !Path::new(&info.socket_path).exists() {
        return Err(DetectionError::SocketMissing(info.socket_path));
    }
    Ok(info)
}

/// Detect container runtime on the local system.
///
/// Detection order:
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
pub fn detect_local() -> Result<RuntimeInfo, DetectionError> {
    if let Some(uid) = get_uid() {
        let rootless_socket = format!("/run/user/{}/podman/podman.sock", uid);
        if Path::new(&rootless_socket).exists() {
            return Ok(RuntimeInfo {
                runtime_type: RuntimeType::Podman,
                socket_path: rootless_socket,
            });
        }
    }

    if Path::new(ROOTFUL_PODMAN).exists() {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN.to_string(),
        });
    }

    if Path::new(DOCKER_SOCKET).exists() {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound)
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}

fn default_socket_path(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET.to_string(),
        RuntimeType::Podman => ROOTFUL_PODMAN.to_string(),
    }
}
