// ABOUTME: Opens an engine API client over the resolved unix socket.
// ABOUTME: Docker and Podman both speak the Docker-compatible API used here.

use bollard::Docker;

use super::detection::resolve;
use super::error::RuntimeError;
use super::types::{RuntimeConfig, RuntimeInfo};

/// Seconds the engine client waits for a single API call.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Resolve the configured engine and connect to it.
pub async fn connect(config: &RuntimeConfig) -> Result<(Docker, RuntimeInfo), RuntimeError> {
    let info = resolve(config)?;

    let client = Docker::connect_with_unix(
        &info.socket_path,
        CLIENT_TIMEOUT_SECS,
        bollard::API_DEFAULT_VERSION,
    )
    .map_err(|e| RuntimeError::Connection {
        socket: info.socket_path.clone(),
        message: e.to_string(),
    })?;

    client.ping().await.map_err(|e| RuntimeError::Connection {
        socket: info.socket_path.clone(),
        message: e.to_string(),
    })?;

    tracing::debug!(runtime = %info.runtime_type, socket = %info.socket_path, "connected to engine");
    Ok((client, info))
}
