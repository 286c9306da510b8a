// ABOUTME: Container engine discovery and connection.
// ABOUTME: The engine backs both the registry client and the control plane.

mod connect;
mod detection;
mod error;
mod types;

pub use connect::connect;
pub use detection::{DetectionError, detect_local, resolve};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};
