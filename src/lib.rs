// ABOUTME: Library root for deploy-pipeline - exposes the pipeline and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod control_plane;
pub mod credentials;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod revision;
pub mod runtime;
pub mod types;
pub mod watch;
