// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to keep deployment handles, revisions and tasks apart.

mod digest;
mod id;
mod image_ref;
mod names;

pub use digest::{Digest, DigestError};
pub use id::{DeploymentHandle, Id, RevisionId, TaskId};
pub use image_ref::{DEFAULT_REGISTRY, ImageRef, ImageRefError};
pub use names::{ClusterName, NameError, ServiceName};
