// ABOUTME: Phantom-typed identifiers for compile-time type safety.
// ABOUTME: Keeps deployment handles, revision ids and task ids from being swapped.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
/// Empty enums cannot be instantiated and need no trait bounds.
pub enum DeploymentMarker {}
pub enum RevisionMarker {}
pub enum TaskMarker {}

/// An opaque identifier tagged with the kind of thing it identifies.
///
/// A `DeploymentHandle` returned by the control plane cannot be passed where a
/// `RevisionId` is expected, even though both wrap a string:
///
/// ```compile_fail,E0308
/// use deploy_pipeline::types::{DeploymentHandle, RevisionId};
///
/// fn takes_handle(_handle: DeploymentHandle) {}
///
/// takes_handle(RevisionId::new("0123456789ab"));
/// ```
///
/// Nor can a task id stand in for a handle:
///
/// ```compile_fail,E0308
/// use deploy_pipeline::types::{DeploymentHandle, TaskId};
///
/// let _handle: DeploymentHandle = TaskId::new("4f2a9c");
/// ```
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// First `len` characters, used for task names and log lines.
    pub fn short(&self, len: usize) -> &str {
        match self.value.char_indices().nth(len) {
            Some((idx, _)) => &self.value[..idx],
            None => &self.value,
        }
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// T is only a marker, so these are written by hand instead of derived
// (derive would demand T: Clone, T: Debug, ...).

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Correlates status polls with the submission that created them.
pub type DeploymentHandle = Id<DeploymentMarker>;
/// Content-derived identifier of a revision descriptor.
pub type RevisionId = Id<RevisionMarker>;
/// A single running instance of a revision.
pub type TaskId = Id<TaskMarker>;
