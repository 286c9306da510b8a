// ABOUTME: Compile-pass test for the intended use of typed identifiers.
// ABOUTME: Converting between id kinds compiles only through an explicit re-wrap.

use deploy_pipeline::types::{DeploymentHandle, RevisionId, TaskId};

fn takes_handle(handle: &DeploymentHandle) -> &str {
    handle.as_str()
}

fn main() {
    let handle = DeploymentHandle::new("bookmanager-0123abcd-18c");
    assert_eq!(takes_handle(&handle), "bookmanager-0123abcd-18c");

    let revision = RevisionId::new("0123456789ab");
    let rewrapped = DeploymentHandle::new(revision.into_inner());
    assert_eq!(takes_handle(&rewrapped), "0123456789ab");

    let task = TaskId::new("4f2a9c");
    assert_eq!(task.short(2), "4f");
}
