// ABOUTME: Property and integration tests for building revision descriptors.
// ABOUTME: Checks purity, digest pinning and content-derived revision ids.

use deploy_pipeline::config::ResourcesConfig;
use deploy_pipeline::revision::{self, ConfigError, RevisionOverrides};
use deploy_pipeline::types::{Digest, ImageRef, ServiceName};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn pushed(digest_hex: &str) -> ImageRef {
    ImageRef::parse("registry.example.com/acme/bookmanager:1.4.0")
        .unwrap()
        .with_digest(Digest::parse(&format!("sha256:{}", digest_hex)).unwrap())
        .unwrap()
}

fn service() -> ServiceName {
    ServiceName::new("bookmanager").unwrap()
}

fn env_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[A-Z_][A-Z0-9_]{0,12}", "[ -~]{0,16}", 0..6)
}

proptest! {
    #[test]
    fn build_is_pure(
        digest in "[0-9a-f]{64}",
        env in env_strategy(),
        labels in prop::collection::btree_map("[a-z][a-z.]{0,10}", "[a-z0-9]{0,8}", 0..4),
    ) {
        let overrides = RevisionOverrides {
            resources: None,
            env: env.into_iter().collect(),
            labels,
        };

        let first = revision::build(&service(), &pushed(&digest), &overrides).unwrap();
        let second = revision::build(&service(), &pushed(&digest), &overrides).unwrap();

        prop_assert_eq!(first.id(), second.id());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn descriptor_always_references_the_digest(digest in "[0-9a-f]{64}") {
        let descriptor =
            revision::build(&service(), &pushed(&digest), &RevisionOverrides::default()).unwrap();

        let expected_suffix = format!("@sha256:{}", digest);
        prop_assert!(descriptor.pinned_image().ends_with(&expected_suffix));
        prop_assert_eq!(descriptor.id().as_str().len(), 12);
    }

    #[test]
    fn different_digests_give_different_ids(a in "[0-9a-f]{64}", b in "[0-9a-f]{64}") {
        prop_assume!(a != b);
        let overrides = RevisionOverrides::default();
        let first = revision::build(&service(), &pushed(&a), &overrides).unwrap();
        let second = revision::build(&service(), &pushed(&b), &overrides).unwrap();
        prop_assert_ne!(first.id(), second.id());
    }
}

#[test]
fn resources_are_converted() {
    let overrides = RevisionOverrides {
        resources: Some(ResourcesConfig {
            memory: Some("512m".to_string()),
            cpus: Some("0.5".to_string()),
        }),
        ..Default::default()
    };

    let descriptor = revision::build(&service(), &pushed("abc"), &overrides).unwrap();
    assert_eq!(descriptor.resources().memory_bytes, Some(512 * 1024 * 1024));
    assert_eq!(descriptor.resources().cpu_millis, Some(500));
    assert_eq!(descriptor.resources().nano_cpus(), Some(500_000_000));
}

#[test]
fn tag_only_image_cannot_become_a_revision() {
    let image = ImageRef::parse("registry.example.com/acme/bookmanager:1.4.0").unwrap();
    let err = revision::build(&service(), &image, &RevisionOverrides::default()).unwrap_err();
    assert_eq!(
        err,
        ConfigError::MissingDigest("registry.example.com/acme/bookmanager:1.4.0".to_string())
    );
}

#[test]
fn invalid_env_key_is_rejected() {
    let overrides = RevisionOverrides {
        env: vec![("DB-URL".to_string(), "postgres://db".to_string())],
        ..Default::default()
    };
    let err = revision::build(&service(), &pushed("abc"), &overrides).unwrap_err();
    assert_eq!(err, ConfigError::InvalidEnvKey("DB-URL".to_string()));
}
