// ABOUTME: Integration tests for pushing with a caller-supplied retry policy.
// ABOUTME: Verifies retry limits, backoff timing, credential refresh and idempotence.

mod support;

use deploy_pipeline::config::{EnvValue, RegistryCredentialsConfig};
use deploy_pipeline::credentials::{Anonymous, ConfigCredentials};
use deploy_pipeline::registry::{PushError, PushFailure, RetryPolicy, push_with_retry};
use deploy_pipeline::types::ImageRef;
use std::time::Duration;
use support::FakeRegistry;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn image() -> ImageRef {
    ImageRef::parse("registry.example.com/acme/bookmanager:1.4.0").unwrap()
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_secs(2),
        max_backoff: Duration::from_secs(5),
        multiplier: 2.0,
    }
}

#[tokio::test(start_paused = true)]
async fn pushing_identical_content_twice_yields_the_same_digest() {
    let registry = FakeRegistry::content_addressed();

    let first = push_with_retry(
        &registry,
        &image(),
        &Anonymous,
        &policy(1),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    let second = push_with_retry(
        &registry,
        &image(),
        &Anonymous,
        &policy(1),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(first.digest().is_some());
    assert_eq!(first.digest(), second.digest());
    assert_eq!(registry.push_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn backoff_waits_between_attempts() {
    let registry = FakeRegistry::with_digest("sha256:abc").failing_first([
        PushError::NetworkFailure("reset".to_string()),
        PushError::NetworkFailure("reset".to_string()),
        PushError::NetworkFailure("reset".to_string()),
    ]);

    let started = Instant::now();
    let pushed = push_with_retry(
        &registry,
        &image(),
        &Anonymous,
        &policy(4),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // 2s + 4s + 5s (capped)
    assert_eq!(started.elapsed(), Duration::from_secs(11));
    assert_eq!(pushed.digest().unwrap().to_string(), "sha256:abc");
    assert_eq!(registry.push_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn retryable_failures_give_up_after_max_attempts() {
    let registry = FakeRegistry::with_digest("sha256:abc")
        .always_failing(PushError::AuthFailure("denied".to_string()));

    let err = push_with_retry(
        &registry,
        &image(),
        &Anonymous,
        &policy(3),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    match err {
        PushFailure::Push { source, attempts } => {
            assert_eq!(source, PushError::AuthFailure("denied".to_string()));
            assert_eq!(attempts, 3);
        }
        other => panic!("expected push failure, got {:?}", other),
    }
    assert_eq!(registry.push_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn rejection_is_not_retried() {
    let registry = FakeRegistry::with_digest("sha256:abc").failing_first([
        PushError::RegistryRejected("blob unknown".to_string()),
    ]);

    let err = push_with_retry(
        &registry,
        &image(),
        &Anonymous,
        &policy(5),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "registry_rejected");
    assert_eq!(registry.push_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn credentials_are_resolved_before_every_attempt() {
    let config = RegistryCredentialsConfig {
        username: EnvValue::Literal("ci".to_string()),
        password: EnvValue::FromEnv {
            var: "DEPLOY_PIPELINE_TEST_REGISTRY_TOKEN".to_string(),
            default: None,
        },
        server: None,
    };
    let provider = ConfigCredentials::new(&config, image().registry_host());
    let registry = FakeRegistry::with_digest("sha256:abc")
        .failing_first([PushError::AuthFailure("expired".to_string())]);

    temp_env::async_with_vars(
        [("DEPLOY_PIPELINE_TEST_REGISTRY_TOKEN", Some("t0k3n"))],
        async {
            push_with_retry(
                &registry,
                &image(),
                &provider,
                &policy(2),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        },
    )
    .await;

    assert_eq!(
        registry.credentials_seen(),
        vec![Some("ci".to_string()), Some("ci".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_secret_fails_without_pushing() {
    let config = RegistryCredentialsConfig {
        username: EnvValue::Literal("ci".to_string()),
        password: EnvValue::FromEnv {
            var: "DEPLOY_PIPELINE_TEST_MISSING_TOKEN".to_string(),
            default: None,
        },
        server: None,
    };
    let provider = ConfigCredentials::new(&config, "registry.example.com");
    let registry = FakeRegistry::with_digest("sha256:abc");

    let err = temp_env::async_with_vars(
        [("DEPLOY_PIPELINE_TEST_MISSING_TOKEN", None::<&str>)],
        async {
            push_with_retry(
                &registry,
                &image(),
                &provider,
                &policy(3),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err()
        },
    )
    .await;

    assert!(matches!(err, PushFailure::Credentials(_)));
    assert_eq!(err.kind(), "credentials");
    assert_eq!(registry.push_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_backoff() {
    let registry = FakeRegistry::with_digest("sha256:abc")
        .always_failing(PushError::NetworkFailure("reset".to_string()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = push_with_retry(&registry, &image(), &Anonymous, &policy(5), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PushFailure::Cancelled { attempts: 1 }));
    assert_eq!(err.kind(), "cancelled");
    assert_eq!(started.elapsed(), Duration::from_secs(1));
    assert_eq!(registry.push_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn already_cancelled_token_pushes_nothing() {
    let registry = FakeRegistry::with_digest("sha256:abc");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = push_with_retry(&registry, &image(), &Anonymous, &policy(3), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PushFailure::Cancelled { .. }));
    assert_eq!(registry.push_count(), 0);
}
