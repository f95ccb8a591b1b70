// tests/publish_retry.rs
//
// Publisher retry and credential behavior against a scripted platform.
// Uses paused time so backoff is observable without sleeping.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use common::{refreshed_credential, valid_credential};
use news_autoposter::error::PublishError;
use news_autoposter::publish::credential::{Credential, MemoryCredentialStore, StaticRefresher};
use news_autoposter::publish::platform::{PostError, ScriptedPlatform};
use news_autoposter::publish::retry::RetryPolicy;
use news_autoposter::publish::Publisher;

struct Rig {
    publisher: Publisher,
    platform: Arc<ScriptedPlatform>,
    creds: Arc<MemoryCredentialStore>,
    refresher: Arc<StaticRefresher>,
}

fn rig(script: Vec<Result<String, PostError>>, credential: Option<Credential>) -> Rig {
    rig_with(script, credential, StaticRefresher::ok(refreshed_credential()))
}

fn rig_with(
    script: Vec<Result<String, PostError>>,
    credential: Option<Credential>,
    refresher: StaticRefresher,
) -> Rig {
    let platform = Arc::new(ScriptedPlatform::new(script));
    let creds = Arc::new(MemoryCredentialStore::new(credential));
    let refresher = Arc::new(refresher);
    let publisher = Publisher::new(platform.clone(), creds.clone(), Some(refresher.clone()))
        .with_retry(RetryPolicy::new(3, Duration::from_secs(1), Duration::ZERO));
    Rig {
        publisher,
        platform,
        creds,
        refresher,
    }
}

fn transient() -> Result<String, PostError> {
    Err(PostError::Transient("HTTP 503".into()))
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_failure_exhausts_after_three_tries() {
    let r = rig(vec![transient(), transient(), transient()], Some(valid_credential()));

    let started = tokio::time::Instant::now();
    let err = r.publisher.publish_content("hello").await.unwrap_err();

    match err {
        PublishError::RetriesExhausted { attempts, last_error } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(r.platform.calls(), 3);
    // 1s after the first failure, 2s after the second.
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn transient_then_success_returns_url() {
    let r = rig(
        vec![transient(), Ok("https://platform.example/posts/abc".into())],
        Some(valid_credential()),
    );

    let url = r.publisher.publish_content("hello").await.unwrap();

    assert_eq!(url, "https://platform.example/posts/abc");
    assert_eq!(r.platform.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejection_is_not_retried() {
    let r = rig(
        vec![Err(PostError::Rejected {
            status: 400,
            message: "duplicate post".into(),
        })],
        Some(valid_credential()),
    );

    let err = r.publisher.publish_content("hello").await.unwrap_err();

    assert!(matches!(err, PublishError::Rejected { status: 400, .. }));
    assert_eq!(r.platform.calls(), 1);
}

#[tokio::test]
async fn unauthorized_triggers_one_refresh_then_succeeds() {
    let r = rig(
        vec![Err(PostError::Unauthorized { status: 401 })],
        Some(valid_credential()),
    );

    let url = r.publisher.publish_content("hello").await.unwrap();

    assert!(url.starts_with("https://platform.example/posts/"));
    assert_eq!(r.refresher.calls(), 1);
    assert_eq!(
        r.platform.tokens_seen(),
        vec!["token-old".to_string(), "token-new".to_string()]
    );
}

#[tokio::test]
async fn unauthorized_after_refresh_gives_up() {
    let r = rig(
        vec![
            Err(PostError::Unauthorized { status: 401 }),
            Err(PostError::Unauthorized { status: 401 }),
        ],
        Some(valid_credential()),
    );

    let err = r.publisher.publish_content("hello").await.unwrap_err();

    assert!(matches!(err, PublishError::Unauthorized { status: 401 }));
    assert_eq!(r.refresher.calls(), 1);
    assert_eq!(r.platform.calls(), 2);
}

#[tokio::test]
async fn expired_without_refresh_token_never_calls_platform() {
    let expired = Credential::new("old", Utc::now() - ChronoDuration::minutes(1), None);
    let r = rig(Vec::new(), Some(expired));

    let err = r.publisher.publish_content("hello").await.unwrap_err();

    assert!(matches!(err, PublishError::CredentialExpired { .. }));
    assert_eq!(r.platform.calls(), 0);
    assert_eq!(r.refresher.calls(), 0);
}

#[tokio::test]
async fn near_expiry_without_refresh_token_still_posts() {
    let near = Credential::new("last-chance", Utc::now() + ChronoDuration::minutes(2), None);
    let r = rig(Vec::new(), Some(near));

    r.publisher.publish_content("hello").await.unwrap();

    assert_eq!(r.refresher.calls(), 0);
    assert_eq!(r.platform.tokens_seen(), vec!["last-chance".to_string()]);
}

#[tokio::test]
async fn proactive_refresh_is_persisted_before_posting() {
    let near = Credential::new(
        "token-old",
        Utc::now() + ChronoDuration::minutes(2),
        Some("refresh-1".into()),
    );
    let r = rig(Vec::new(), Some(near));

    r.publisher.publish_content("hello").await.unwrap();

    assert_eq!(r.refresher.calls(), 1);
    assert_eq!(r.platform.tokens_seen(), vec!["token-new".to_string()]);
    let stored = r.creds.snapshot().await.unwrap();
    assert_eq!(stored.access_token, "token-new");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn failed_refresh_leaves_stored_credential_alone() {
    let expired = Credential::new(
        "token-old",
        Utc::now() - ChronoDuration::minutes(1),
        Some("refresh-1".into()),
    );
    let r = rig_with(Vec::new(), Some(expired.clone()), StaticRefresher::failing(400));

    let err = r.publisher.publish_content("hello").await.unwrap_err();

    assert!(matches!(err, PublishError::CredentialExpired { .. }));
    assert_eq!(r.creds.snapshot().await, Some(expired));
    assert_eq!(r.platform.calls(), 0);
}

#[tokio::test]
async fn missing_credential_is_credential_expired() {
    let r = rig(Vec::new(), None);

    let err = r.publisher.publish_content("hello").await.unwrap_err();

    assert!(matches!(err, PublishError::CredentialExpired { .. }));
    let status = r.publisher.validate().await.unwrap();
    assert!(!status.valid);
    assert!(status.error.is_some());
}
