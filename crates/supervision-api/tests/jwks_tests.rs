//! JWKS fetching and caching integration tests.
//!
//! Runs the key cache against a real HTTP endpoint (wiremock) to check
//! retries, stale serving during outages and single-flight refresh.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use supervision_api::auth::{HttpJwksFetcher, JwksCacheSettings, JwksClient, JwksFetcher};
use supervision_api::errors::KeyError;
use supervision_test_utils::{Ed25519Fixture, MockJwksServer, RsaFixture, JWKS_PATH};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(url: &str, settings: JwksCacheSettings) -> JwksClient {
    let fetcher = HttpJwksFetcher::new(url.to_string(), reqwest::Client::new());
    JwksClient::with_fetcher(Arc::new(fetcher), settings)
}

fn short_ttl() -> JwksCacheSettings {
    JwksCacheSettings {
        ttl: Duration::from_millis(50),
        max_stale: Duration::from_secs(60),
        min_refresh_interval: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_fetches_and_parses_mixed_key_types() {
    let rsa = RsaFixture::primary();
    let ed = Ed25519Fixture::new(7, "ed-key-07");
    let jwks = MockJwksServer::start(vec![rsa.jwk_json(), ed.jwk_json()]).await;
    let client = client_for(&jwks.url(), JwksCacheSettings::default());

    let key = client.get_key(rsa.kid()).await.unwrap();
    assert_eq!(key.kid(), rsa.kid());
    assert_eq!(key.algorithm(), jsonwebtoken::Algorithm::RS256);

    let key = client.get_key("ed-key-07").await.unwrap();
    assert_eq!(key.algorithm(), jsonwebtoken::Algorithm::EdDSA);

    assert_eq!(client.snapshot().await.unwrap().len(), 2);
    assert_eq!(jwks.received_fetches().await, 1);
}

#[tokio::test]
async fn test_unusable_keys_are_skipped() {
    let jwks = MockJwksServer::start(vec![
        serde_json::json!({ "kty": "oct", "kid": "hmac-key", "k": "c2VjcmV0" }),
        serde_json::json!({ "kty": "RSA", "n": "AQAB", "e": "AQAB" }),
        RsaFixture::primary().jwk_json(),
    ])
    .await;
    let client = client_for(&jwks.url(), JwksCacheSettings::default());

    client.force_refresh().await.unwrap();

    let set = client.snapshot().await.unwrap();
    assert_eq!(set.len(), 1);
    assert!(set.get(RsaFixture::primary().kid()).is_some());
    assert!(set.get("hmac-key").is_none());
}

#[tokio::test]
async fn test_cold_cache_with_key_service_down_is_unavailable() {
    let jwks = MockJwksServer::start(vec![]).await;
    jwks.fail_with(503).await;
    let client = client_for(&jwks.url(), JwksCacheSettings::default());

    let result = client.get_key(RsaFixture::primary().kid()).await;

    assert!(matches!(result, Err(KeyError::ServiceUnavailable(_))));
}

#[tokio::test]
async fn test_warm_cache_serves_stale_keys_during_outage() {
    let jwks = MockJwksServer::start(vec![RsaFixture::primary().jwk_json()]).await;
    let client = client_for(&jwks.url(), short_ttl());
    client.get_key(RsaFixture::primary().kid()).await.unwrap();

    jwks.fail_with(503).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let key = client.get_key(RsaFixture::primary().kid()).await;

    assert!(key.is_ok(), "stale key should be served, got {key:?}");
    // The expired cache did try to refresh
    assert!(jwks.received_fetches().await >= 1);
}

#[tokio::test]
async fn test_keys_older_than_max_stale_are_not_served() {
    let jwks = MockJwksServer::start(vec![RsaFixture::primary().jwk_json()]).await;
    let client = client_for(
        &jwks.url(),
        JwksCacheSettings {
            ttl: Duration::from_millis(20),
            max_stale: Duration::from_millis(40),
            min_refresh_interval: Duration::ZERO,
        },
    );
    client.get_key(RsaFixture::primary().kid()).await.unwrap();

    jwks.fail_with(503).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = client.get_key(RsaFixture::primary().kid()).await;

    assert!(matches!(result, Err(KeyError::ServiceUnavailable(_))));
}

#[tokio::test]
async fn test_expired_cache_refreshes_when_service_is_up() {
    let jwks = MockJwksServer::start(vec![RsaFixture::primary().jwk_json()]).await;
    let client = client_for(&jwks.url(), short_ttl());
    client.get_key(RsaFixture::primary().kid()).await.unwrap();
    let first = client.snapshot().await.unwrap().generation();

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.get_key(RsaFixture::primary().kid()).await.unwrap();

    let second = client.snapshot().await.unwrap().generation();
    assert_eq!(second, first + 1);
}

#[tokio::test]
async fn test_concurrent_cold_requests_share_one_fetch() {
    let jwks = MockJwksServer::start(vec![]).await;
    jwks.set_keys_with_delay(
        vec![RsaFixture::primary().jwk_json()],
        Duration::from_millis(200),
    )
    .await;
    let client = Arc::new(client_for(&jwks.url(), JwksCacheSettings::default()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_key(RsaFixture::primary().kid()).await })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(jwks.received_fetches().await, 1);
}

#[tokio::test]
async fn test_fetch_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "keys": [RsaFixture::primary().jwk_json()] })),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let fetcher = HttpJwksFetcher::new(
        format!("{}{}", server.uri(), JWKS_PATH),
        reqwest::Client::new(),
    );

    let jwks = fetcher.fetch().await.unwrap();

    assert_eq!(jwks.keys.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_attempts() {
    let jwks = MockJwksServer::start(vec![]).await;
    jwks.fail_with(500).await;
    let fetcher =
        HttpJwksFetcher::new(jwks.url(), reqwest::Client::new()).with_max_attempts(2);

    let result = fetcher.fetch().await;

    assert!(result.is_err());
    assert_eq!(jwks.received_fetches().await, 2);
}

#[tokio::test]
async fn test_fetch_does_not_retry_client_errors() {
    let jwks = MockJwksServer::start(vec![]).await;
    jwks.fail_with(404).await;
    let fetcher = HttpJwksFetcher::new(jwks.url(), reqwest::Client::new());

    let result = fetcher.fetch().await;

    assert!(result.is_err());
    assert_eq!(jwks.received_fetches().await, 1);
}

#[tokio::test]
async fn test_invalid_document_is_unavailable_on_cold_cache() {
    let jwks = MockJwksServer::start(vec![]).await;
    jwks.serve_garbage().await;
    let client = client_for(&jwks.url(), JwksCacheSettings::default());

    let result = client.get_key(RsaFixture::primary().kid()).await;

    assert!(matches!(result, Err(KeyError::ServiceUnavailable(_))));
    assert_eq!(jwks.received_fetches().await, 1);
}

#[tokio::test]
async fn test_failed_fetch_is_not_retried_within_min_refresh_interval() {
    let jwks = MockJwksServer::start(vec![]).await;
    jwks.fail_with(404).await;
    let client = client_for(&jwks.url(), JwksCacheSettings::default());

    for _ in 0..3 {
        let result = client.get_key(RsaFixture::primary().kid()).await;
        assert!(matches!(result, Err(KeyError::ServiceUnavailable(_))));
    }

    assert_eq!(jwks.received_fetches().await, 1);
}
