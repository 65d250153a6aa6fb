//! Mock identity provider JWKS endpoint.
//!
//! Wraps a wiremock server so integration tests can rotate keys, simulate
//! outages and count fetches against a real HTTP endpoint.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key document on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock JWKS endpoint backed by wiremock.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwksServer::start(vec![RsaFixture::primary().jwk_json()]).await;
/// let config = AuthConfig::builder().jwks_url(jwks.url()) /* ... */;
///
/// jwks.fail_with(503).await;
/// assert_eq!(jwks.received_fetches().await, 1);
/// ```
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server publishing `keys`.
    pub async fn start(keys: Vec<Value>) -> Self {
        let server = MockServer::start().await;
        let mock = Self { server };
        mock.mount_keys(keys, Duration::ZERO).await;
        mock
    }

    /// Full URL of the key document.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Replace the published key set. Resets the fetch counter.
    pub async fn set_keys(&self, keys: Vec<Value>) {
        self.server.reset().await;
        self.mount_keys(keys, Duration::ZERO).await;
    }

    /// Publish `keys` with added response latency. Resets the fetch counter.
    pub async fn set_keys_with_delay(&self, keys: Vec<Value>, delay: Duration) {
        self.server.reset().await;
        self.mount_keys(keys, delay).await;
    }

    /// Answer every fetch with `status` and no key document. Resets the
    /// fetch counter.
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer every fetch with a body that is not a key document.
    pub async fn serve_garbage(&self) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not jwks</html>"))
            .mount(&self.server)
            .await;
    }

    /// Number of requests received since the last reset.
    pub async fn received_fetches(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    async fn mount_keys(&self, keys: Vec<Value>, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": keys }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }
}
