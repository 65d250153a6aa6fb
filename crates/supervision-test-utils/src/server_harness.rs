//! Test server harness for E2E testing
//!
//! Provides `TestSupervisionServer` for spawning real Supervision API
//! instances in tests, pointed at a [`MockJwksServer`](crate::jwks_mock::MockJwksServer).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use supervision_api::auth::jwks::default_http_client;
use supervision_api::config::Config;
use supervision_api::middleware::AuthState;
use supervision_api::routes::{self, AppState};
use tokio::task::JoinHandle;

/// Issuer the test server expects.
pub const TEST_ISSUER: &str = "https://tenant.example.com/";

/// Audience the test server expects.
pub const TEST_AUDIENCE: &str = "https://supervision.example.com";

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics handle shared by every test server in the process.
///
/// Installs the global recorder on first use. If another recorder is
/// already installed, falls back to a standalone one.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            routes::init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Environment for a test server using `jwks_url`.
pub fn test_vars(jwks_url: &str) -> HashMap<String, String> {
    HashMap::from([
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("JWKS_URL".to_string(), jwks_url.to_string()),
        ("ISSUER".to_string(), TEST_ISSUER.to_string()),
        ("AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
    ])
}

/// Test harness for spawning the Supervision API in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_verify_e2e() -> Result<()> {
///     let jwks = MockJwksServer::start(vec![RsaFixture::primary().jwk_json()]).await;
///     let server = TestSupervisionServer::spawn(&jwks.url()).await?;
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/verify", server.url()))
///         .bearer_auth(token)
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSupervisionServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestSupervisionServer {
    /// Spawn a server with default settings verifying against `jwks_url`.
    pub async fn spawn(jwks_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(test_vars(jwks_url)).await
    }

    /// Spawn a server configured from `vars`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Build the real router from `supervision_api::routes`
    /// - Start the HTTP server in the background
    pub async fn spawn_with_vars(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        // Same client as production so key service timeouts match
        let auth_config = config
            .auth_config(default_http_client())
            .map_err(|e| anyhow::anyhow!("Failed to create auth config: {}", e))?;
        let auth = Arc::new(AuthState::from_config(&auth_config));

        let state = Arc::new(AppState { config, auth });
        let app = routes::build_routes(state.clone(), test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Shared application state, for inspecting the key cache.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestSupervisionServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_fixtures::RsaFixture;
    use crate::jwks_mock::MockJwksServer;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let jwks = MockJwksServer::start(vec![RsaFixture::primary().jwk_json()]).await;
        let server = TestSupervisionServer::spawn(&jwks.url()).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        Ok(())
    }

    #[tokio::test]
    async fn test_spawn_rejects_bad_config() {
        let mut vars = test_vars("http://127.0.0.1:1/jwks.json");
        vars.remove("ISSUER");

        let result = TestSupervisionServer::spawn_with_vars(vars).await;

        assert!(result.is_err());
    }
}
