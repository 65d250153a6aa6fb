//! Authorization configuration.
//!
//! `AuthConfig` is assembled once at startup with [`AuthConfigBuilder`] and
//! is immutable afterwards.

use crate::auth::jwks::{
    default_http_client, JwksCacheSettings, JwksFetcher, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_MAX_STALE, DEFAULT_MIN_REFRESH_INTERVAL,
};
use crate::auth::policy::RoutePolicy;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from [`AuthConfigBuilder::build`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthConfigError {
    #[error("Missing required auth setting: {0}")]
    Missing(&'static str),

    #[error("Clock skew must be between 1 and {max} seconds, got {got}")]
    ClockSkewOutOfRange { got: u64, max: u64 },

    #[error("Maximum staleness ({max_stale}s) must not be shorter than the cache TTL ({ttl}s)")]
    StaleShorterThanTtl { max_stale: u64, ttl: u64 },

    #[error("Key fetch timeout must be greater than zero")]
    ZeroFetchTimeout,
}

/// Where signing keys come from.
#[derive(Clone)]
pub enum KeySource {
    /// HTTP key endpoint.
    Url {
        jwks_url: String,
        http_client: reqwest::Client,
    },
    /// Any fetcher (tests, alternative transports).
    Fetcher(Arc<dyn JwksFetcher>),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Url { jwks_url, .. } => f.debug_struct("Url").field("jwks_url", jwks_url).finish_non_exhaustive(),
            KeySource::Fetcher(_) => f.write_str("Fetcher(..)"),
        }
    }
}

/// Configuration of the authorization layer.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    issuer: String,
    audience: String,
    key_source: KeySource,
    allow_unmatched: bool,
    clock_skew: Duration,
    cache: JwksCacheSettings,
    fetch_timeout: Duration,
    routes: RoutePolicy,
}

impl AuthConfig {
    /// Start building a configuration.
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Required `iss` claim.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audience that must appear in `aud`.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Signing key source.
    pub fn key_source(&self) -> &KeySource {
        &self.key_source
    }

    /// Whether denied requests pass through instead of being rejected.
    pub fn allow_unmatched(&self) -> bool {
        self.allow_unmatched
    }

    /// Tolerance for `nbf`/`iat` in the future.
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// JWKS cache timing.
    pub fn cache(&self) -> JwksCacheSettings {
        self.cache
    }

    /// Deadline for one key refresh, retries included.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Route requirements.
    pub fn routes(&self) -> &RoutePolicy {
        &self.routes
    }
}

/// Builder for [`AuthConfig`].
///
/// # Example
///
/// ```rust,ignore
/// let config = AuthConfig::builder()
///     .issuer("https://tenant.example.com/")
///     .audience("https://supervision.example.com")
///     .jwks_url("https://tenant.example.com/.well-known/jwks.json")
///     .route("GET", "/getGantt/:id", &["read:student", "read:supervisor"])
///     .build()?;
/// ```
#[derive(Default)]
pub struct AuthConfigBuilder {
    issuer: Option<String>,
    audience: Option<String>,
    jwks_url: Option<String>,
    http_client: Option<reqwest::Client>,
    fetcher: Option<Arc<dyn JwksFetcher>>,
    allow_unmatched: bool,
    clock_skew: Option<Duration>,
    cache_ttl: Option<Duration>,
    max_stale: Option<Duration>,
    min_refresh_interval: Option<Duration>,
    fetch_timeout: Option<Duration>,
    routes: RoutePolicy,
}

impl AuthConfigBuilder {
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        self.jwks_url = Some(jwks_url.into());
        self
    }

    /// HTTP client for the key endpoint (default: 3s per attempt).
    pub fn http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Use `fetcher` instead of the HTTP key endpoint.
    pub fn fetcher(mut self, fetcher: Arc<dyn JwksFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Let denied requests through to the handler (default: false).
    /// Infrastructure failures are still rejected.
    pub fn allow_unmatched(mut self, allow_unmatched: bool) -> Self {
        self.allow_unmatched = allow_unmatched;
        self
    }

    pub fn clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = Some(clock_skew);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = Some(max_stale);
        self
    }

    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = Some(interval);
        self
    }

    /// Give up on a key refresh after `timeout` (default: 10s). Keep this
    /// below the request timeout so a hung key service yields a 500.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Register one route requirement.
    pub fn route(mut self, method: &str, pattern: &str, scopes: &[&str]) -> Self {
        self.routes.register(method, pattern, scopes.iter().copied());
        self
    }

    /// Register every route of `routes`, after those already registered.
    pub fn routes(mut self, routes: RoutePolicy) -> Self {
        for route in routes.routes() {
            self.routes
                .register(route.method(), route.pattern(), route.scopes().iter().cloned());
        }
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    ///
    /// - `Missing` if issuer, audience, or a key source is absent
    /// - `ClockSkewOutOfRange` if the skew is zero or above the maximum
    /// - `StaleShorterThanTtl` if `max_stale < cache_ttl`
    /// - `ZeroFetchTimeout` if the fetch timeout is zero
    pub fn build(self) -> Result<AuthConfig, AuthConfigError> {
        let issuer = self
            .issuer
            .filter(|s| !s.is_empty())
            .ok_or(AuthConfigError::Missing("issuer"))?;
        let audience = self
            .audience
            .filter(|s| !s.is_empty())
            .ok_or(AuthConfigError::Missing("audience"))?;

        let key_source = match (self.fetcher, self.jwks_url.filter(|s| !s.is_empty())) {
            (Some(fetcher), _) => KeySource::Fetcher(fetcher),
            (None, Some(jwks_url)) => KeySource::Url {
                jwks_url,
                http_client: self.http_client.unwrap_or_else(default_http_client),
            },
            (None, None) => return Err(AuthConfigError::Missing("jwks_url")),
        };

        let clock_skew = self.clock_skew.unwrap_or(DEFAULT_CLOCK_SKEW);
        if clock_skew.is_zero() || clock_skew > MAX_CLOCK_SKEW {
            return Err(AuthConfigError::ClockSkewOutOfRange {
                got: clock_skew.as_secs(),
                max: MAX_CLOCK_SKEW.as_secs(),
            });
        }

        let cache = JwksCacheSettings {
            ttl: self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
            max_stale: self.max_stale.unwrap_or(DEFAULT_MAX_STALE),
            min_refresh_interval: self
                .min_refresh_interval
                .unwrap_or(DEFAULT_MIN_REFRESH_INTERVAL),
        };
        if cache.max_stale < cache.ttl {
            return Err(AuthConfigError::StaleShorterThanTtl {
                max_stale: cache.max_stale.as_secs(),
                ttl: cache.ttl.as_secs(),
            });
        }

        let fetch_timeout = self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT);
        if fetch_timeout.is_zero() {
            return Err(AuthConfigError::ZeroFetchTimeout);
        }

        Ok(AuthConfig {
            issuer,
            audience,
            key_source,
            allow_unmatched: self.allow_unmatched,
            clock_skew,
            cache,
            fetch_timeout,
            routes: self.routes,
        })
    }
}
