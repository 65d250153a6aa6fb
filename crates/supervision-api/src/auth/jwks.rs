//! JWKS client for fetching and caching the issuer's public signing keys.
//!
//! The JWKS (JSON Web Key Set) client fetches public keys from the identity
//! provider's key endpoint and caches them as an immutable [`KeySet`].
//!
//! # Caching
//!
//! - The current key set lives behind `RwLock<Option<Arc<KeySet>>>` and is
//!   replaced wholesale on refresh; readers clone the `Arc` snapshot
//! - Refreshes are single-flight: a `Mutex` serializes them and a
//!   generation number lets waiters observe a refresh that completed while
//!   they queued instead of fetching again
//! - A key present in an expired set is served from it while another caller
//!   refreshes
//! - On fetch failure the previous set is served for up to `max_stale`;
//!   only without a usable set does the lookup fail as unavailable
//! - A kid missing from a set fetched less than `min_refresh_interval` ago
//!   is `NotFound` without another fetch
//!
//! # Cancellation
//!
//! The fetch runs inside the caller's future. Dropping the caller (request
//! cancelled or timed out) drops the in-flight HTTP request and releases
//! the refresh lock.

use crate::errors::KeyError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::jwt::{decode_jwk_member, is_asymmetric};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::instrument;

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default bound on how long a key set may be served after a failed refresh.
pub const DEFAULT_MAX_STALE: Duration = Duration::from_secs(3600);

/// Default minimum age of a key set before an unknown kid triggers a refetch.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Default deadline for one refresh, retries included. Kept well under the
/// 30 second request timeout so a hanging key service surfaces as
/// `ServiceUnavailable` instead of a dropped request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-attempt timeout for the key endpoint.
const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of fetch attempts per refresh.
const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Initial backoff between fetch attempts.
const INITIAL_BACKOFF_MS: u64 = 100;

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is meant for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (must be "sig" when present).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC/OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document returned by the key endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Reasons a published JWK is not usable for verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JwkError {
    #[error("JWK has no kid")]
    MissingKid,

    #[error("JWK is not a signing key (use={0})")]
    NotSigningKey(String),

    #[error("unsupported JWK key type or curve: {0}")]
    UnsupportedKeyType(String),

    #[error("unsupported JWK algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("JWK algorithm does not match key type")]
    AlgorithmMismatch,

    #[error("JWK missing member: {0}")]
    MissingMember(&'static str),

    #[error("JWK has invalid key material")]
    InvalidKeyMaterial,
}

/// A public verification key with its identifier and algorithm.
///
/// The algorithm comes from the issuer's key set, never from a token header.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Build a verification key from a published JWK.
    ///
    /// # Errors
    ///
    /// Returns a [`JwkError`] when the JWK lacks a kid, is not a signing key,
    /// uses a symmetric or unknown algorithm, or its key material is invalid.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JwkError> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(JwkError::MissingKid)?
            .to_string();

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(JwkError::NotSigningKey(key_use.to_string()));
            }
        }

        let algorithm = match jwk.alg.as_deref() {
            Some(alg) => Algorithm::from_str(alg)
                .map_err(|_| JwkError::UnsupportedAlgorithm(alg.to_string()))?,
            None => default_algorithm(jwk)?,
        };

        if !is_asymmetric(algorithm) {
            return Err(JwkError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }

        let crv = jwk.crv.as_deref();
        let decoding_key = match (jwk.kty.as_str(), algorithm) {
            (
                "RSA",
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
            ) => {
                let n = jwk.n.as_deref().ok_or(JwkError::MissingMember("n"))?;
                let e = jwk.e.as_deref().ok_or(JwkError::MissingMember("e"))?;
                DecodingKey::from_rsa_components(n, e).map_err(|_| JwkError::InvalidKeyMaterial)?
            }
            ("EC", Algorithm::ES256) if crv == Some("P-256") => ec_key(jwk)?,
            ("EC", Algorithm::ES384) if crv == Some("P-384") => ec_key(jwk)?,
            ("OKP", Algorithm::EdDSA) if crv.is_none() || crv == Some("Ed25519") => {
                let x = jwk.x.as_deref().ok_or(JwkError::MissingMember("x"))?;
                let public_key = decode_jwk_member(x).map_err(|_| JwkError::InvalidKeyMaterial)?;
                if public_key.len() != 32 {
                    return Err(JwkError::InvalidKeyMaterial);
                }
                DecodingKey::from_ed_der(&public_key)
            }
            _ => return Err(JwkError::AlgorithmMismatch),
        };

        Ok(Self {
            kid,
            algorithm,
            decoding_key,
        })
    }

    /// Key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm this key verifies.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

fn ec_key(jwk: &Jwk) -> Result<DecodingKey, JwkError> {
    let x = jwk.x.as_deref().ok_or(JwkError::MissingMember("x"))?;
    let y = jwk.y.as_deref().ok_or(JwkError::MissingMember("y"))?;
    DecodingKey::from_ec_components(x, y).map_err(|_| JwkError::InvalidKeyMaterial)
}

/// Algorithm implied by a JWK that does not declare `alg`.
fn default_algorithm(jwk: &Jwk) -> Result<Algorithm, JwkError> {
    match (jwk.kty.as_str(), jwk.crv.as_deref()) {
        ("RSA", _) => Ok(Algorithm::RS256),
        ("EC", Some("P-256")) => Ok(Algorithm::ES256),
        ("EC", Some("P-384")) => Ok(Algorithm::ES384),
        ("OKP", Some("Ed25519")) => Ok(Algorithm::EdDSA),
        (kty, crv) => Err(JwkError::UnsupportedKeyType(format!(
            "{kty}/{}",
            crv.unwrap_or("-")
        ))),
    }
}

/// An immutable snapshot of the issuer's signing keys.
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
    generation: u64,
}

impl KeySet {
    /// Build a key set from a JWKS document, skipping unusable keys.
    pub fn from_jwks(jwks: JwksResponse, generation: u64) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());

        for jwk in &jwks.keys {
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(
                        target: "api.auth.jwks",
                        kid = ?jwk.kid,
                        kty = %jwk.kty,
                        error = %e,
                        "Skipping unusable JWK"
                    );
                }
            }
        }

        Self {
            keys,
            fetched_at: Instant::now(),
            generation,
        }
    }

    /// Look up a key by ID.
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no usable keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Refresh counter; increases by one with every successful fetch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time since this set was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Errors from fetching the key set document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("key endpoint request failed: {0}")]
    Transport(String),

    #[error("key endpoint returned status {0}")]
    Status(u16),

    #[error("key endpoint returned an invalid document: {0}")]
    InvalidDocument(String),

    #[error("key endpoint did not answer within {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(status) => *status >= 500 || *status == 429,
            FetchError::InvalidDocument(_) | FetchError::Timeout(_) => false,
        }
    }
}

/// Source of the issuer's key set document (enables mocking).
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetch the current JWKS document.
    async fn fetch(&self) -> Result<JwksResponse, FetchError>;
}

/// Fetches the key set over HTTP, retrying transient failures.
pub struct HttpJwksFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Attempts per fetch, including the first.
    max_attempts: u32,
}

impl HttpJwksFetcher {
    /// Create a fetcher using the given HTTP client.
    pub fn new(jwks_url: String, http_client: reqwest::Client) -> Self {
        Self {
            jwks_url,
            http_client,
            max_attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }

    /// Override the number of attempts per fetch (minimum 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    async fn fetch_once(&self) -> Result<JwksResponse, FetchError> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<JwksResponse>()
            .await
            .map_err(|e| FetchError::InvalidDocument(e.to_string()))
    }
}

/// HTTP client used when configuration does not supply one.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "api.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        })
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    #[instrument(skip_all, fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<JwksResponse, FetchError> {
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut attempt = 1;

        loop {
            tracing::debug!(target: "api.auth.jwks", attempt, "Fetching JWKS");

            match self.fetch_once().await {
                Ok(jwks) => return Ok(jwks),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        target: "api.auth.jwks",
                        error = %e,
                        attempt,
                        backoff_ms = backoff,
                        "JWKS fetch failed, will retry"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Cache timing for [`JwksClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JwksCacheSettings {
    /// Age after which the key set is refreshed on next access.
    pub ttl: Duration,

    /// Age after which a key set is no longer served when refresh fails.
    pub max_stale: Duration,

    /// Minimum key set age before an unknown kid or a failed fetch may
    /// cause another fetch.
    pub min_refresh_interval: Duration,
}

impl Default for JwksCacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            max_stale: DEFAULT_MAX_STALE,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }
}

/// State owned by whoever holds the refresh lock.
#[derive(Default)]
struct RefreshState {
    last_failure: Option<Instant>,
}

/// JWKS client for fetching and caching public keys.
pub struct JwksClient {
    fetcher: Arc<dyn JwksFetcher>,
    cache: RwLock<Option<Arc<KeySet>>>,
    refresh_lock: Mutex<RefreshState>,
    settings: JwksCacheSettings,
    fetch_timeout: Duration,
}

impl JwksClient {
    /// Create a JWKS client over any key source.
    pub fn with_fetcher(fetcher: Arc<dyn JwksFetcher>, settings: JwksCacheSettings) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(RefreshState::default()),
            settings,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the deadline for one refresh, retries included.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Deadline for one refresh.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Cache settings in effect.
    pub fn settings(&self) -> JwksCacheSettings {
        self.settings
    }

    /// Current key set snapshot, if any has been fetched.
    pub async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.cache.read().await.clone()
    }

    /// Get a signing key by key ID.
    ///
    /// # Errors
    ///
    /// - `KeyError::NotFound` if the kid is absent from a recently refreshed set
    /// - `KeyError::ServiceUnavailable` if no key set can be fetched and no
    ///   cached set within `max_stale` exists
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError> {
        let snapshot = self.snapshot().await;
        let observed = snapshot.as_ref().map(|set| set.generation);

        if let Some(set) = snapshot.as_deref() {
            let age = set.age();
            match set.get(kid) {
                Some(key) if age < self.settings.ttl => {
                    tracing::debug!(target: "api.auth.jwks", "JWKS cache hit");
                    return Ok(key);
                }
                Some(key) if age < self.settings.max_stale => {
                    let Ok(guard) = self.refresh_lock.try_lock() else {
                        tracing::debug!(target: "api.auth.jwks", "Refresh in flight, serving previous key set");
                        return Ok(key);
                    };
                    let set = self.refresh(guard, observed).await?;
                    return lookup(&set, kid);
                }
                None if age < self.settings.min_refresh_interval => {
                    tracing::debug!(target: "api.auth.jwks", "Key not found in recently refreshed JWKS");
                    return Err(KeyError::NotFound);
                }
                _ => {}
            }
        }

        let guard = self.refresh_lock.lock().await;
        let set = self.refresh(guard, observed).await?;
        lookup(&set, kid)
    }

    /// Force refresh the cache.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::ServiceUnavailable` if the fetch fails and no usable
    /// cached set exists.
    pub async fn force_refresh(&self) -> Result<(), KeyError> {
        let guard = self.refresh_lock.lock().await;
        let observed = self.snapshot().await.map(|set| set.generation);
        self.refresh(guard, observed).await.map(|_| ())
    }

    /// Refresh under the refresh lock.
    ///
    /// `observed` is the generation the caller saw before queuing; a newer
    /// fresh generation means a concurrent refresh already did the work.
    #[instrument(skip_all)]
    async fn refresh(
        &self,
        mut guard: MutexGuard<'_, RefreshState>,
        observed: Option<u64>,
    ) -> Result<Arc<KeySet>, KeyError> {
        let current = self.snapshot().await;

        if let Some(set) = &current {
            if Some(set.generation) != observed && set.age() < self.settings.ttl {
                tracing::debug!(target: "api.auth.jwks", generation = set.generation, "JWKS refreshed by concurrent caller");
                return Ok(Arc::clone(set));
            }
        }

        if let Some(failed_at) = guard.last_failure {
            if failed_at.elapsed() < self.settings.min_refresh_interval {
                tracing::debug!(target: "api.auth.jwks", "Recent JWKS fetch failure, not retrying yet");
                return self.fall_back(current, "recent fetch failure".to_string());
            }
        }

        let started = Instant::now();
        let fetched = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch())
            .await
            .unwrap_or(Err(FetchError::Timeout(self.fetch_timeout)));

        match fetched {
            Ok(jwks) => {
                metrics::record_jwks_fetch("success", started.elapsed());
                let generation = current.as_ref().map_or(1, |set| set.generation + 1);
                let set = Arc::new(KeySet::from_jwks(jwks, generation));

                tracing::info!(
                    target: "api.auth.jwks",
                    key_count = set.len(),
                    generation,
                    "JWKS cache refreshed"
                );

                *self.cache.write().await = Some(Arc::clone(&set));
                guard.last_failure = None;
                Ok(set)
            }
            Err(e) => {
                metrics::record_jwks_fetch("error", started.elapsed());
                tracing::error!(target: "api.auth.jwks", error = %e, "Failed to fetch JWKS");
                guard.last_failure = Some(Instant::now());
                self.fall_back(current, e.to_string())
            }
        }
    }

    fn fall_back(&self, current: Option<Arc<KeySet>>, reason: String) -> Result<Arc<KeySet>, KeyError> {
        match current {
            Some(set) if set.age() < self.settings.max_stale => {
                metrics::record_jwks_stale_served();
                tracing::warn!(
                    target: "api.auth.jwks",
                    age_secs = set.age().as_secs(),
                    generation = set.generation,
                    "Serving stale JWKS after failed refresh"
                );
                Ok(set)
            }
            _ => Err(KeyError::ServiceUnavailable(reason)),
        }
    }
}

fn lookup(set: &KeySet, kid: &str) -> Result<Arc<SigningKey>, KeyError> {
    set.get(kid).ok_or_else(|| {
        tracing::warn!(target: "api.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        KeyError::NotFound
    })
}

/// Mock key source for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::PoisonError;

    /// Scriptable key source that counts fetches.
    pub struct MockJwksFetcher {
        /// Result returned by the next fetch.
        response: std::sync::Mutex<Result<JwksResponse, FetchError>>,
        /// Simulated network latency in milliseconds.
        delay_ms: AtomicU64,
        /// Fetches started.
        call_count: AtomicUsize,
        /// Fetches that ran to completion (not cancelled).
        completed_count: AtomicUsize,
    }

    impl MockJwksFetcher {
        /// A fetcher that serves `jwks`.
        pub fn serving(jwks: JwksResponse) -> Self {
            Self::with_response(Ok(jwks))
        }

        /// A fetcher whose key endpoint is down.
        pub fn failing() -> Self {
            Self::with_response(Err(FetchError::Status(503)))
        }

        fn with_response(response: Result<JwksResponse, FetchError>) -> Self {
            Self {
                response: std::sync::Mutex::new(response),
                delay_ms: AtomicU64::new(0),
                call_count: AtomicUsize::new(0),
                completed_count: AtomicUsize::new(0),
            }
        }

        /// Add simulated latency to every fetch.
        pub fn with_delay(self, delay: Duration) -> Self {
            self.set_delay(delay);
            self
        }

        /// Change the simulated latency from now on.
        pub fn set_delay(&self, delay: Duration) {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.delay_ms.store(millis, Ordering::SeqCst);
        }

        /// Serve `jwks` from now on.
        pub fn set_keys(&self, jwks: JwksResponse) {
            *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Ok(jwks);
        }

        /// Fail every fetch from now on.
        pub fn set_failing(&self) {
            *self.response.lock().unwrap_or_else(PoisonError::into_inner) =
                Err(FetchError::Status(503));
        }

        /// Number of fetches started.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Number of fetches that completed.
        pub fn completed_count(&self) -> usize {
            self.completed_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JwksFetcher for MockJwksFetcher {
        async fn fetch(&self) -> Result<JwksResponse, FetchError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            let delay_ms = self.delay_ms.load(Ordering::SeqCst);
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            self.completed_count.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::MockJwksFetcher;
    use super::*;
    use supervision_test_utils::crypto_fixtures::{Ed25519Fixture, RsaFixture};

    fn jwks(keys: Vec<serde_json::Value>) -> JwksResponse {
        serde_json::from_value(serde_json::json!({ "keys": keys })).unwrap()
    }

    fn rsa_jwks() -> JwksResponse {
        jwks(vec![RsaFixture::primary().jwk_json()])
    }

    fn client(fetcher: Arc<MockJwksFetcher>, settings: JwksCacheSettings) -> JwksClient {
        JwksClient::with_fetcher(fetcher, settings)
    }

    fn no_cooldown() -> JwksCacheSettings {
        JwksCacheSettings {
            min_refresh_interval: Duration::ZERO,
            ..JwksCacheSettings::default()
        }
    }

    fn expired_ttl() -> JwksCacheSettings {
        JwksCacheSettings {
            ttl: Duration::ZERO,
            max_stale: Duration::from_secs(3600),
            min_refresh_interval: Duration::ZERO,
        }
    }

    // =========================================================================
    // JWK parsing
    // =========================================================================

    #[test]
    fn test_jwk_deserialization_rsa() {
        let json = r#"{
            "kty": "RSA",
            "kid": "auth0-key-1",
            "use": "sig",
            "alg": "RS256",
            "n": "sXch",
            "e": "AQAB"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("auth0-key-1"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
    }

    #[test]
    fn test_jwks_response_ignores_unknown_members() {
        let json = r#"{
            "keys": [
                {"kty": "RSA", "kid": "key-1", "x5c": ["MIIC..."], "x5t": "abc"},
                {"kty": "OKP", "kid": "key-2", "crv": "Ed25519"}
            ]
        }"#;

        let jwks: JwksResponse = serde_json::from_str(json).unwrap();

        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys.get(1).unwrap().kid.as_deref(), Some("key-2"));
    }

    #[test]
    fn test_signing_key_from_rsa_jwk() {
        let key = SigningKey::from_jwk(rsa_jwks().keys.first().unwrap()).unwrap();

        assert_eq!(key.kid(), RsaFixture::primary().kid());
        assert_eq!(key.algorithm(), Algorithm::RS256);
    }

    #[test]
    fn test_signing_key_from_ed25519_jwk() {
        let fixture = Ed25519Fixture::new(1, "ed-key-01");
        let jwks = jwks(vec![fixture.jwk_json()]);

        let key = SigningKey::from_jwk(jwks.keys.first().unwrap()).unwrap();

        assert_eq!(key.algorithm(), Algorithm::EdDSA);
    }

    #[test]
    fn test_signing_key_defaults_algorithm_from_key_type() {
        let mut jwk = rsa_jwks().keys.remove(0);
        jwk.alg = None;

        let key = SigningKey::from_jwk(&jwk).unwrap();

        assert_eq!(key.algorithm(), Algorithm::RS256);
    }

    #[test]
    fn test_signing_key_rejects_symmetric_key() {
        let jwks = jwks(vec![serde_json::json!({
            "kty": "oct", "kid": "hmac", "alg": "HS256", "k": "c2VjcmV0"
        })]);

        assert!(matches!(
            SigningKey::from_jwk(jwks.keys.first().unwrap()),
            Err(JwkError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_signing_key_rejects_algorithm_family_mismatch() {
        let mut jwk = rsa_jwks().keys.remove(0);
        jwk.alg = Some("EdDSA".to_string());

        assert_eq!(SigningKey::from_jwk(&jwk).unwrap_err(), JwkError::AlgorithmMismatch);
    }

    #[test]
    fn test_signing_key_rejects_encryption_key() {
        let mut jwk = rsa_jwks().keys.remove(0);
        jwk.key_use = Some("enc".to_string());

        assert!(matches!(
            SigningKey::from_jwk(&jwk),
            Err(JwkError::NotSigningKey(u)) if u == "enc"
        ));
    }

    #[test]
    fn test_signing_key_rejects_missing_kid_and_members() {
        let mut jwk = rsa_jwks().keys.remove(0);
        jwk.kid = Some(String::new());
        assert_eq!(SigningKey::from_jwk(&jwk).unwrap_err(), JwkError::MissingKid);

        let mut jwk = rsa_jwks().keys.remove(0);
        jwk.n = None;
        assert_eq!(
            SigningKey::from_jwk(&jwk).unwrap_err(),
            JwkError::MissingMember("n")
        );
    }

    #[test]
    fn test_signing_key_rejects_short_ed25519_key() {
        let jwks = jwks(vec![serde_json::json!({
            "kty": "OKP", "kid": "short", "crv": "Ed25519", "x": "dGVzdA"
        })]);

        assert_eq!(
            SigningKey::from_jwk(jwks.keys.first().unwrap()).unwrap_err(),
            JwkError::InvalidKeyMaterial
        );
    }

    #[test]
    fn test_key_set_skips_unusable_keys() {
        let jwks = jwks(vec![
            RsaFixture::primary().jwk_json(),
            serde_json::json!({"kty": "oct", "kid": "hmac", "k": "c2VjcmV0"}),
            serde_json::json!({"kty": "RSA", "e": "AQAB", "n": "sXch"}),
        ]);

        let set = KeySet::from_jwks(jwks, 1);

        assert_eq!(set.len(), 1);
        assert!(set.get(RsaFixture::primary().kid()).is_some());
        assert!(set.get("hmac").is_none());
    }

    // =========================================================================
    // Cache behaviour
    // =========================================================================

    #[tokio::test]
    async fn test_cache_hit_does_not_refetch() {
        let fetcher = Arc::new(MockJwksFetcher::serving(rsa_jwks()));
        let client = client(Arc::clone(&fetcher), JwksCacheSettings::default());
        let rsa = RsaFixture::primary();
        let kid = rsa.kid();

        client.get_key(kid).await.unwrap();
        client.get_key(kid).await.unwrap();

        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_in_recent_set_is_not_found_without_fetch() {
        let fetcher = Arc::new(MockJwksFetcher::serving(rsa_jwks()));
        let client = client(Arc::clone(&fetcher), JwksCacheSettings::default());

        client.get_key(RsaFixture::primary().kid()).await.unwrap();
        let result = client.get_key("rotated-away").await;

        assert_eq!(result.unwrap_err(), KeyError::NotFound);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_once_then_not_found() {
        let fetcher = Arc::new(MockJwksFetcher::serving(rsa_jwks()));
        let client = client(Arc::clone(&fetcher), no_cooldown());

        let result = client.get_key("unknown-kid").await;

        assert_eq!(result.unwrap_err(), KeyError::NotFound);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rotation_picks_up_new_key() {
        let fetcher = Arc::new(MockJwksFetcher::serving(rsa_jwks()));
        let client = client(Arc::clone(&fetcher), no_cooldown());
        client.get_key(RsaFixture::primary().kid()).await.unwrap();

        let rotated = Ed25519Fixture::new(7, "rotated-key");
        fetcher.set_keys(jwks(vec![rotated.jwk_json()]));

        let key = client.get_key("rotated-key").await.unwrap();

        assert_eq!(key.algorithm(), Algorithm::EdDSA);
        assert_eq!(fetcher.call_count(), 2);
        assert_eq!(client.snapshot().await.unwrap().generation(), 2);
    }

    #[tokio::test]
    async fn test_stale_cache_served_when_fetch_fails() {
        let fetcher = Arc::new(MockJwksFetcher::serving(rsa_jwks()));
        let client = client(Arc::clone(&fetcher), expired_ttl());
        let rsa = RsaFixture::primary();
        let kid = rsa.kid();
        client.get_key(kid).await.unwrap();

        fetcher.set_failing();
        let key = client.get_key(kid).await.unwrap();

        assert_eq!(key.kid(), kid);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cold_cache_fetch_failure_is_unavailable() {
        let fetcher = Arc::new(MockJwksFetcher::failing());
        let client = client(Arc::clone(&fetcher), JwksCacheSettings::default());

        let result = client.get_key(RsaFixture::primary().kid()).await;

        assert!(matches!(result, Err(KeyError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_stale_beyond_bound_is_unavailable() {
        let fetcher = Arc::new(MockJwksFetcher::serving(rsa_jwks()));
        let settings = JwksCacheSettings {
            ttl: Duration::ZERO,
            max_stale: Duration::ZERO,
            min_refresh_interval: Duration::ZERO,
        };
        let client = client(Arc::clone(&fetcher), settings);
        client.force_refresh().await.unwrap();

        fetcher.set_failing();
        let result = client.get_key(RsaFixture::primary().kid()).await;

        assert!(matches!(result, Err(KeyError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_recent_failure_suppresses_refetch() {
        let fetcher = Arc::new(MockJwksFetcher::failing());
        let client = client(Arc::clone(&fetcher), JwksCacheSettings::default());
        let rsa = RsaFixture::primary();
        let kid = rsa.kid();

        assert!(client.get_key(kid).await.is_err());
        assert!(client.get_key(kid).await.is_err());

        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_cold_misses_fetch_once() {
        let fetcher = Arc::new(
            MockJwksFetcher::serving(rsa_jwks()).with_delay(Duration::from_millis(50)),
        );
        let client = Arc::new(client(Arc::clone(&fetcher), JwksCacheSettings::default()));
        let kid = RsaFixture::primary().kid().to_string();

        let lookups = (0..32).map(|_| {
            let client = Arc::clone(&client);
            let kid = kid.clone();
            tokio::spawn(async move { client.get_key(&kid).await })
        });
        let results = futures::future::join_all(lookups).await;

        for result in results {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_expired_lookups_fetch_once() {
        let fetcher = Arc::new(
            MockJwksFetcher::serving(rsa_jwks()).with_delay(Duration::from_millis(50)),
        );
        let client = Arc::new(client(Arc::clone(&fetcher), expired_ttl()));
        let kid = RsaFixture::primary().kid().to_string();
        client.get_key(&kid).await.unwrap();

        let lookups = (0..16).map(|_| {
            let client = Arc::clone(&client);
            let kid = kid.clone();
            tokio::spawn(async move { client.get_key(&kid).await })
        });
        let results = futures::future::join_all(lookups).await;

        for result in results {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_refresh_lock() {
        let fetcher = Arc::new(
            MockJwksFetcher::serving(rsa_jwks()).with_delay(Duration::from_millis(200)),
        );
        let client = Arc::new(client(Arc::clone(&fetcher), JwksCacheSettings::default()));
        let kid = RsaFixture::primary().kid().to_string();

        let cancelled = {
            let client = Arc::clone(&client);
            let kid = kid.clone();
            tokio::spawn(async move { client.get_key(&kid).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancelled.abort();
        assert!(cancelled.await.unwrap_err().is_cancelled());

        assert_eq!(fetcher.completed_count(), 0);

        let key = tokio::time::timeout(Duration::from_secs(2), client.get_key(&kid))
            .await
            .expect("refresh lock should be free after cancellation");
        assert!(key.is_ok());
        assert_eq!(fetcher.call_count(), 2);
        assert_eq!(fetcher.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_hanging_fetch_on_cold_cache_is_unavailable_before_deadline() {
        let fetcher = Arc::new(
            MockJwksFetcher::serving(rsa_jwks()).with_delay(Duration::from_secs(120)),
        );
        let client = client(Arc::clone(&fetcher), JwksCacheSettings::default())
            .with_fetch_timeout(Duration::from_millis(100));
        let rsa = RsaFixture::primary();

        let result = tokio::time::timeout(Duration::from_secs(5), client.get_key(rsa.kid()))
            .await
            .expect("lookup should give up at the fetch deadline");

        assert!(matches!(result, Err(KeyError::ServiceUnavailable(_))));
        assert_eq!(fetcher.completed_count(), 0);
    }

    #[tokio::test]
    async fn test_hanging_fetch_records_failure_for_cooldown() {
        let fetcher = Arc::new(
            MockJwksFetcher::serving(rsa_jwks()).with_delay(Duration::from_secs(120)),
        );
        let client = client(Arc::clone(&fetcher), JwksCacheSettings::default())
            .with_fetch_timeout(Duration::from_millis(50));
        let rsa = RsaFixture::primary();

        assert!(client.get_key(rsa.kid()).await.is_err());
        assert!(client.get_key(rsa.kid()).await.is_err());

        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_hanging_fetch_serves_stale_keys() {
        let fetcher = Arc::new(MockJwksFetcher::serving(rsa_jwks()));
        let client = client(Arc::clone(&fetcher), expired_ttl())
            .with_fetch_timeout(Duration::from_millis(50));
        let rsa = RsaFixture::primary();
        client.get_key(rsa.kid()).await.unwrap();

        fetcher.set_delay(Duration::from_secs(120));
        let key = tokio::time::timeout(Duration::from_secs(5), client.get_key(rsa.kid()))
            .await
            .expect("lookup should give up at the fetch deadline");

        assert_eq!(key.unwrap().kid(), rsa.kid());
        assert_eq!(fetcher.call_count(), 2);
    }

    #[test]
    fn test_default_fetch_timeout_is_under_request_timeout() {
        let client = client(
            Arc::new(MockJwksFetcher::serving(rsa_jwks())),
            JwksCacheSettings::default(),
        );
        assert_eq!(client.fetch_timeout(), DEFAULT_FETCH_TIMEOUT);
        assert!(DEFAULT_FETCH_TIMEOUT < Duration::from_secs(crate::config::REQUEST_TIMEOUT_SECONDS));
    }

    #[test]
    fn test_default_cache_settings() {
        let settings = JwksCacheSettings::default();
        assert_eq!(settings.ttl, Duration::from_secs(300));
        assert_eq!(settings.max_stale, Duration::from_secs(3600));
        assert_eq!(settings.min_refresh_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_fetch_error_retryability() {
        assert!(FetchError::Transport("reset".to_string()).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(FetchError::Status(429).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::InvalidDocument("eof".to_string()).is_retryable());
        assert!(!FetchError::Timeout(Duration::from_secs(10)).is_retryable());
    }
}
