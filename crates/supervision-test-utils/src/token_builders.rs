//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed access tokens shaped like the
//! identity provider's.

use crate::crypto_fixtures::{Ed25519Fixture, RsaFixture};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};
use std::str::FromStr;

/// Builder for test access tokens.
///
/// Defaults: subject `auth0|test-user`, issued now, expiring in one hour,
/// no issuer, audience or scope.
///
/// # Example
/// ```rust,ignore
/// let token = TokenBuilder::new()
///     .issuer("https://tenant.example.com/")
///     .audience("https://supervision.example.com")
///     .scope("read:student")
///     .sign_rs256(&RsaFixture::primary());
/// ```
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    claims: Map<String, Value>,
}

impl TokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("auth0|test-user"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set the subject
    pub fn subject(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    /// Set the issuer
    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    /// Set a single audience
    pub fn audience(self, audience: &str) -> Self {
        self.claim("aud", json!(audience))
    }

    /// Set an audience array
    pub fn audiences(self, audiences: &[&str]) -> Self {
        self.claim("aud", json!(audiences))
    }

    /// Set the space-separated scope claim
    pub fn scope(self, scope: &str) -> Self {
        self.claim("scope", json!(scope))
    }

    /// Set the RBAC permissions claim
    pub fn permissions(self, permissions: &[&str]) -> Self {
        self.claim("permissions", json!(permissions))
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.claim("iat", json!(timestamp))
    }

    /// Set expiration timestamp
    pub fn expires_at(self, timestamp: i64) -> Self {
        self.claim("exp", json!(timestamp))
    }

    /// Set expiration in seconds from now (negative for expired tokens)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.expires_at((Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set not-before timestamp
    pub fn not_before(self, timestamp: i64) -> Self {
        self.claim("nbf", json!(timestamp))
    }

    /// Set an arbitrary claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    /// Sign with the RSA fixture (RS256)
    pub fn sign_rs256(self, key: &RsaFixture) -> String {
        self.sign(Algorithm::RS256, key.kid(), &key.encoding_key())
    }

    /// Sign with the RSA fixture under another RSA algorithm name (e.g. "RS384")
    pub fn sign_rs256_as(self, key: &RsaFixture, alg: &str) -> String {
        let alg = Algorithm::from_str(alg).expect("Unknown algorithm");
        self.sign(alg, key.kid(), &key.encoding_key())
    }

    /// Sign with an Ed25519 fixture (EdDSA)
    pub fn sign_eddsa(self, key: &Ed25519Fixture) -> String {
        self.sign(Algorithm::EdDSA, key.kid(), &key.encoding_key())
    }

    /// Sign with HMAC-SHA256 using `secret`, claiming key `kid`
    pub fn sign_hs256_with_kid(self, kid: &str, secret: &[u8]) -> String {
        self.sign(Algorithm::HS256, kid, &EncodingKey::from_secret(secret))
    }

    /// Unsigned token (`alg: none`) with an empty-looking signature segment
    pub fn unsigned(self, kid: &str) -> String {
        let header = json!({"alg": "none", "typ": "JWT", "kid": kid});
        format!(
            "{}.{}.AA",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.build().to_string())
        )
    }

    fn sign(self, alg: Algorithm, kid: &str, key: &EncodingKey) -> String {
        let mut header = Header::new(alg);
        header.typ = Some("JWT".to_string());
        header.kid = Some(kid.to_string());

        encode(&header, &self.build(), key).expect("Failed to sign token")
    }
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
