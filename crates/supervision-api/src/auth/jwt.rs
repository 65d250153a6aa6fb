//! JWT validation for the Supervision API.
//!
//! Validates incoming access tokens using public keys fetched from the
//! identity provider's JWKS endpoint.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The verification algorithm comes from the resolved key; the header's
//!   `alg` must match it exactly (no algorithm substitution)
//! - Symmetric algorithms and `none` are never accepted
//! - `exp` has no leeway; `nbf` and `iat` tolerate the configured clock skew
//! - Generic error messages prevent information leakage

use crate::auth::authority::Authority;
use crate::auth::claims::Claims;
use crate::auth::jwks::{JwksClient, SigningKey};
use crate::errors::AuthError;
use common::jwt::{parse_header, validate_iat_at, validate_nbf_at};
use jsonwebtoken::{decode, Validation};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Expected values for the standard claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRules {
    /// Required `iss` value.
    pub issuer: String,

    /// Value that must appear in `aud`.
    pub audience: String,

    /// Tolerance for `nbf` and `iat` in the future.
    pub clock_skew: Duration,
}

/// JWT validator using JWKS from the identity provider.
pub struct JwtValidator {
    /// JWKS client for fetching public keys.
    jwks_client: Arc<JwksClient>,

    /// Expected issuer, audience and clock skew.
    rules: ClaimRules,
}

impl JwtValidator {
    /// Create a new JWT validator.
    pub fn new(jwks_client: Arc<JwksClient>, rules: ClaimRules) -> Self {
        Self { jwks_client, rules }
    }

    /// Claim rules in effect.
    pub fn rules(&self) -> &ClaimRules {
        &self.rules
    }

    /// Validate a token and return the caller's Authority.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnauthorizedRequest` for every token-level failure
    /// - `AuthError::KeyServiceUnavailable` if the signing keys cannot be
    ///   obtained
    pub async fn validate(&self, token: &str) -> Result<Authority, AuthError> {
        self.validate_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Validate a token against an explicit `now` (Unix seconds).
    ///
    /// # Security Checks
    ///
    /// 1. Size and structure check of the header, before any key lookup
    /// 2. Fetch the public key for `kid` from JWKS
    /// 3. Header `alg` must equal the key's algorithm
    /// 4. Verify signature
    /// 5. `iss`, `aud`, `exp`, `nbf`, `iat`, in that order
    /// 6. Non-empty `sub`
    ///
    /// # Errors
    ///
    /// See [`JwtValidator::validate`].
    #[instrument(skip_all)]
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<Authority, AuthError> {
        let header = parse_header(token).map_err(|e| {
            tracing::debug!(target: "api.auth.jwt", error = ?e, "Token header rejected");
            AuthError::UnauthorizedRequest
        })?;

        let key = self.jwks_client.get_key(&header.kid).await?;

        if header.alg != key.algorithm() {
            tracing::warn!(
                target: "api.auth.jwt",
                kid = %header.kid,
                token_alg = ?header.alg,
                key_alg = ?key.algorithm(),
                "Token algorithm does not match signing key"
            );
            return Err(AuthError::UnauthorizedRequest);
        }

        let claims = verify_signature(token, &key)?;
        check_claims(&claims, &self.rules, now)?;

        let subject = claims
            .sub
            .as_deref()
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| {
                tracing::debug!(target: "api.auth.jwt", "Token has no subject");
                AuthError::UnauthorizedRequest
            })?
            .to_string();

        tracing::debug!(target: "api.auth.jwt", "Token validated successfully");
        Ok(Authority::from_verified(subject, claims.granted_scopes()))
    }
}

/// Verify the signature with the key's own algorithm and decode the claims.
///
/// Time and audience checks are disabled here; [`check_claims`] performs
/// them with the exact semantics required.
fn verify_signature(token: &str, key: &SigningKey) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(key.algorithm());
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let token_data = decode::<Claims>(token, key.decoding_key(), &validation).map_err(|e| {
        tracing::debug!(target: "api.auth.jwt", error = %e, "Token verification failed");
        AuthError::UnauthorizedRequest
    })?;

    Ok(token_data.claims)
}

/// Check the standard claims in order, stopping at the first failure.
fn check_claims(claims: &Claims, rules: &ClaimRules, now: i64) -> Result<(), AuthError> {
    if claims.iss.as_deref() != Some(rules.issuer.as_str()) {
        tracing::debug!(target: "api.auth.jwt", "Token issuer mismatch");
        return Err(AuthError::UnauthorizedRequest);
    }

    if !claims
        .aud
        .as_ref()
        .is_some_and(|aud| aud.contains(&rules.audience))
    {
        tracing::debug!(target: "api.auth.jwt", "Token audience mismatch");
        return Err(AuthError::UnauthorizedRequest);
    }

    match claims.exp {
        Some(exp) if exp > now => {}
        _ => {
            tracing::debug!(target: "api.auth.jwt", exp = ?claims.exp, now, "Token expired");
            return Err(AuthError::UnauthorizedRequest);
        }
    }

    if let Some(nbf) = claims.nbf {
        validate_nbf_at(nbf, rules.clock_skew, now).map_err(|_| AuthError::UnauthorizedRequest)?;
    }

    if let Some(iat) = claims.iat {
        validate_iat_at(iat, rules.clock_skew, now).map_err(|_| AuthError::UnauthorizedRequest)?;
    }

    Ok(())
}
