//! JWT utilities shared across the supervision services.
//!
//! This module provides the token-level checks that do not need a key:
//! - Size limits for DoS prevention
//! - Clock skew constants for `iat`/`nbf` validation
//! - Header parsing (`kid` and `alg`) ahead of key lookup
//! - Time-based claim validation with injectable `now`
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Symmetric (`HS*`) and unknown algorithms are rejected at header parse
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_header, validate_iat_at, DEFAULT_CLOCK_SKEW};
//!
//! // Size check + header decode, no signature verification yet
//! let header = parse_header(token)?;
//!
//! // Look up header.kid in the key set, verify, then:
//! validate_iat_at(claims.iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Identity-provider access tokens with a modest
/// permissions list are well under 2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Applied to `iat` and `nbf` only. Expiry is checked without leeway.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during key-independent JWT validation.
///
/// Every variant renders the same client-facing message. The variant itself
/// is only logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-part base64url JWS with a JSON header.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header is missing a non-empty string `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token header `alg` is missing, unknown, `none`, or symmetric.
    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// Token `nbf` claim is in the future.
    #[error("The access token is invalid or expired")]
    NotYetValid,
}

// =============================================================================
// Header
// =============================================================================

/// The parts of a JWS header needed to pick a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Key ID used to select the signing key from the issuer's key set.
    pub kid: String,

    /// Algorithm declared by the token. Never used on its own to pick the
    /// verification algorithm; callers compare it against the key's algorithm.
    pub alg: Algorithm,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    alg: Option<serde_json::Value>,
}

/// Returns true for algorithm families that can verify a token with a
/// published public key.
#[must_use]
pub fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Parse the JWS header of `token` without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - The signature segment must be present and non-empty
/// - This function does NOT validate the signature; the returned `kid`
///   must only be used for lookup in a trusted key set
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong segment count, empty segment, bad base64 or JSON
/// - `MissingKid` - `kid` missing, empty, or not a string
/// - `UnsupportedAlgorithm` - `alg` missing, unknown, `none`, or `HS*`
pub fn parse_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    let [header_part, payload_part, signature_part] = parts.as_slice() else {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    };

    if header_part.is_empty() || payload_part.is_empty() || signature_part.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty JWT segment");
        return Err(JwtValidationError::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = header
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    let alg_name = header
        .alg
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .ok_or(JwtValidationError::UnsupportedAlgorithm)?;

    let alg = Algorithm::from_str(alg_name).map_err(|_| {
        tracing::debug!(target: "common.jwt", alg = %alg_name, "Token rejected: unknown algorithm");
        JwtValidationError::UnsupportedAlgorithm
    })?;

    if !is_asymmetric(alg) {
        tracing::debug!(target: "common.jwt", alg = ?alg, "Token rejected: symmetric algorithm");
        return Err(JwtValidationError::UnsupportedAlgorithm);
    }

    Ok(TokenHeader { kid, alg })
}

// =============================================================================
// Time-based claims
// =============================================================================

/// Validate the `iat` (issued-at) claim against `now` with clock skew
/// tolerance.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat > now + clock_skew`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Deterministic `nbf` (not-before) validation against an explicit `now`.
///
/// # Errors
///
/// Returns `NotYetValid` if `nbf > now + clock_skew`.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_nbf = now.saturating_add(skew_secs(clock_skew));

    if nbf > max_nbf {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            max_allowed = max_nbf,
            "Token rejected: not valid yet"
        );
        return Err(JwtValidationError::NotYetValid);
    }

    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

/// Decode a base64url (no padding) JWK member such as `x`, `y`, `n` or `e`.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content is not valid base64url.
pub fn decode_jwk_member(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_clock_skew_bounds() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // parse_header Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_header_rs256() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"auth0-key-1"}"#);

        let header = parse_header(&token).unwrap();
        assert_eq!(header.kid, "auth0-key-1");
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn test_parse_header_eddsa() {
        let token = token_with_header(r#"{"alg":"EdDSA","kid":"ed-key"}"#);

        let header = parse_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
    }

    #[test]
    fn test_parse_header_missing_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);
        assert_eq!(parse_header(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_parse_header_rejects_empty_and_non_string_kid() {
        for header in [
            r#"{"alg":"RS256","kid":""}"#,
            r#"{"alg":"RS256","kid":12345}"#,
            r#"{"alg":"RS256","kid":null}"#,
        ] {
            assert_eq!(
                parse_header(&token_with_header(header)),
                Err(JwtValidationError::MissingKid),
                "header {header} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_header_rejects_symmetric_and_none() {
        for alg in ["HS256", "HS384", "HS512", "none", "RS1024", ""] {
            let header = format!(r#"{{"alg":"{alg}","kid":"k"}}"#);
            assert_eq!(
                parse_header(&token_with_header(&header)),
                Err(JwtValidationError::UnsupportedAlgorithm),
                "alg {alg} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_header_missing_alg() {
        let token = token_with_header(r#"{"kid":"k"}"#);
        assert_eq!(
            parse_header(&token),
            Err(JwtValidationError::UnsupportedAlgorithm)
        );
    }

    #[test]
    fn test_parse_header_malformed_structure() {
        for token in ["", "single", "only.two", "a.b.c.d", ".payload.signature", "h.p."] {
            assert_eq!(
                parse_header(token),
                Err(JwtValidationError::MalformedToken),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_header_invalid_base64_and_json() {
        assert_eq!(
            parse_header("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(
            parse_header(&token_with_header("not-json")),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_parse_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            parse_header(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    #[test]
    fn test_parse_header_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let payload_len = remaining / 2;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(remaining - payload_len)
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        assert_eq!(parse_header(&token).unwrap().kid, "key");
    }

    // -------------------------------------------------------------------------
    // Time claim Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_boundaries() {
        let now = 1_700_000_000;
        let skew = Duration::from_secs(300);

        assert!(validate_iat_at(now, skew, now).is_ok());
        assert!(validate_iat_at(now + 300, skew, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, skew, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
        assert!(validate_iat_at(now - 86_400, skew, now).is_ok());
    }

    #[test]
    fn test_validate_nbf_boundaries() {
        let now = 1_700_000_000;
        let skew = Duration::from_secs(60);

        assert!(validate_nbf_at(now - 10, skew, now).is_ok());
        assert!(validate_nbf_at(now + 60, skew, now).is_ok());
        assert_eq!(
            validate_nbf_at(now + 61, skew, now),
            Err(JwtValidationError::NotYetValid)
        );
    }

    #[test]
    fn test_validate_nbf_zero_skew_is_strict() {
        let now = 1_700_000_000;
        assert!(validate_nbf_at(now, Duration::ZERO, now).is_ok());
        assert_eq!(
            validate_nbf_at(now + 1, Duration::ZERO, now),
            Err(JwtValidationError::NotYetValid)
        );
    }

    #[test]
    fn test_decode_jwk_member() {
        assert_eq!(decode_jwk_member("AQAB").unwrap(), vec![1, 0, 1]);
        assert!(decode_jwk_member("!!!").is_err());
    }

    #[test]
    fn test_is_asymmetric() {
        assert!(is_asymmetric(Algorithm::RS256));
        assert!(is_asymmetric(Algorithm::ES256));
        assert!(is_asymmetric(Algorithm::EdDSA));
        assert!(!is_asymmetric(Algorithm::HS256));
    }
}
