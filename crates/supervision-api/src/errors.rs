//! Supervision API error types.
//!
//! `AuthError` and `KeyError` describe failures inside the authorization
//! core. `ApiError` is the terminal HTTP outcome of a denied request; denied
//! requests carry an empty body, and details are logged server-side only.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failures of token verification and authorization.
///
/// - `UnauthorizedRequest`: missing, malformed, badly signed, expired token
///   or wrong issuer/audience. The caller can recover with a new token.
/// - `KeyServiceUnavailable`: infrastructure fault. Never downgraded to a
///   denial and never allowed to fail open.
///
/// Scope failures are not errors; the authorizer reports them as an outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("The access token is invalid or expired")]
    UnauthorizedRequest,

    #[error("Key service unavailable")]
    KeyServiceUnavailable,
}

impl AuthError {
    /// Whether this error is an infrastructure fault rather than a verdict
    /// about the caller's credentials.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AuthError::KeyServiceUnavailable)
    }
}

/// Failures of the key resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key ID is not in a recently refreshed key set.
    #[error("Signing key not found")]
    NotFound,

    /// No key set could be fetched and no usable cached set exists.
    #[error("Key service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<KeyError> for AuthError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::NotFound => AuthError::UnauthorizedRequest,
            KeyError::ServiceUnavailable(_) => AuthError::KeyServiceUnavailable,
        }
    }
}

/// Terminal HTTP outcome for a request the authorizer refused.
///
/// Maps to:
/// - Unauthorized: 401 (with `WWW-Authenticate: Bearer`)
/// - Forbidden: 403
/// - Internal: 500
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthorized => 401,
            ApiError::Forbidden => 403,
            ApiError::Internal => 500,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (status, Body::empty()).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"supervision-api\""),
            );
        }

        response
    }
}
