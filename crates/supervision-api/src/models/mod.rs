//! Supervision API models.
//!
//! Response bodies of the service's own endpoints.

use serde::{Deserialize, Serialize};

/// Health check response.
///
/// Returned by the `/v1/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy").
    pub status: String,

    /// Signing key cache state ("warm" or "cold").
    pub signing_keys: String,
}

/// Identity of the caller, returned by `/verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Subject (user ID at the identity provider).
    pub subject: String,

    /// Granted scopes, sorted.
    pub scopes: Vec<String>,
}

/// Error body returned by handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}
