//! Request authorizer.
//!
//! Turns an `Authorization` header and a route's required scopes into an
//! [`AuthDecision`]. The authorizer knows nothing about axum; the
//! middleware adapter applies the decision to the request.
//!
//! ```text
//! Received -> TokenExtracted -> Verified -> ScopeChecked
//!          -> Proceed | Denied(401) | Denied(403) | Failed(500)
//! ```

use crate::auth::authority::Authority;
use crate::auth::config::{AuthConfig, KeySource};
use crate::auth::jwks::{HttpJwksFetcher, JwksClient, JwksFetcher};
use crate::auth::jwt::{ClaimRules, JwtValidator};
use crate::auth::policy::ScopeSet;
use crate::errors::{ApiError, AuthError};
use crate::observability::metrics;
use std::sync::Arc;
use tracing::instrument;

/// Result of checking a request's credentials against a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Verified identity holding at least one required scope.
    Valid,
    /// Verified identity without any required scope.
    InsufficientScope,
    /// Missing, malformed or unverifiable credentials.
    UnauthorizedRequest,
    /// Key service or other infrastructure failure.
    InternalError,
}

impl AuthOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Valid => "valid",
            AuthOutcome::InsufficientScope => "insufficient_scope",
            AuthOutcome::UnauthorizedRequest => "unauthorized",
            AuthOutcome::InternalError => "internal_error",
        }
    }
}

/// What the caller of the authorizer must do with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    /// Hand the request to the handler.
    Proceed,
    /// Reply with the error and do not run the handler.
    Deny(ApiError),
}

impl AuthAction {
    fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Proceed => "proceed",
            AuthAction::Deny(_) => "deny",
        }
    }
}

/// Outcome, action and (when verified) the caller's Authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    pub outcome: AuthOutcome,
    pub action: AuthAction,
    pub authority: Option<Authority>,
}

/// Bearer-token authorizer.
pub struct Authorizer {
    validator: JwtValidator,
    jwks_client: Arc<JwksClient>,
    allow_unmatched: bool,
}

impl Authorizer {
    /// Create an authorizer over an existing validator.
    pub fn new(validator: JwtValidator, jwks_client: Arc<JwksClient>, allow_unmatched: bool) -> Self {
        Self {
            validator,
            jwks_client,
            allow_unmatched,
        }
    }

    /// Wire the key resolver and token verifier described by `config`.
    pub fn from_config(config: &AuthConfig) -> Self {
        let fetcher: Arc<dyn JwksFetcher> = match config.key_source() {
            KeySource::Url {
                jwks_url,
                http_client,
            } => Arc::new(HttpJwksFetcher::new(jwks_url.clone(), http_client.clone())),
            KeySource::Fetcher(fetcher) => Arc::clone(fetcher),
        };

        let jwks_client = Arc::new(
            JwksClient::with_fetcher(fetcher, config.cache())
                .with_fetch_timeout(config.fetch_timeout()),
        );
        let validator = JwtValidator::new(
            Arc::clone(&jwks_client),
            ClaimRules {
                issuer: config.issuer().to_string(),
                audience: config.audience().to_string(),
                clock_skew: config.clock_skew(),
            },
        );

        Self::new(validator, jwks_client, config.allow_unmatched())
    }

    /// Key resolver shared with the validator.
    pub fn jwks_client(&self) -> &Arc<JwksClient> {
        &self.jwks_client
    }

    /// Whether denials pass through to the handler.
    pub fn allow_unmatched(&self) -> bool {
        self.allow_unmatched
    }

    /// Decide on a request.
    ///
    /// `required` is `None` for a route absent from the policy table, which
    /// is treated as requiring a scope no token holds.
    #[instrument(skip_all, name = "api.auth.authorize")]
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
        required: Option<&ScopeSet>,
    ) -> AuthDecision {
        let (outcome, authority) = match self.verify(authorization).await {
            Ok(authority) => {
                let granted = required.is_some_and(|required| authority.intersects(required));
                if granted {
                    (AuthOutcome::Valid, Some(authority))
                } else {
                    tracing::debug!(
                        target: "api.auth.authorizer",
                        matched = required.is_some(),
                        "Token lacks required scope"
                    );
                    (AuthOutcome::InsufficientScope, Some(authority))
                }
            }
            Err(e) if e.is_infrastructure() => {
                tracing::error!(target: "api.auth.authorizer", error = %e, "Authorization failed on infrastructure error");
                (AuthOutcome::InternalError, None)
            }
            Err(e) => {
                tracing::debug!(target: "api.auth.authorizer", error = %e, "Token rejected");
                (AuthOutcome::UnauthorizedRequest, None)
            }
        };

        let action = self.action_for(outcome);
        if self.allow_unmatched && outcome != AuthOutcome::Valid && action == AuthAction::Proceed {
            tracing::warn!(
                target: "api.auth.authorizer",
                outcome = outcome.as_str(),
                "Passing denied request through (allow_unmatched)"
            );
        }

        metrics::record_auth_decision(outcome.as_str(), action.as_str());

        AuthDecision {
            outcome,
            action,
            authority,
        }
    }

    async fn verify(&self, authorization: Option<&str>) -> Result<Authority, AuthError> {
        let token = authorization
            .and_then(extract_bearer_token)
            .ok_or(AuthError::UnauthorizedRequest)?;

        self.validator.validate(token).await
    }

    fn action_for(&self, outcome: AuthOutcome) -> AuthAction {
        match outcome {
            AuthOutcome::Valid => AuthAction::Proceed,
            AuthOutcome::InternalError => AuthAction::Deny(ApiError::Internal),
            _ if self.allow_unmatched => AuthAction::Proceed,
            AuthOutcome::InsufficientScope => AuthAction::Deny(ApiError::Forbidden),
            AuthOutcome::UnauthorizedRequest => AuthAction::Deny(ApiError::Unauthorized),
        }
    }
}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
