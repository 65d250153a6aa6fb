//! Authorization middleware for protected routes.
//!
//! Thin axum adapter over [`Authorizer`]: looks up the route's required
//! scopes, asks the authorizer for a decision, and either rejects the
//! request or inserts the caller's [`Authority`] into request extensions.

use crate::auth::{AuthAction, AuthConfig, Authority, Authorizer, RoutePolicy};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authorization middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token verification and decision logic.
    pub authorizer: Arc<Authorizer>,

    /// Required scopes per route.
    pub policy: Arc<RoutePolicy>,
}

impl AuthState {
    /// Build the authorizer and policy described by `config`.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            authorizer: Arc::new(Authorizer::from_config(config)),
            policy: Arc::new(config.routes().clone()),
        }
    }
}

/// Authorization middleware.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - 401 with `WWW-Authenticate` and empty body for missing or invalid tokens
/// - 403 with empty body when no required scope is held
/// - 500 with empty body when signing keys are unavailable
/// - Otherwise the handler's response; the Authority (when verified) is in
///   request extensions
#[instrument(skip_all, name = "api.middleware.auth")]
pub async fn authorize_request(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let required = state
        .policy
        .required_scopes(req.method().as_str(), req.uri().path());

    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let decision = state.authorizer.authorize(authorization, required).await;

    tracing::debug!(
        target: "api.middleware.auth",
        method = %req.method(),
        path = %req.uri().path(),
        outcome = decision.outcome.as_str(),
        "Authorization decided"
    );

    match decision.action {
        AuthAction::Deny(error) => error.into_response(),
        AuthAction::Proceed => {
            if let Some(authority) = decision.authority {
                req.extensions_mut().insert(authority);
            }
            next.run(req).await
        }
    }
}

/// Extension trait for extracting the Authority from a request.
pub trait AuthorityExt {
    /// Get the verified Authority from request extensions.
    ///
    /// Returns `None` if the middleware did not run or let an unverified
    /// request through.
    fn authority(&self) -> Option<&Authority>;
}

impl<B> AuthorityExt for axum::http::Request<B> {
    fn authority(&self) -> Option<&Authority> {
        self.extensions().get::<Authority>()
    }
}
