//! Identity echo handler.
//!
//! Returns the verified identity of the caller from request extensions.

use crate::auth::Authority;
use crate::models::{ErrorMessage, VerifyResponse};
use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use tracing::instrument;

/// Handler for GET /verify
///
/// Requires the authorization middleware. When the middleware let an
/// unverified request through (`allow_unmatched`), no Authority is present
/// and the handler answers 401 itself.
///
/// ## Response
///
/// ```json
/// {
///   "subject": "auth0|5f7c8ec7c33c6c004bbafe82",
///   "scopes": ["read:student"]
/// }
/// ```
#[instrument(skip_all, name = "api.handlers.verify")]
pub async fn verify(authority: Option<Extension<Authority>>) -> impl IntoResponse {
    let Some(Extension(authority)) = authority else {
        tracing::debug!(target: "api.handlers.verify", "No authority on request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorMessage {
                message: "cannot extract user id".to_string(),
            }),
        )
            .into_response();
    };

    Json(VerifyResponse {
        subject: authority.subject().to_string(),
        scopes: authority.scopes().iter().cloned().collect(),
    })
    .into_response()
}
