//! Health check handler.
//!
//! Liveness endpoint. Reports whether signing keys are cached but never
//! contacts the key service, so an identity provider outage does not take
//! the service out of rotation.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Health check handler.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "signing_keys": "warm"
/// }
/// ```
#[instrument(skip_all, name = "api.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cached = state
        .auth
        .authorizer
        .jwks_client()
        .snapshot()
        .await
        .is_some();

    Json(HealthResponse {
        status: "healthy".to_string(),
        signing_keys: if cached { "warm" } else { "cold" }.to_string(),
    })
}
