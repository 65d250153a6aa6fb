//! HTTP routes for the Supervision API.
//!
//! Defines the Axum router and application state.

use crate::config::{Config, REQUEST_TIMEOUT_SECONDS};
use crate::handlers;
use crate::middleware::{authorize_request, http_metrics_middleware, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use crate::observability::metrics::init_metrics_recorder;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Authorization state shared with the middleware.
    pub auth: Arc<AuthState>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/health` - Liveness probe - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/verify` - Echo the caller's subject and scopes - requires authorization
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
///
/// The supervision CRUD handlers mount onto the protected router; every
/// route they add is covered by the policy in [`AuthState`].
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    // Public routes (no authorization)
    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (scope requirements from the route policy)
    let protected_routes = Router::new()
        .route("/verify", get(handlers::verify))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            authorize_request,
        ))
        .with_state(state);

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECONDS)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
