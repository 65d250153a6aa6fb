//! Supervision API
//!
//! Entry point for the supervision backend's authorization front. Verifies
//! bearer tokens against the identity provider's JWKS and enforces per-route
//! scope requirements.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use supervision_api::auth::jwks::default_http_client;
use supervision_api::config::Config;
use supervision_api::middleware::AuthState;
use supervision_api::routes::{self, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first; it decides the log level and format
    let config = Config::from_env();

    let (debug, json_logs) = config
        .as_ref()
        .map(|c| (c.debug, c.json_logs))
        .unwrap_or((false, false));
    init_tracing(debug, json_logs);

    info!("Starting Supervision API");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.issuer,
        audience = %config.audience,
        allow_unmatched = config.allow_unmatched,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        jwks_cache_ttl_seconds = config.jwks_cache_ttl_seconds,
        jwks_max_stale_seconds = config.jwks_max_stale_seconds,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    let metrics_handle = routes::init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Build the authorizer; keys are fetched lazily on the first request
    let auth_config = config.auth_config(default_http_client()).map_err(|e| {
        error!("Invalid authorization configuration: {}", e);
        e
    })?;
    let auth = Arc::new(AuthState::from_config(&auth_config));

    info!(routes = auth.policy.len(), "Route policy loaded");

    // Parse bind address before moving config
    let bind_address = config.bind_address.clone();
    let drain = Duration::from_secs(config.drain_seconds);

    let state = Arc::new(AppState { config, auth });
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Supervision API listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain))
    .await?;

    info!("Supervision API shutdown complete");

    Ok(())
}

fn init_tracing(debug: bool, json_logs: bool) {
    let default_filter = if debug {
        "supervision_api=debug,api=debug,tower_http=debug"
    } else {
        "supervision_api=info,api=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain.is_zero() {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain.as_secs());
        tokio::time::sleep(drain).await;
        info!("Drain period complete");
    }
}
