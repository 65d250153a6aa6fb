//! Metrics definitions for the Supervision API.
//!
//! All metrics follow Prometheus naming conventions:
//! - `api_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `outcome`: 4 values (valid, insufficient_scope, unauthorized, internal_error)
//! - `action`: 2 values (proceed, deny)
//! - `status`: 2 values for JWKS fetches (success, error)
//! - `endpoint`: known operational paths, everything else is `/other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("api_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("api_jwks_fetch".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `api_http_requests_total`, `api_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("api_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("api_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path to a bounded label value.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/v1/health" => "/v1/health",
        "/metrics" => "/metrics",
        "/verify" | "/verify/" => "/verify",
        _ => "/other",
    }
}

// ============================================================================
// Authorization Metrics
// ============================================================================

/// Record an authorization decision
///
/// Metric: `api_auth_decisions_total`
/// Labels: `outcome`, `action`
pub fn record_auth_decision(outcome: &'static str, action: &'static str) {
    counter!("api_auth_decisions_total",
        "outcome" => outcome,
        "action" => action
    )
    .increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWKS fetch, including all retries
///
/// Metric: `api_jwks_fetches_total`, `api_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("api_jwks_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("api_jwks_fetches_total", "status" => status).increment(1);
}

/// Record a lookup answered from a stale key set after a failed refresh
///
/// Metric: `api_jwks_stale_served_total`
pub fn record_jwks_stale_served() {
    counter!("api_jwks_stale_served_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests execute the recording functions against the global no-op
    // recorder; values are checked through the /metrics endpoint in
    // integration tests.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/v1/health", 200, Duration::from_millis(5));
        record_http_request("GET", "/verify", 401, Duration::from_millis(10));
        record_http_request("GET", "/getGantt/12", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(403), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/v1/health"), "/v1/health");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/verify/"), "/verify");
        assert_eq!(normalize_endpoint("/getGantt/12"), "/other");
        assert_eq!(normalize_endpoint("/unknown/path"), "/other");
    }

    #[test]
    fn test_record_auth_decision() {
        record_auth_decision("valid", "proceed");
        record_auth_decision("unauthorized", "deny");
        record_auth_decision("internal_error", "deny");
    }

    #[test]
    fn test_record_jwks_metrics() {
        record_jwks_fetch("success", Duration::from_millis(80));
        record_jwks_fetch("error", Duration::from_secs(3));
        record_jwks_stale_served();
    }
}
