//! Middleware for the Supervision API.
//!
//! # Components
//!
//! - `auth` - Bearer-token authorization for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::{authorize_request, AuthState, AuthorityExt};
pub use http_metrics::http_metrics_middleware;
