//! Supervision API Library
//!
//! Bearer-token authorization in front of the supervision CRUD backend
//! (students, supervisors, applications, Gantt charts and meetings).
//!
//! Every protected request carries an RFC 6750 bearer token issued by an
//! OAuth2/OIDC identity provider. The token is verified against the
//! provider's published JWKS and its scopes are checked against the route's
//! requirement before a handler runs.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth::Authorizer -> auth::JwtValidator -> auth::JwksClient
//!                                     \-> auth::RoutePolicy
//! ```
//!
//! # Modules
//!
//! - `auth` - Key resolver, token verifier, route policy and authorizer
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authorization and HTTP metrics middleware
//! - `models` - Response bodies
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
