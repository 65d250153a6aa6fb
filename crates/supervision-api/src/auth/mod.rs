//! Bearer-token authorization.
//!
//! # Components
//!
//! - `jwks` - Key resolver: cached, single-flight JWKS fetching
//! - `jwt` - Token verifier producing an [`Authority`]
//! - `policy` - Route policy table
//! - `authorizer` - Header + requirement to decision
//! - `config` - Immutable [`AuthConfig`] and its builder

pub mod authority;
pub mod authorizer;
pub mod claims;
pub mod config;
pub mod jwks;
pub mod jwt;
pub mod policy;

pub use authority::Authority;
pub use authorizer::{extract_bearer_token, AuthAction, AuthDecision, AuthOutcome, Authorizer};
pub use claims::Claims;
pub use config::{AuthConfig, AuthConfigBuilder, AuthConfigError, KeySource};
pub use jwks::{HttpJwksFetcher, JwksCacheSettings, JwksClient, JwksFetcher, KeySet, SigningKey};
pub use jwt::{ClaimRules, JwtValidator};
pub use policy::{supervision_routes, RoutePolicy, ScopeSet};
