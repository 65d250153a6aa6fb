//! Supervision API configuration.
//!
//! Configuration is loaded from environment variables. Credentials embedded
//! in the key service URL are redacted in Debug output.

use crate::auth::jwks::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_STALE};
use crate::auth::{supervision_routes, AuthConfig, AuthConfigError};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Request timeout applied to every route, in seconds.
pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Supervision API configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// URL of the identity provider's JWKS endpoint.
    pub jwks_url: String,

    /// Required token issuer.
    pub issuer: String,

    /// Required token audience.
    pub audience: String,

    /// Pass denied requests through to handlers (default: false).
    pub allow_unmatched: bool,

    /// JWT clock skew tolerance in seconds for `nbf`/`iat`.
    pub jwt_clock_skew_seconds: u64,

    /// Signing key cache TTL in seconds.
    pub jwks_cache_ttl_seconds: u64,

    /// How long cached keys may be served while the key service is down.
    pub jwks_max_stale_seconds: u64,

    /// Deadline for one key refresh in seconds. Below the request timeout.
    pub jwks_fetch_timeout_seconds: u64,

    /// Debug logging.
    pub debug: bool,

    /// Emit logs as JSON.
    pub json_logs: bool,

    /// Graceful shutdown drain period in seconds.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts URL credentials.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("jwks_url", &redact_userinfo(&self.jwks_url))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("allow_unmatched", &self.allow_unmatched)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field("jwks_max_stale_seconds", &self.jwks_max_stale_seconds)
            .field("jwks_fetch_timeout_seconds", &self.jwks_fetch_timeout_seconds)
            .field("debug", &self.debug)
            .field("json_logs", &self.json_logs)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

fn redact_userinfo(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let (scheme, _) = url.split_at(scheme_end + 3);
            let (_, host) = url.split_at(at + 1);
            format!("{scheme}[REDACTED]@{host}")
        }
        _ => url.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS cache configuration: {0}")]
    InvalidJwksCache(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid auth configuration: {0}")]
    Auth(#[from] AuthConfigError),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_url = required(vars, "JWKS_URL")?;
        let issuer = required(vars, "ISSUER")?;
        let audience = required(vars, "AUDIENCE")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let allow_unmatched = match vars.get("ALLOW_UNMATCHED").map(String::as_str) {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "ALLOW_UNMATCHED must be 'true' or 'false', got '{}'",
                    other
                )))
            }
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        let jwks_cache_ttl_seconds = positive_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_CACHE_TTL.as_secs(),
        )
        .map_err(ConfigError::InvalidJwksCache)?;

        let jwks_max_stale_seconds = positive_seconds(
            vars,
            "JWKS_MAX_STALE_SECONDS",
            DEFAULT_MAX_STALE.as_secs(),
        )
        .map_err(ConfigError::InvalidJwksCache)?;

        if jwks_max_stale_seconds < jwks_cache_ttl_seconds {
            return Err(ConfigError::InvalidJwksCache(format!(
                "JWKS_MAX_STALE_SECONDS ({}) must not be less than JWKS_CACHE_TTL_SECONDS ({})",
                jwks_max_stale_seconds, jwks_cache_ttl_seconds
            )));
        }

        let jwks_fetch_timeout_seconds = positive_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT.as_secs(),
        )
        .map_err(ConfigError::InvalidJwksCache)?;

        if jwks_fetch_timeout_seconds >= REQUEST_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidJwksCache(format!(
                "JWKS_FETCH_TIMEOUT_SECONDS ({}) must be less than the {} second request timeout",
                jwks_fetch_timeout_seconds, REQUEST_TIMEOUT_SECONDS
            )));
        }

        // Any casing of "true" turns debug logging on
        let debug = vars
            .get("DEBUG")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        let json_logs = vars
            .get("LOG_FORMAT")
            .is_some_and(|value| value.eq_ignore_ascii_case("json"));

        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        Ok(Config {
            bind_address,
            jwks_url,
            issuer,
            audience,
            allow_unmatched,
            jwt_clock_skew_seconds,
            jwks_cache_ttl_seconds,
            jwks_max_stale_seconds,
            jwks_fetch_timeout_seconds,
            debug,
            json_logs,
            drain_seconds,
        })
    }

    /// Authorization settings for this service, with the supervision route
    /// table registered.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Auth` if the values are rejected by the builder.
    pub fn auth_config(&self, http_client: reqwest::Client) -> Result<AuthConfig, ConfigError> {
        Ok(AuthConfig::builder()
            .issuer(self.issuer.clone())
            .audience(self.audience.clone())
            .jwks_url(self.jwks_url.clone())
            .http_client(http_client)
            .allow_unmatched(self.allow_unmatched)
            .clock_skew(Duration::from_secs(self.jwt_clock_skew_seconds))
            .cache_ttl(Duration::from_secs(self.jwks_cache_ttl_seconds))
            .max_stale(Duration::from_secs(self.jwks_max_stale_seconds))
            .fetch_timeout(Duration::from_secs(self.jwks_fetch_timeout_seconds))
            .routes(supervision_routes())
            .build()?)
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn positive_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, String> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        )
    })?;

    if value == 0 {
        return Err(format!("{} must be greater than 0", name));
    }

    Ok(value)
}
