//! JWT claims structure.
//!
//! Contains the claims decoded from a signature-verified token, before the
//! standard-claim checks run. Every field is optional at this stage so that
//! a missing claim becomes a verification failure rather than a decode
//! error with a different code path. The `sub` field is redacted in Debug
//! output to prevent exposure in logs.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;

/// The `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// Check whether `expected` is one of the token's audiences.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims of an access token issued by the identity provider.
#[derive(Clone, Default, Deserialize)]
pub struct Claims {
    /// Subject (user identifier) - redacted in Debug output.
    #[serde(default)]
    pub sub: Option<String>,

    /// Issuer URL.
    #[serde(default)]
    pub iss: Option<String>,

    /// Audience(s) the token was minted for.
    #[serde(default)]
    pub aud: Option<Audience>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default)]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default)]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default)]
    pub iat: Option<i64>,

    /// Space-separated OAuth scopes.
    #[serde(default)]
    pub scope: Option<String>,

    /// RBAC permissions granted by the identity provider.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("scope", &self.scope)
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl Claims {
    /// All granted scopes: the whitespace-split `scope` claim united with the
    /// `permissions` claim. Duplicates collapse.
    pub fn granted_scopes(&self) -> BTreeSet<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .chain(self.permissions.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}
