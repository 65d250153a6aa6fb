//! Verified caller identity.

use std::collections::BTreeSet;
use std::fmt;

/// The verified identity and granted scopes of one request.
///
/// Only [`JwtValidator`](crate::auth::JwtValidator) constructs an
/// `Authority`, and only after signature and standard-claim verification
/// succeeded. Handlers read it from request extensions; it is never
/// persisted. The subject is redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Authority {
    subject: String,
    scopes: BTreeSet<String>,
}

impl Authority {
    pub(crate) fn from_verified(subject: String, scopes: BTreeSet<String>) -> Self {
        Self { subject, scopes }
    }

    /// Opaque user identifier (`sub` claim).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Granted scopes.
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Check if a specific scope was granted.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Check whether any of `required` was granted.
    pub fn intersects(&self, required: &BTreeSet<String>) -> bool {
        !self.scopes.is_disjoint(required)
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("subject", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_authority(subject: &str, scopes: &[&str]) -> Authority {
    Authority::from_verified(
        subject.to_string(),
        scopes.iter().map(ToString::to_string).collect(),
    )
}
