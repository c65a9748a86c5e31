//! Scope-based authorization.
//!
//! Scopes are colon-delimited capability names ("api-token:create",
//! "dns-request:list"). A held scope grants a requested scope according to
//! the configured [`ScopeMatch`] policy.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// How a held scope is compared against a requested one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMatch {
    /// Held scope is a substring of the requested scope. Over-approves:
    /// "api" grants "api-token:create". Audit-flagged, kept for compatibility
    /// with already issued tokens.
    #[default]
    Substring,
    /// Held scope's segments are a prefix of the requested scope's segments.
    Hierarchical,
}

impl ScopeMatch {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "substring" => Some(ScopeMatch::Substring),
            "hierarchical" => Some(ScopeMatch::Hierarchical),
            _ => None,
        }
    }

    pub fn grants(&self, held: &str, requested: &str) -> bool {
        match self {
            ScopeMatch::Substring => requested.contains(held),
            ScopeMatch::Hierarchical => {
                let held: Vec<&str> = held.split(':').collect();
                let requested: Vec<&str> = requested.split(':').collect();
                held.len() <= requested.len()
                    && held.iter().zip(requested.iter()).all(|(h, r)| h == r)
            }
        }
    }
}

/// Order-insensitive set of scopes. Serialized on the wire and in storage as
/// a single space-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn parse(s: &str) -> Self {
        Self(s.split_whitespace().map(String::from).collect())
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self) -> String {
        self.iter().collect::<Vec<_>>().join(" ")
    }

    /// True when any held scope grants `required`.
    pub fn grants(&self, policy: ScopeMatch, required: &str) -> bool {
        self.iter().any(|held| policy.grants(held, required))
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.trim().is_empty())
                .collect(),
        )
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join())
    }
}

/// Approve every requested scope or none of them.
///
/// Fails on the first requested scope no held scope grants; anything approved
/// before that point is discarded.
pub fn authorize_scopes(
    policy: ScopeMatch,
    held: &ScopeSet,
    requested: &[String],
    subject: &str,
) -> Result<Vec<String>, AppError> {
    let mut approved = Vec::with_capacity(requested.len());
    for scope in requested {
        if !held.grants(policy, scope) {
            tracing::warn!(
                subject = subject,
                requested_scope = %scope,
                "attempt to create unauthorized scope"
            );
            return Err(AppError::UnauthorizedScope {
                scope: scope.clone(),
            });
        }
        approved.push(scope.clone());
    }
    Ok(approved)
}

/// Gate an endpoint on a single required scope. Returns 403 on failure.
pub fn enforce(
    policy: ScopeMatch,
    held: &ScopeSet,
    required: &str,
    subject: &str,
) -> Result<(), AppError> {
    if held.grants(policy, required) {
        return Ok(());
    }
    tracing::warn!(
        subject = subject,
        scope = required,
        held = %held,
        "scope check denied"
    );
    Err(AppError::Forbidden {
        scope: required.to_string(),
    })
}

// ── Tests ───────────────────────────────────────────────────────
