//! Bearer token authentication for the control-plane API.
//!
//! Handlers take a [`TokenContext`] argument; extraction verifies the JWT and
//! rejects tokens whose persisted row has been deactivated. Scope checks are
//! done per handler with [`TokenContext::require`].

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::scope::{self, ScopeMatch};
use crate::errors::AppError;
use crate::token::TokenPayload;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct TokenContext {
    /// Raw presented token. Never log this.
    pub token: String,
    pub payload: TokenPayload,
    scope_match: ScopeMatch,
}

impl TokenContext {
    pub fn subject(&self) -> &str {
        &self.payload.subject
    }

    pub fn scope_match(&self) -> ScopeMatch {
        self.scope_match
    }

    /// 403 unless one of the held scopes grants `required`.
    pub fn require(&self, required: &str) -> Result<(), AppError> {
        scope::enforce(self.scope_match, &self.payload.scopes, required, self.subject())
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for TokenContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            tracing::warn!(path = %parts.uri.path(), "missing bearer token");
            AppError::InvalidToken("missing bearer token".into())
        })?;

        let payload = state.tokens.decode(token).map_err(|e| {
            tracing::warn!(path = %parts.uri.path(), "rejected bearer token: {}", e);
            e
        })?;

        // Tokens that were never synced have no row yet and are accepted on
        // their signature alone.
        if let Some(row) = state.store.find_api_token_by_value(token).await? {
            if !row.is_active {
                tracing::warn!(
                    api_token_id = row.id,
                    subject = %payload.subject,
                    "deactivated token presented"
                );
                return Err(AppError::InvalidToken("token deactivated".into()));
            }
        }

        Ok(Self {
            token: token.to_string(),
            payload,
            scope_match: state.config.scope_match,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
