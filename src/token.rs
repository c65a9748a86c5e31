//! Bearer token minting, verification, and persist-on-first-use.
//!
//! Tokens are HS256 JWTs carrying `sub`, `scopes` (space-joined),
//! `dns_server_name` and `exp`. `iat` and a random `jti` keep two tokens
//! minted with identical claims distinct.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::scope::ScopeSet;
use crate::models::api_token::{ApiToken, ApiTokenData, NewApiToken};
use crate::models::dns_server::DnsServer;
use crate::store::{Store, StoreError};

/// Wire claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub scopes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_server_name: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Decoded claim set; the authorization context of every protected call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub subject: String,
    pub scopes: ScopeSet,
    pub dns_server_name: Option<String>,
    pub exp: i64,
}

impl From<Claims> for TokenPayload {
    fn from(c: Claims) -> Self {
        Self {
            subject: c.sub,
            scopes: ScopeSet::parse(&c.scopes),
            dns_server_name: c.dns_server_name.filter(|n| !n.trim().is_empty()),
            exp: c.exp,
        }
    }
}

impl TokenPayload {
    pub fn expires_at(&self) -> Result<DateTime<Utc>, AppError> {
        DateTime::from_timestamp(self.exp, 0)
            .ok_or_else(|| AppError::InvalidToken("exp claim out of range".into()))
    }

    pub fn require_dns_server_name(&self) -> Result<&str, AppError> {
        self.dns_server_name
            .as_deref()
            .ok_or_else(|| AppError::InvalidToken("no dns_server_name claim".into()))
    }
}

/// Process-wide signer/verifier. Read-only after construction.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &[u8], default_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn issue(
        &self,
        subject: &str,
        scopes: &ScopeSet,
        dns_server_name: &str,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            scopes: scopes.join(),
            dns_server_name: Some(dns_server_name.to_string()),
            exp: now + ttl.as_secs() as i64,
            iat: now,
            jti: Some(Uuid::new_v4().to_string()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("token signing failed: {}", e)))
    }

    /// Verify signature and expiry.
    pub fn decode(&self, token: &str) -> Result<TokenPayload, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| AppError::InvalidToken(e.to_string()))?;
        Ok(data.claims.into())
    }

    /// Return the persisted row for `token`, creating it on first use.
    ///
    /// A duplicate-key failure means a concurrent caller created the row
    /// first; it is re-read, never surfaced.
    pub async fn resolve_or_create(
        &self,
        store: &dyn Store,
        token: &str,
        payload: &TokenPayload,
        owner: &DnsServer,
    ) -> Result<ApiTokenData, AppError> {
        if let Some(existing) = store.find_api_token_by_value(token).await? {
            tracing::info!(api_token_id = existing.id, "token already exists in database");
            return with_dns_server(store, existing).await;
        }

        tracing::info!(dns_server = %owner.name, "saving api token from auth token");
        let new = NewApiToken {
            token: token.to_string(),
            scopes: payload.scopes.join(),
            dns_server_id: owner.id,
            expires_at: payload.expires_at()?,
        };
        match store.insert_api_token(&new).await {
            Ok(row) => Ok(row.into_data(Some(owner.clone()))),
            Err(StoreError::Duplicate { .. }) => {
                tracing::debug!("api token created concurrently, re-reading");
                let row = store.find_api_token_by_value(token).await?.ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("api token vanished after duplicate insert"))
                })?;
                with_dns_server(store, row).await
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Load the `dns_server` relation for a token row.
pub async fn with_dns_server(store: &dyn Store, row: ApiToken) -> Result<ApiTokenData, AppError> {
    let server = store.find_dns_server(row.dns_server_id).await?;
    Ok(row.into_data(server))
}

/// Read claims without checking the signature or expiry.
///
/// Agents use this on their own token to learn their server name; the result
/// must not be trusted for authorization.
pub fn decode_unverified(token: &str) -> Result<TokenPayload, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims.into())
}
