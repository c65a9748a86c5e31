//! The `sync` handshake: first contact between an agent and the control plane.
//!
//! NoServer/NoToken -> ServerOnly -> ServerAndToken. Each step is an
//! existence-checked create, so re-running the handshake with the same token
//! lands on the same rows.

use crate::errors::AppError;
use crate::models::api_token::ApiTokenData;
use crate::registry::AgentRegistry;
use crate::store::Store;
use crate::token::{TokenAuthority, TokenPayload};

/// Scopes that allow a token to sync itself. Matched exactly.
pub const SYNC_SCOPES: [&str; 2] = ["api-token", "api-token:syncable"];

pub struct SyncCoordinator<'a> {
    store: &'a dyn Store,
    tokens: &'a TokenAuthority,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(store: &'a dyn Store, tokens: &'a TokenAuthority) -> Self {
        Self { store, tokens }
    }

    pub fn can_sync(payload: &TokenPayload) -> bool {
        SYNC_SCOPES.iter().any(|s| payload.scopes.contains(s))
    }

    /// Register the presented token and its server, returning the persisted
    /// token with its `dns_server` relation loaded.
    pub async fn sync(&self, token: &str, payload: &TokenPayload) -> Result<ApiTokenData, AppError> {
        if !Self::can_sync(payload) {
            tracing::warn!(
                subject = %payload.subject,
                scopes = %payload.scopes,
                "sync attempted without a syncable scope"
            );
            return Err(AppError::Forbidden {
                scope: "api-token:syncable".to_string(),
            });
        }

        let name = payload.require_dns_server_name()?;
        let server = AgentRegistry::new(self.store).resolve_or_create(name).await?;
        self.tokens
            .resolve_or_create(self.store, token, payload, &server)
            .await
    }
}
