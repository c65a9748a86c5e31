use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{BaseResponse, ListParams, Pagination};
use crate::errors::AppError;
use crate::middleware::auth::TokenContext;
use crate::middleware::scope::{authorize_scopes, ScopeSet};
use crate::models::api_token::{ApiTokenData, NewApiToken, SensitiveApiTokenData};
use crate::models::dns_server::DnsServer;
use crate::store::SortField;
use crate::sync::SyncCoordinator;
use crate::token::with_dns_server;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateApiTokenRequest {
    /// Space-separated scopes for the new token.
    pub scopes: String,
    pub dns_server_id: i64,
    /// Defaults to now + the configured token TTL.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiTokenResponse {
    pub api_token: ApiTokenData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SensitiveApiTokenResponse {
    pub api_token: SensitiveApiTokenData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiTokensResponse {
    pub pagination: Pagination,
    pub api_tokens: Vec<ApiTokenData>,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/v1/status: liveness probe polled by agents
pub async fn status() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/v1/api-token/sync: register the presented token and its server
pub async fn sync_api_token(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
) -> Result<Json<ApiTokenResponse>, AppError> {
    let api_token = SyncCoordinator::new(state.store.as_ref(), &state.tokens)
        .sync(&ctx.token, &ctx.payload)
        .await?;
    Ok(Json(ApiTokenResponse { api_token }))
}

/// GET /api/v1/api-token: paginated token list
pub async fn list_api_tokens(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiTokensResponse>, AppError> {
    ctx.require("api-token:list")?;
    let page = params.page_request(&[SortField::Id, SortField::CreatedAt, SortField::ExpiresAt])?;
    let (rows, total) = state.store.list_api_tokens(&page).await?;

    let servers: HashMap<i64, DnsServer> = if params.includes("dns_server") {
        let mut ids: Vec<i64> = rows.iter().map(|r| r.dns_server_id).collect();
        ids.sort_unstable();
        ids.dedup();
        state
            .store
            .find_dns_servers(&ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect()
    } else {
        HashMap::new()
    };

    let api_tokens = rows
        .into_iter()
        .map(|row| {
            let server = servers.get(&row.dns_server_id).cloned();
            row.into_data(server)
        })
        .collect();

    Ok(Json(ApiTokensResponse {
        pagination: Pagination::new(&page, total),
        api_tokens,
    }))
}

/// POST /api/v1/api-token: mint a token for a server, limited to the caller's scopes
pub async fn create_api_token(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Json(payload): Json<CreateApiTokenRequest>,
) -> Result<(StatusCode, Json<ApiTokenResponse>), AppError> {
    ctx.require("api-token:create")?;

    let server = state
        .store
        .find_dns_server(payload.dns_server_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let requested: Vec<String> = payload.scopes.split_whitespace().map(String::from).collect();
    if requested.is_empty() {
        return Err(AppError::BadRequest("no scopes requested".into()));
    }
    let approved = authorize_scopes(
        ctx.scope_match(),
        &ctx.payload.scopes,
        &requested,
        ctx.subject(),
    )?;
    let scopes: ScopeSet = approved.into_iter().collect();

    let ttl = match payload.expires_at {
        Some(at) => (at - Utc::now())
            .to_std()
            .map_err(|_| AppError::BadRequest("expires_at must be in the future".into()))?,
        None => state.tokens.default_ttl(),
    };

    let token = state.tokens.issue(ctx.subject(), &scopes, &server.name, ttl)?;
    let issued = state.tokens.decode(&token)?;

    let row = state
        .store
        .insert_api_token(&NewApiToken {
            token,
            scopes: scopes.join(),
            dns_server_id: server.id,
            expires_at: issued.expires_at()?,
        })
        .await?;

    tracing::info!(
        api_token_id = row.id,
        subject = %ctx.subject(),
        dns_server = %server.name,
        scopes = %scopes,
        "api token created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiTokenResponse {
            api_token: row.into_data(Some(server)),
        }),
    ))
}

/// GET /api/v1/api-token/:id
pub async fn show_api_token(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiTokenResponse>, AppError> {
    ctx.require("api-token:read")?;
    let row = state
        .store
        .find_api_token(id)
        .await?
        .ok_or(AppError::NotFound)?;

    let api_token = if params.includes("dns_server") {
        with_dns_server(state.store.as_ref(), row).await?
    } else {
        row.into_data(None)
    };
    Ok(Json(ApiTokenResponse { api_token }))
}

/// GET /api/v1/api-token/:id/sensitive: includes the raw token value
pub async fn show_sensitive_api_token(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Result<Json<SensitiveApiTokenResponse>, AppError> {
    ctx.require("api-token:sensitive")?;
    let row = state
        .store
        .find_api_token(id)
        .await?
        .ok_or(AppError::NotFound)?;

    let server = if params.includes("dns_server") {
        state.store.find_dns_server(row.dns_server_id).await?
    } else {
        None
    };

    tracing::info!(api_token_id = id, subject = %ctx.subject(), "sensitive api token read");
    Ok(Json(SensitiveApiTokenResponse {
        api_token: row.into_sensitive(server),
    }))
}

/// DELETE /api/v1/api-token/:id: deactivate; succeeds even if absent
pub async fn destroy_api_token(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse>, AppError> {
    ctx.require("api-token:destroy")?;
    if state.store.deactivate_api_token(id).await? {
        tracing::info!(api_token_id = id, subject = %ctx.subject(), "api token deactivated");
    }
    Ok(Json(BaseResponse::success("Deactivation successful")))
}
