use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ListParams, Pagination};
use crate::errors::AppError;
use crate::middleware::auth::TokenContext;
use crate::models::dns_request::{normalize_query_name, DnsRequest, NewDnsRequest};
use crate::store::SortField;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct DnsRequestResponse {
    pub dns_request: DnsRequest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DnsRequestsResponse {
    pub pagination: Pagination,
    pub dns_requests: Vec<DnsRequest>,
}

/// GET /api/v1/dns-request
pub async fn list_dns_requests(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Query(params): Query<ListParams>,
) -> Result<Json<DnsRequestsResponse>, AppError> {
    ctx.require("dns-request:list")?;
    let page = params.page_request(&[SortField::Id, SortField::CreatedAt])?;
    let (dns_requests, total) = state.store.list_dns_requests(&page).await?;
    Ok(Json(DnsRequestsResponse {
        pagination: Pagination::new(&page, total),
        dns_requests,
    }))
}

/// POST /api/v1/dns-request: record an observed query, linking its zone if any
pub async fn create_dns_request(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Json(mut payload): Json<NewDnsRequest>,
) -> Result<(StatusCode, Json<DnsRequestResponse>), AppError> {
    ctx.require("dns-request:create")?;

    payload.name = normalize_query_name(&payload.name);
    if payload.name.is_empty() {
        return Err(AppError::BadRequest("name is empty".into()));
    }

    let zone_id = match state.store.find_zone_for_name(&payload.name).await? {
        Some(zone) => Some(zone.id),
        None => {
            tracing::warn!("No zone found for dns request {}", payload.name);
            None
        }
    };

    let dns_request = state.store.insert_dns_request(&payload, zone_id).await?;
    tracing::debug!(
        dns_request_id = dns_request.id,
        dns_server = %dns_request.dns_server_name,
        zone_id = ?zone_id,
        "dns request recorded"
    );

    Ok((StatusCode::CREATED, Json(DnsRequestResponse { dns_request })))
}
