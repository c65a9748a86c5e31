use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::ListParams;
use crate::errors::AppError;
use crate::middleware::auth::TokenContext;
use crate::models::dns_server::normalize_name;
use crate::models::zone::{DnsRecord, ZoneData};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ZonesResponse {
    pub zones: Vec<ZoneData>,
}

/// GET /api/v1/dns-server/:name/zone: zones an agent should answer for
pub async fn list_server_zones(
    State(state): State<Arc<AppState>>,
    ctx: TokenContext,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ZonesResponse>, AppError> {
    ctx.require("zone:list")?;

    let server = state
        .store
        .find_dns_server_by_name(&normalize_name(&name))
        .await?
        .ok_or(AppError::NotFound)?;
    let zones = state.store.list_zones_for_server(server.id).await?;

    let mut records: Option<HashMap<i64, Vec<DnsRecord>>> = None;
    if params.includes("dns_records") {
        let ids: Vec<i64> = zones.iter().map(|z| z.id).collect();
        let mut grouped: HashMap<i64, Vec<DnsRecord>> = HashMap::new();
        for record in state.store.list_dns_records(&ids).await? {
            grouped.entry(record.zone_id).or_default().push(record);
        }
        records = Some(grouped);
    }

    let zones = zones
        .into_iter()
        .map(|zone| {
            let zone_records = records
                .as_mut()
                .map(|r| r.remove(&zone.id).unwrap_or_default());
            ZoneData::from_zone(zone, zone_records)
        })
        .collect();

    Ok(Json(ZonesResponse { zones }))
}
