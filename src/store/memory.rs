//! In-process store used by tests and `DNSBEACON_STORE=memory` runs.
//!
//! Enforces the same unique keys as the Postgres schema so idempotent-create
//! races behave identically.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{PageRequest, SortField, Store, StoreError, StoreResult};
use crate::models::api_token::{ApiToken, NewApiToken};
use crate::models::dns_request::{DnsRequest, NewDnsRequest};
use crate::models::dns_server::DnsServer;
use crate::models::zone::{zone_covers, DnsRecord, NewZone, Zone};

#[derive(Default)]
struct Tables {
    dns_servers: Vec<DnsServer>,
    api_tokens: Vec<ApiToken>,
    zones: Vec<Zone>,
    dns_records: Vec<DnsRecord>,
    dns_requests: Vec<DnsRequest>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(
    rows: &[T],
    page: &PageRequest,
    key: impl Fn(&T, SortField) -> i64,
) -> (Vec<T>, i64) {
    let mut sorted: Vec<T> = rows.to_vec();
    sorted.sort_by_key(|r| key(r, page.sort_by));
    if page.descending {
        sorted.reverse();
    }
    let total = sorted.len() as i64;
    let items = sorted
        .into_iter()
        .skip(page.offset().max(0) as usize)
        .take(page.per_page.max(0) as usize)
        .collect();
    (items, total)
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_dns_server(&self, id: i64) -> StoreResult<Option<DnsServer>> {
        let t = self.tables.lock().await;
        Ok(t.dns_servers.iter().find(|s| s.id == id).cloned())
    }

    async fn find_dns_server_by_name(&self, name: &str) -> StoreResult<Option<DnsServer>> {
        let t = self.tables.lock().await;
        Ok(t.dns_servers.iter().find(|s| s.name == name).cloned())
    }

    async fn find_dns_servers(&self, ids: &[i64]) -> StoreResult<Vec<DnsServer>> {
        let t = self.tables.lock().await;
        Ok(t
            .dns_servers
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn insert_dns_server(&self, name: &str) -> StoreResult<DnsServer> {
        let mut t = self.tables.lock().await;
        if t.dns_servers.iter().any(|s| s.name == name) {
            return Err(StoreError::Duplicate {
                entity: "dns_server",
                key: name.to_string(),
            });
        }
        let server = DnsServer {
            id: t.next_id(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        t.dns_servers.push(server.clone());
        Ok(server)
    }

    async fn count_dns_servers(&self) -> StoreResult<i64> {
        Ok(self.tables.lock().await.dns_servers.len() as i64)
    }

    async fn find_api_token(&self, id: i64) -> StoreResult<Option<ApiToken>> {
        let t = self.tables.lock().await;
        Ok(t.api_tokens.iter().find(|a| a.id == id).cloned())
    }

    async fn find_api_token_by_value(&self, token: &str) -> StoreResult<Option<ApiToken>> {
        let t = self.tables.lock().await;
        Ok(t.api_tokens.iter().find(|a| a.token == token).cloned())
    }

    async fn insert_api_token(&self, new: &NewApiToken) -> StoreResult<ApiToken> {
        let mut t = self.tables.lock().await;
        if t.api_tokens.iter().any(|a| a.token == new.token) {
            // Never echo the token value itself.
            return Err(StoreError::Duplicate {
                entity: "api_token",
                key: "token".to_string(),
            });
        }
        let row = ApiToken {
            id: t.next_id(),
            token: new.token.clone(),
            scopes: new.scopes.clone(),
            dns_server_id: new.dns_server_id,
            expires_at: new.expires_at,
            is_active: true,
            created_at: Utc::now(),
        };
        t.api_tokens.push(row.clone());
        Ok(row)
    }

    async fn list_api_tokens(&self, page: &PageRequest) -> StoreResult<(Vec<ApiToken>, i64)> {
        let t = self.tables.lock().await;
        Ok(paginate(&t.api_tokens, page, |row, field| match field {
            SortField::Id => row.id,
            SortField::CreatedAt => row.created_at.timestamp_micros(),
            SortField::ExpiresAt => row.expires_at.timestamp_micros(),
        }))
    }

    async fn deactivate_api_token(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        match t.api_tokens.iter_mut().find(|a| a.id == id) {
            Some(row) => {
                row.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_api_tokens(&self) -> StoreResult<i64> {
        Ok(self.tables.lock().await.api_tokens.len() as i64)
    }

    async fn insert_zone(&self, new: &NewZone) -> StoreResult<Zone> {
        let mut t = self.tables.lock().await;
        let zone = Zone {
            id: t.next_id(),
            domain: new.domain.clone(),
            ip: new.ip.clone(),
            dns_server_id: new.dns_server_id,
            created_at: Utc::now(),
        };
        t.zones.push(zone.clone());
        for (sort, record) in new.records.iter().enumerate() {
            let id = t.next_id();
            t.dns_records.push(DnsRecord {
                id,
                zone_id: zone.id,
                record: record.clone(),
                sort: sort as i32,
            });
        }
        Ok(zone)
    }

    async fn list_zones_for_server(&self, dns_server_id: i64) -> StoreResult<Vec<Zone>> {
        let t = self.tables.lock().await;
        Ok(t
            .zones
            .iter()
            .filter(|z| z.dns_server_id.map_or(true, |id| id == dns_server_id))
            .cloned()
            .collect())
    }

    async fn list_dns_records(&self, zone_ids: &[i64]) -> StoreResult<Vec<DnsRecord>> {
        let t = self.tables.lock().await;
        let mut records: Vec<DnsRecord> = t
            .dns_records
            .iter()
            .filter(|r| zone_ids.contains(&r.zone_id))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.zone_id, r.sort));
        Ok(records)
    }

    async fn find_zone_for_name(&self, name: &str) -> StoreResult<Option<Zone>> {
        let t = self.tables.lock().await;
        Ok(t.zones.iter().find(|z| zone_covers(&z.domain, name)).cloned())
    }

    async fn insert_dns_request(
        &self,
        new: &NewDnsRequest,
        zone_id: Option<i64>,
    ) -> StoreResult<DnsRequest> {
        let mut t = self.tables.lock().await;
        let row = DnsRequest {
            id: t.next_id(),
            name: new.name.clone(),
            source_address: new.source_address.clone(),
            source_port: new.source_port,
            query_type: new.query_type.clone(),
            protocol: new.protocol.clone(),
            dns_server_name: new.dns_server_name.clone(),
            zone_id,
            created_at: Utc::now(),
        };
        t.dns_requests.push(row.clone());
        Ok(row)
    }

    async fn list_dns_requests(&self, page: &PageRequest) -> StoreResult<(Vec<DnsRequest>, i64)> {
        let t = self.tables.lock().await;
        Ok(paginate(&t.dns_requests, page, |row, field| match field {
            SortField::CreatedAt => row.created_at.timestamp_micros(),
            _ => row.id,
        }))
    }
}
