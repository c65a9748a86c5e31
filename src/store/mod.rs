pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::api_token::{ApiToken, NewApiToken};
use crate::models::dns_request::{DnsRequest, NewDnsRequest};
use crate::models::dns_server::DnsServer;
use crate::models::zone::{DnsRecord, NewZone, Zone};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key already exists. Idempotent creates recover from this by
    /// re-reading the row.
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Columns list endpoints may sort on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Id,
    CreatedAt,
    ExpiresAt,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(SortField::Id),
            "created_at" => Some(SortField::CreatedAt),
            "expires_at" => Some(SortField::ExpiresAt),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::CreatedAt => "created_at",
            SortField::ExpiresAt => "expires_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: i64,
    pub per_page: i64,
    pub sort_by: SortField,
    pub descending: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            sort_by: SortField::Id,
            descending: false,
        }
    }
}

impl PageRequest {
    pub const MAX_PER_PAGE: i64 = 100;
    /// Largest page whose offset fits in an i64 at [`Self::MAX_PER_PAGE`].
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_PER_PAGE;

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.per_page)
    }
}

/// Persistence seam for the control plane.
///
/// Creates are plain inserts guarded by unique keys (`dns_servers.name`,
/// `api_tokens.token`); a conflicting insert must fail with
/// [`StoreError::Duplicate`] rather than creating a second row.
#[async_trait]
pub trait Store: Send + Sync {
    // -- DNS servers --
    async fn find_dns_server(&self, id: i64) -> StoreResult<Option<DnsServer>>;
    async fn find_dns_server_by_name(&self, name: &str) -> StoreResult<Option<DnsServer>>;
    async fn find_dns_servers(&self, ids: &[i64]) -> StoreResult<Vec<DnsServer>>;
    async fn insert_dns_server(&self, name: &str) -> StoreResult<DnsServer>;
    async fn count_dns_servers(&self) -> StoreResult<i64>;

    // -- API tokens --
    async fn find_api_token(&self, id: i64) -> StoreResult<Option<ApiToken>>;
    async fn find_api_token_by_value(&self, token: &str) -> StoreResult<Option<ApiToken>>;
    async fn insert_api_token(&self, token: &NewApiToken) -> StoreResult<ApiToken>;
    async fn list_api_tokens(&self, page: &PageRequest) -> StoreResult<(Vec<ApiToken>, i64)>;
    /// Returns whether a row was found.
    async fn deactivate_api_token(&self, id: i64) -> StoreResult<bool>;
    async fn count_api_tokens(&self) -> StoreResult<i64>;

    // -- Zones --
    async fn insert_zone(&self, zone: &NewZone) -> StoreResult<Zone>;
    /// Zones assigned to the server plus zones served by everyone.
    async fn list_zones_for_server(&self, dns_server_id: i64) -> StoreResult<Vec<Zone>>;
    async fn list_dns_records(&self, zone_ids: &[i64]) -> StoreResult<Vec<DnsRecord>>;
    /// First zone (lowest id) whose domain is contained in `name`.
    async fn find_zone_for_name(&self, name: &str) -> StoreResult<Option<Zone>>;

    // -- Observed requests --
    async fn insert_dns_request(
        &self,
        request: &NewDnsRequest,
        zone_id: Option<i64>,
    ) -> StoreResult<DnsRequest>;
    async fn list_dns_requests(&self, page: &PageRequest) -> StoreResult<(Vec<DnsRequest>, i64)>;
}
