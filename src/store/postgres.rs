use async_trait::async_trait;
use sqlx::PgPool;

use super::{PageRequest, Store, StoreError, StoreResult};
use crate::models::api_token::{ApiToken, NewApiToken};
use crate::models::dns_request::{DnsRequest, NewDnsRequest};
use crate::models::dns_server::DnsServer;
use crate::models::zone::{DnsRecord, NewZone, Zone};

const API_TOKEN_COLUMNS: &str =
    "id, token, scopes, dns_server_id, expires_at, is_active, created_at";
const DNS_REQUEST_COLUMNS: &str =
    "id, name, source_address, source_port, type, protocol, dns_server_name, zone_id, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Unique violations become [`StoreError::Duplicate`] so callers can treat
/// them as "already exists".
fn duplicate_or(entity: &'static str, key: &str) -> impl FnOnce(sqlx::Error) -> StoreError {
    let key = key.to_string();
    move |e| {
        let unique = e
            .as_database_error()
            .map_or(false, |db| db.is_unique_violation());
        if unique {
            StoreError::Duplicate { entity, key }
        } else {
            StoreError::Database(e)
        }
    }
}

fn order_clause(page: &PageRequest) -> String {
    format!(
        "ORDER BY {} {}",
        page.sort_by.column(),
        if page.descending { "DESC" } else { "ASC" }
    )
}

#[async_trait]
impl Store for PgStore {
    // -- DNS Server Operations --

    async fn find_dns_server(&self, id: i64) -> StoreResult<Option<DnsServer>> {
        let row = sqlx::query_as::<_, DnsServer>(
            "SELECT id, name, created_at FROM dns_servers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_dns_server_by_name(&self, name: &str) -> StoreResult<Option<DnsServer>> {
        let row = sqlx::query_as::<_, DnsServer>(
            "SELECT id, name, created_at FROM dns_servers WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_dns_servers(&self, ids: &[i64]) -> StoreResult<Vec<DnsServer>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query_as::<_, DnsServer>(
            "SELECT id, name, created_at FROM dns_servers WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_dns_server(&self, name: &str) -> StoreResult<DnsServer> {
        sqlx::query_as::<_, DnsServer>(
            "INSERT INTO dns_servers (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_or("dns_server", name))
    }

    async fn count_dns_servers(&self) -> StoreResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dns_servers")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    // -- API Token Operations --

    async fn find_api_token(&self, id: i64) -> StoreResult<Option<ApiToken>> {
        let row = sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {} FROM api_tokens WHERE id = $1",
            API_TOKEN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_api_token_by_value(&self, token: &str) -> StoreResult<Option<ApiToken>> {
        let row = sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {} FROM api_tokens WHERE token = $1",
            API_TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_api_token(&self, new: &NewApiToken) -> StoreResult<ApiToken> {
        sqlx::query_as::<_, ApiToken>(&format!(
            r#"INSERT INTO api_tokens (token, scopes, dns_server_id, expires_at)
               VALUES ($1, $2, $3, $4)
               RETURNING {}"#,
            API_TOKEN_COLUMNS
        ))
        .bind(&new.token)
        .bind(&new.scopes)
        .bind(new.dns_server_id)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_or("api_token", "token"))
    }

    async fn list_api_tokens(&self, page: &PageRequest) -> StoreResult<(Vec<ApiToken>, i64)> {
        let rows = sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {} FROM api_tokens {} LIMIT $1 OFFSET $2",
            API_TOKEN_COLUMNS,
            order_clause(page)
        ))
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total = self.count_api_tokens().await?;
        Ok((rows, total))
    }

    async fn deactivate_api_token(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE api_tokens SET is_active = false WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_api_tokens(&self) -> StoreResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    // -- Zone Operations --

    async fn insert_zone(&self, new: &NewZone) -> StoreResult<Zone> {
        let mut tx = self.pool.begin().await?;
        let zone = sqlx::query_as::<_, Zone>(
            r#"INSERT INTO zones (domain, ip, dns_server_id)
               VALUES ($1, $2, $3)
               RETURNING id, domain, ip, dns_server_id, created_at"#,
        )
        .bind(&new.domain)
        .bind(&new.ip)
        .bind(new.dns_server_id)
        .fetch_one(&mut *tx)
        .await?;

        for (sort, record) in new.records.iter().enumerate() {
            sqlx::query("INSERT INTO dns_records (zone_id, record, sort) VALUES ($1, $2, $3)")
                .bind(zone.id)
                .bind(record)
                .bind(sort as i32)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(zone)
    }

    async fn list_zones_for_server(&self, dns_server_id: i64) -> StoreResult<Vec<Zone>> {
        let rows = sqlx::query_as::<_, Zone>(
            r#"SELECT id, domain, ip, dns_server_id, created_at FROM zones
               WHERE dns_server_id = $1 OR dns_server_id IS NULL
               ORDER BY id ASC"#,
        )
        .bind(dns_server_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_dns_records(&self, zone_ids: &[i64]) -> StoreResult<Vec<DnsRecord>> {
        if zone_ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query_as::<_, DnsRecord>(
            "SELECT id, zone_id, record, sort FROM dns_records WHERE zone_id = ANY($1) ORDER BY zone_id, sort",
        )
        .bind(zone_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_zone_for_name(&self, name: &str) -> StoreResult<Option<Zone>> {
        let row = sqlx::query_as::<_, Zone>(
            r#"SELECT id, domain, ip, dns_server_id, created_at FROM zones
               WHERE domain <> '' AND strpos($1, domain) > 0
               ORDER BY id ASC LIMIT 1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // -- DNS Request Operations --

    async fn insert_dns_request(
        &self,
        new: &NewDnsRequest,
        zone_id: Option<i64>,
    ) -> StoreResult<DnsRequest> {
        let row = sqlx::query_as::<_, DnsRequest>(&format!(
            r#"INSERT INTO dns_requests (name, source_address, source_port, type, protocol, dns_server_name, zone_id)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {}"#,
            DNS_REQUEST_COLUMNS
        ))
        .bind(&new.name)
        .bind(&new.source_address)
        .bind(new.source_port)
        .bind(&new.query_type)
        .bind(&new.protocol)
        .bind(&new.dns_server_name)
        .bind(zone_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_dns_requests(&self, page: &PageRequest) -> StoreResult<(Vec<DnsRequest>, i64)> {
        let rows = sqlx::query_as::<_, DnsRequest>(&format!(
            "SELECT {} FROM dns_requests {} LIMIT $1 OFFSET $2",
            DNS_REQUEST_COLUMNS,
            order_clause(page)
        ))
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dns_requests")
            .fetch_one(&self.pool)
            .await?;
        Ok((rows, total))
    }
}
