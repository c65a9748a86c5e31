use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A DNS server identity, registered lazily the first time an agent syncs.
/// The name is stored lower-cased and is unique.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct DnsServer {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Canonical form of a server name used for lookups and storage.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
