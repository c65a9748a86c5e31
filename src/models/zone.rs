use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    pub domain: String,
    pub ip: String,
    /// `None` means every agent serves this zone.
    pub dns_server_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: i64,
    pub zone_id: i64,
    pub record: String,
    pub sort: i32,
}

pub struct NewZone {
    pub domain: String,
    pub ip: String,
    pub dns_server_id: Option<i64>,
    pub records: Vec<String>,
}

/// Zone as returned to agents, optionally with its records embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneData {
    pub id: i64,
    pub domain: String,
    pub ip: String,
    pub dns_server_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_records: Option<Vec<DnsRecord>>,
}

impl ZoneData {
    pub fn from_zone(zone: Zone, records: Option<Vec<DnsRecord>>) -> Self {
        Self {
            id: zone.id,
            domain: zone.domain,
            ip: zone.ip,
            dns_server_id: zone.dns_server_id,
            dns_records: records,
        }
    }
}

/// Zone association rule for observed requests: the zone's domain must
/// appear somewhere inside the requested name.
pub fn zone_covers(domain: &str, name: &str) -> bool {
    !domain.is_empty() && name.contains(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_covers_subdomain() {
        assert!(zone_covers("example.com", "admin.example.com"));
        assert!(zone_covers("example.com", "example.com"));
    }

    #[test]
    fn test_zone_does_not_cover_other_domain() {
        assert!(!zone_covers("example.com", "example.org"));
        assert!(!zone_covers("", "example.org"));
    }
}
