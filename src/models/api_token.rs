use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dns_server::DnsServer;

/// Persisted API token row. Immutable once created except for `is_active`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: i64,
    pub token: String,
    /// Space-separated scope set.
    pub scopes: String,
    pub dns_server_id: i64,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub struct NewApiToken {
    pub token: String,
    pub scopes: String,
    pub dns_server_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Public projection. Never carries the raw token value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTokenData {
    pub id: i64,
    pub scopes: String,
    pub dns_server_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_server: Option<DnsServer>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Projection served by `/api-token/{id}/sensitive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitiveApiTokenData {
    #[serde(flatten)]
    pub data: ApiTokenData,
    pub token: String,
}

impl ApiToken {
    pub fn into_data(self, dns_server: Option<DnsServer>) -> ApiTokenData {
        ApiTokenData {
            id: self.id,
            scopes: self.scopes,
            dns_server_id: self.dns_server_id,
            dns_server,
            expires_at: self.expires_at,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }

    pub fn into_sensitive(self, dns_server: Option<DnsServer>) -> SensitiveApiTokenData {
        let token = self.token.clone();
        SensitiveApiTokenData {
            data: self.into_data(dns_server),
            token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApiToken {
        ApiToken {
            id: 7,
            token: "secret.jwt.value".into(),
            scopes: "dns-request:create zone:list".into(),
            dns_server_id: 3,
            expires_at: Utc::now(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_public_projection_hides_token() {
        let json = serde_json::to_value(sample().into_data(None)).unwrap();
        assert!(json.get("token").is_none());
        assert!(json.get("dns_server").is_none());
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_sensitive_projection_exposes_token() {
        let json = serde_json::to_value(sample().into_sensitive(None)).unwrap();
        assert_eq!(json["token"], "secret.jwt.value");
        assert_eq!(json["scopes"], "dns-request:create zone:list");
    }
}
