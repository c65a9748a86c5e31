use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An observed DNS query reported by an agent.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DnsRequest {
    pub id: i64,
    pub name: String,
    pub source_address: String,
    pub source_port: i32,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub query_type: String,
    pub protocol: String,
    pub dns_server_name: String,
    pub zone_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /dns-request`, also what the agent sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDnsRequest {
    pub name: String,
    pub source_address: String,
    pub source_port: i32,
    #[serde(rename = "type")]
    pub query_type: String,
    pub protocol: String,
    pub dns_server_name: String,
}

/// Query names arrive fully qualified; strip the root label dot(s).
pub fn normalize_query_name(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query_name_strips_trailing_dot() {
        assert_eq!(normalize_query_name("example.com."), "example.com");
        assert_eq!(normalize_query_name("example.com"), "example.com");
        assert_eq!(normalize_query_name("a.b.."), "a.b");
    }

    #[test]
    fn test_new_dns_request_uses_type_key() {
        let req = NewDnsRequest {
            name: "x.example.com".into(),
            source_address: "10.0.0.1".into(),
            source_port: 5353,
            query_type: "A".into(),
            protocol: "udp".into(),
            dns_server_name: "edge".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "A");
        assert!(json.get("query_type").is_none());
    }
}
