//! HTTP client an agent uses to talk to the control plane.
//!
//! Every request carries the agent's bearer token. Non-2xx responses are
//! logged with their body; the `fail` flag on the helpers decides whether
//! that becomes an error or is swallowed.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::api::handlers::ApiTokenResponse;
use crate::api::zones::ZonesResponse;
use crate::api::API_ROOT;
use crate::models::api_token::ApiTokenData;
use crate::models::dns_request::{normalize_query_name, NewDnsRequest};
use crate::models::zone::ZoneData;
use crate::token::decode_unverified;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid api token: {0}")]
    InvalidToken(String),

    #[error("http client setup failed: {0}")]
    Setup(reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Short failure class for log lines.
    pub fn class(&self) -> &'static str {
        match self {
            ClientError::InvalidToken(_) => "invalid_token",
            ClientError::Setup(_) => "setup",
            ClientError::Transport { source, .. } if source.is_connect() => "connect",
            ClientError::Transport { source, .. } if source.is_timeout() => "timeout",
            ClientError::Transport { .. } => "transport",
            ClientError::Status { .. } => "status",
            ClientError::Decode { .. } => "decode",
        }
    }
}

/// Bounds for [`ApiClient::wait_for_up`].
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
    /// Pause after the first successful probe before reporting the API as up.
    pub settle: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            max_attempts: 60,
            settle: Duration::from_secs(3),
        }
    }
}

pub struct ApiClient {
    http: Client,
    api_url: String,
    api_token: String,
    dns_server_name: String,
}

impl ApiClient {
    /// The token is decoded without verification to learn this agent's
    /// server name; it fails fast if the claim is missing.
    pub fn new(api_url: &str, api_token: &str) -> Result<Self, ClientError> {
        let payload =
            decode_unverified(api_token).map_err(|e| ClientError::InvalidToken(e.to_string()))?;
        let dns_server_name = payload.dns_server_name.ok_or_else(|| {
            error!("no dns_server_name on api token");
            ClientError::InvalidToken("no dns_server_name on api token".into())
        })?;

        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("dnsbeacon-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Setup)?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            dns_server_name,
        })
    }

    pub fn dns_server_name(&self) -> &str {
        &self.dns_server_name
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.api_url, API_ROOT, path)
    }

    /// Poll the status endpoint until it answers or the attempt budget runs out.
    /// Never errors: `false` means the API did not come up.
    pub async fn wait_for_up(&self, policy: &WaitPolicy) -> bool {
        sleep(policy.initial_delay).await;
        for attempt in 1..=policy.max_attempts {
            info!(attempt, "checking for api status");
            match self.get_status().await {
                Ok(_) => {
                    sleep(policy.settle).await;
                    return true;
                }
                Err(e) => {
                    info!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        class = e.class(),
                        "api check not ready"
                    );
                }
            }
            if attempt < policy.max_attempts {
                sleep(policy.interval).await;
            }
        }
        warn!(
            attempts = policy.max_attempts,
            "could not connect to api. api not up"
        );
        false
    }

    pub async fn get_status(&self) -> Result<Value, ClientError> {
        self.get("/status", &[], true).await
    }

    /// Register this agent's token and server. Failure here is fatal to startup.
    pub async fn sync(&self) -> Result<ApiTokenData, ClientError> {
        info!("syncing api token");
        let url = self.url("/api-token/sync");
        let body = self.post("/api-token/sync", &Value::Object(Default::default()), true).await?;
        let resp: ApiTokenResponse = decode_body(&url, body)?;
        Ok(resp.api_token)
    }

    /// Zones (with records) this agent should answer for.
    pub async fn get_zones(&self) -> Result<Vec<ZoneData>, ClientError> {
        info!("getting zones");
        let path = format!("/dns-server/{}/zone", self.dns_server_name);
        let url = self.url(&path);
        let body = self
            .get(&path, &[("includes", "dns_records")], true)
            .await?;
        let resp: ZonesResponse = decode_body(&url, body)?;
        Ok(resp.zones)
    }

    /// Report an observed query. Failures are logged, never returned.
    pub async fn report_query(
        &self,
        client_address: &str,
        client_port: u16,
        query_name: &str,
        query_type: &str,
        protocol: &str,
    ) {
        let request = NewDnsRequest {
            name: normalize_query_name(query_name),
            source_address: client_address.to_string(),
            source_port: i32::from(client_port),
            query_type: query_type.to_string(),
            protocol: protocol.to_string(),
            dns_server_name: self.dns_server_name.clone(),
        };
        debug!(name = %request.name, query_type = %request.query_type, "creating dns request");

        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                warn!("could not encode dns request: {}", e);
                return;
            }
        };
        if let Err(e) = self.post("/dns-request", &body, false).await {
            warn!(class = e.class(), "failed to report dns request: {}", e);
        }
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        fail: bool,
    ) -> Result<Value, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "Getting URL");
        let req = self.http.request(Method::GET, &url).query(query);
        self.send(req, &url, fail).await
    }

    pub async fn post(&self, path: &str, body: &Value, fail: bool) -> Result<Value, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "Posting URL");
        let req = self.http.request(Method::POST, &url).json(body);
        self.send(req, &url, fail).await
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        url: &str,
        fail: bool,
    ) -> Result<Value, ClientError> {
        let transport = |source| ClientError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = req
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport)?;

        if !status.is_success() {
            error!(url = %url, status = %status, body = %body, "error calling api");
            if fail {
                return Err(ClientError::Status {
                    url: url.to_string(),
                    status,
                    body,
                });
            }
            return Ok(serde_json::from_str(&body).unwrap_or(Value::Null));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn decode_body<T: DeserializeOwned>(url: &str, body: Value) -> Result<T, ClientError> {
    serde_json::from_value(body).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::scope::ScopeSet;
    use crate::token::TokenAuthority;

    fn token_for(server: &str) -> String {
        TokenAuthority::new(b"agent-test", Duration::from_secs(60))
            .issue("agent", &ScopeSet::parse("zone:list"), server, Duration::from_secs(60))
            .unwrap()
    }

    #[test]
    fn test_new_reads_server_name_from_token() {
        let client = ApiClient::new("http://api.local/", &token_for("edge-07")).unwrap();
        assert_eq!(client.dns_server_name(), "edge-07");
        assert_eq!(client.url("/status"), "http://api.local/api/v1/status");
    }

    #[test]
    fn test_new_rejects_garbage_token() {
        let err = ApiClient::new("http://api.local", "garbage").err().unwrap();
        assert!(matches!(err, ClientError::InvalidToken(_)));
        assert_eq!(err.class(), "invalid_token");
    }

    #[test]
    fn test_default_wait_policy_is_bounded() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.max_attempts, 60);
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
    }
}
