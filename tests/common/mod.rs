//! Shared harness: an in-memory control plane driven through the router.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use dnsbeacon::config::{Config, StoreBackend};
use dnsbeacon::middleware::scope::{ScopeMatch, ScopeSet};
use dnsbeacon::store::memory::MemoryStore;
use dnsbeacon::store::Store;
use dnsbeacon::{api, AppState};

pub const SECRET: &str = "integration-test-secret";

pub fn test_config() -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        store: StoreBackend::Memory,
        jwt_secret: SECRET.to_string(),
        token_ttl: Duration::from_secs(3600),
        scope_match: ScopeMatch::Substring,
        dashboard_origin: "http://localhost:3000".to_string(),
        json_logs: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let state = Arc::new(AppState::new(dyn_store, config));
        Self {
            router: api::app(state.clone()),
            state,
            store,
        }
    }

    /// Sign a token with the app's key. Nothing is persisted.
    pub fn mint(&self, scopes: &str, dns_server: &str) -> String {
        self.state
            .tokens
            .issue("tester", &ScopeSet::parse(scopes), dns_server, Duration::from_secs(600))
            .unwrap()
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        call(&self.router, method, uri, token, body).await
    }
}

pub async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(v) => req
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&v).unwrap()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
