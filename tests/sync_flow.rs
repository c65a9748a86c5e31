//! Agent sync handshake: idempotence, concurrency and scope gating.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

use common::{call, TestApp, SECRET};
use dnsbeacon::models::api_token::{ApiToken, NewApiToken};
use dnsbeacon::models::dns_request::{DnsRequest, NewDnsRequest};
use dnsbeacon::models::dns_server::DnsServer;
use dnsbeacon::models::zone::{DnsRecord, NewZone, Zone};
use dnsbeacon::store::memory::MemoryStore;
use dnsbeacon::store::{PageRequest, Store, StoreResult};
use dnsbeacon::sync::SyncCoordinator;
use dnsbeacon::token::Claims;

const SYNC: &str = "/api/v1/api-token/sync";

mod handshake_tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_creates_server_and_token() {
        let app = TestApp::new();
        let token = app.mint("api-token:syncable zone:list", "Edge-01");

        let (status, body) = app.call(Method::POST, SYNC, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["api_token"]["dns_server"]["name"], "edge-01");
        assert_eq!(body["api_token"]["scopes"], "api-token:syncable zone:list");
        assert_eq!(body["api_token"]["is_active"], true);
        assert!(body["api_token"].get("token").is_none(), "token value must not leak");

        assert_eq!(app.store.count_dns_servers().await.unwrap(), 1);
        assert_eq!(app.store.count_api_tokens().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resync_returns_same_row() {
        let app = TestApp::new();
        let token = app.mint("api-token:syncable", "edge-01");

        let (_, first) = app.call(Method::POST, SYNC, Some(&token), None).await;
        let (status, second) = app.call(Method::POST, SYNC, Some(&token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["api_token"]["id"], second["api_token"]["id"]);
        assert_eq!(app.store.count_dns_servers().await.unwrap(), 1);
        assert_eq!(app.store.count_api_tokens().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_two_tokens_share_one_server() {
        let app = TestApp::new();
        let a = app.mint("api-token", "edge-01");
        let b = app.mint("api-token", "EDGE-01");

        let (_, first) = app.call(Method::POST, SYNC, Some(&a), None).await;
        let (_, second) = app.call(Method::POST, SYNC, Some(&b), None).await;

        assert_ne!(first["api_token"]["id"], second["api_token"]["id"]);
        assert_eq!(
            first["api_token"]["dns_server_id"],
            second["api_token"]["dns_server_id"]
        );
        assert_eq!(app.store.count_dns_servers().await.unwrap(), 1);
        assert_eq!(app.store.count_api_tokens().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sync_without_syncable_scope_is_forbidden() {
        let app = TestApp::new();
        let token = app.mint("zone:list dns-request:create", "edge-01");

        let (status, body) = app.call(Method::POST, SYNC, Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "insufficient_scope");
        assert_eq!(app.store.count_dns_servers().await.unwrap(), 0);
        assert_eq!(app.store.count_api_tokens().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_without_server_name_is_rejected() {
        let app = TestApp::new();
        let claims = Claims {
            sub: "tester".into(),
            scopes: "api-token:syncable".into(),
            dns_server_name: None,
            exp: Utc::now().timestamp() + 600,
            iat: Utc::now().timestamp(),
            jti: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let (status, _) = app.call(Method::POST, SYNC, Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.store.count_dns_servers().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_requires_bearer_token() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::POST, SYNC, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
    }
}

mod concurrency_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_syncs_converge_on_one_row() {
        let app = TestApp::new();
        let token = app.mint("api-token:syncable", "edge-race");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let router = app.router.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                call(&router, Method::POST, SYNC, Some(&token), None).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let (status, body) = handle.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            ids.push(body["api_token"]["id"].as_i64().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(app.store.count_dns_servers().await.unwrap(), 1);
        assert_eq!(app.store.count_api_tokens().await.unwrap(), 1);
    }

    /// Hides the first lookup of each kind so the caller's insert collides
    /// with a row that already exists, as when losing a race.
    struct RacingStore {
        inner: MemoryStore,
        hide_server: AtomicBool,
        hide_token: AtomicBool,
    }

    #[async_trait]
    impl Store for RacingStore {
        async fn find_dns_server(&self, id: i64) -> StoreResult<Option<DnsServer>> {
            self.inner.find_dns_server(id).await
        }
        async fn find_dns_server_by_name(&self, name: &str) -> StoreResult<Option<DnsServer>> {
            if self.hide_server.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_dns_server_by_name(name).await
        }
        async fn find_dns_servers(&self, ids: &[i64]) -> StoreResult<Vec<DnsServer>> {
            self.inner.find_dns_servers(ids).await
        }
        async fn insert_dns_server(&self, name: &str) -> StoreResult<DnsServer> {
            self.inner.insert_dns_server(name).await
        }
        async fn count_dns_servers(&self) -> StoreResult<i64> {
            self.inner.count_dns_servers().await
        }
        async fn find_api_token(&self, id: i64) -> StoreResult<Option<ApiToken>> {
            self.inner.find_api_token(id).await
        }
        async fn find_api_token_by_value(&self, token: &str) -> StoreResult<Option<ApiToken>> {
            if self.hide_token.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_api_token_by_value(token).await
        }
        async fn insert_api_token(&self, token: &NewApiToken) -> StoreResult<ApiToken> {
            self.inner.insert_api_token(token).await
        }
        async fn list_api_tokens(&self, page: &PageRequest) -> StoreResult<(Vec<ApiToken>, i64)> {
            self.inner.list_api_tokens(page).await
        }
        async fn deactivate_api_token(&self, id: i64) -> StoreResult<bool> {
            self.inner.deactivate_api_token(id).await
        }
        async fn count_api_tokens(&self) -> StoreResult<i64> {
            self.inner.count_api_tokens().await
        }
        async fn insert_zone(&self, zone: &NewZone) -> StoreResult<Zone> {
            self.inner.insert_zone(zone).await
        }
        async fn list_zones_for_server(&self, dns_server_id: i64) -> StoreResult<Vec<Zone>> {
            self.inner.list_zones_for_server(dns_server_id).await
        }
        async fn list_dns_records(&self, zone_ids: &[i64]) -> StoreResult<Vec<DnsRecord>> {
            self.inner.list_dns_records(zone_ids).await
        }
        async fn find_zone_for_name(&self, name: &str) -> StoreResult<Option<Zone>> {
            self.inner.find_zone_for_name(name).await
        }
        async fn insert_dns_request(
            &self,
            request: &NewDnsRequest,
            zone_id: Option<i64>,
        ) -> StoreResult<DnsRequest> {
            self.inner.insert_dns_request(request, zone_id).await
        }
        async fn list_dns_requests(
            &self,
            page: &PageRequest,
        ) -> StoreResult<(Vec<DnsRequest>, i64)> {
            self.inner.list_dns_requests(page).await
        }
    }

    #[tokio::test]
    async fn test_lost_race_recovers_existing_rows() {
        let app = TestApp::new();
        let token = app.mint("api-token:syncable", "edge-01");
        let payload = app.state.tokens.decode(&token).unwrap();

        let store = RacingStore {
            inner: MemoryStore::new(),
            hide_server: AtomicBool::new(true),
            hide_token: AtomicBool::new(true),
        };
        let server = store.inner.insert_dns_server("edge-01").await.unwrap();
        let existing = store
            .inner
            .insert_api_token(&NewApiToken {
                token: token.clone(),
                scopes: payload.scopes.join(),
                dns_server_id: server.id,
                expires_at: payload.expires_at().unwrap(),
            })
            .await
            .unwrap();

        let synced = SyncCoordinator::new(&store, &app.state.tokens)
            .sync(&token, &payload)
            .await
            .unwrap();

        assert_eq!(synced.id, existing.id);
        assert_eq!(synced.dns_server.map(|s| s.id), Some(server.id));
        assert_eq!(store.count_dns_servers().await.unwrap(), 1);
        assert_eq!(store.count_api_tokens().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_via_coordinator_rejects_unscoped_token() {
        let app = TestApp::new();
        let token = app.mint("zone:list", "edge-01");
        let payload = app.state.tokens.decode(&token).unwrap();
        let store: Arc<dyn Store> = app.store.clone();

        let err = SyncCoordinator::new(store.as_ref(), &app.state.tokens)
            .sync(&token, &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, dnsbeacon::errors::AppError::Forbidden { .. }));
    }
}
