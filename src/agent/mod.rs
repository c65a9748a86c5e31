//! Agent side of the protocol: bootstrap against the control plane, then keep
//! the local zone table fresh for the DNS engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::RwLock;

use crate::models::zone::ZoneData;

pub mod client;

pub use client::{ApiClient, ClientError, WaitPolicy};

/// Shared, cheaply-cloneable view of the zones this agent serves.
/// The DNS engine reads it; the refresh loop replaces it wholesale.
#[derive(Clone, Default)]
pub struct ZoneTable(Arc<RwLock<Vec<ZoneData>>>);

impl ZoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reload(&self, zones: Vec<ZoneData>) {
        *self.0.write().await = zones;
    }

    /// Snapshot of the current table in load order.
    pub async fn all(&self) -> Vec<ZoneData> {
        self.0.read().await.clone()
    }

    /// First zone whose domain is contained in `name`, in load order.
    pub async fn lookup(&self, name: &str) -> Option<ZoneData> {
        let zones = self.0.read().await;
        zones
            .iter()
            .find(|z| crate::models::zone::zone_covers(&z.domain, name))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.0.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.read().await.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub wait: WaitPolicy,
    pub refresh_interval: Duration,
}

/// Wait for the API, sync, load zones. Fails if any step fails; an agent
/// that cannot sync must not start serving.
pub async fn bootstrap(
    client: &ApiClient,
    wait: &WaitPolicy,
    zones: &ZoneTable,
) -> anyhow::Result<()> {
    if !client.wait_for_up(wait).await {
        anyhow::bail!("control plane at {} never came up", client.url(""));
    }

    let token = client.sync().await.context("api token sync failed")?;
    tracing::info!(
        api_token_id = token.id,
        dns_server = %client.dns_server_name(),
        "api token synced"
    );

    let loaded = client.get_zones().await.context("initial zone load failed")?;
    tracing::info!(zones = loaded.len(), "zones loaded");
    zones.reload(loaded).await;
    Ok(())
}

/// Bootstrap, then refresh zones on an interval until ctrl-c.
/// A failed refresh keeps the last good table.
pub async fn run(client: Arc<ApiClient>, opts: AgentOptions, zones: ZoneTable) -> anyhow::Result<()> {
    bootstrap(&client, &opts.wait, &zones).await?;

    let mut ticker = tokio::time::interval(opts.refresh_interval);
    // first tick completes immediately
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.get_zones().await {
                    Ok(fresh) => {
                        tracing::debug!(zones = fresh.len(), "zones refreshed");
                        zones.reload(fresh).await;
                    }
                    Err(e) => {
                        tracing::warn!(class = e.class(), "zone refresh failed, keeping previous zones: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutting down agent");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: i64, domain: &str) -> ZoneData {
        ZoneData {
            id,
            domain: domain.into(),
            ip: "127.0.0.1".into(),
            dns_server_id: None,
            dns_records: None,
        }
    }

    #[tokio::test]
    async fn test_zone_table_lookup_first_match() {
        let table = ZoneTable::new();
        assert!(table.is_empty().await);
        table
            .reload(vec![zone(1, "example.com"), zone(2, "admin.example.com")])
            .await;
        assert_eq!(table.len().await, 2);
        assert_eq!(table.lookup("admin.example.com").await.map(|z| z.id), Some(1));
        assert!(table.lookup("example.org").await.is_none());
    }

    #[tokio::test]
    async fn test_zone_table_reload_replaces_wholesale() {
        let table = ZoneTable::new();
        table.reload(vec![zone(1, "example.com"), zone(2, "example.net")]).await;
        let snapshot = table.all().await;

        table.reload(vec![zone(3, "example.org")]).await;

        let ids: Vec<i64> = table.all().await.iter().map(|z| z.id).collect();
        assert_eq!(ids, vec![3]);
        // earlier snapshots are unaffected
        assert_eq!(snapshot.iter().map(|z| z.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(table.lookup("www.example.com").await.is_none());
    }
}
