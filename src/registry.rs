//! DNS server identities, resolved or created by name.

use crate::errors::AppError;
use crate::models::dns_server::{normalize_name, DnsServer};
use crate::store::{Store, StoreError};

pub struct AgentRegistry<'a> {
    store: &'a dyn Store,
}

impl<'a> AgentRegistry<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Return the server named `name` (case-insensitive), creating it if absent.
    ///
    /// Concurrent first callers race on the unique name; the loser sees
    /// `Duplicate` and re-reads the winner's row.
    pub async fn resolve_or_create(&self, name: &str) -> Result<DnsServer, AppError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(AppError::BadRequest("dns server name is empty".into()));
        }

        if let Some(server) = self.store.find_dns_server_by_name(&name).await? {
            return Ok(server);
        }

        tracing::info!(dns_server = %name, "saving dns server from api token");
        match self.store.insert_dns_server(&name).await {
            Ok(server) => Ok(server),
            Err(StoreError::Duplicate { .. }) => {
                tracing::debug!(dns_server = %name, "dns server created concurrently, re-reading");
                self.store
                    .find_dns_server_by_name(&name)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "dns server '{}' vanished after duplicate insert",
                            name
                        ))
                    })
            }
            Err(e) => Err(e.into()),
        }
    }
}
