//! dnsbeacon control plane and agent client.
//!
//! The binary in `main.rs` wires these together; integration tests in
//! `tests/` drive the router directly against a [`store::memory::MemoryStore`].

use std::sync::Arc;

pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod registry;
pub mod store;
pub mod sync;
pub mod token;

/// Shared application state passed to handlers and extractors.
pub struct AppState {
    pub store: Arc<dyn store::Store>,
    pub tokens: token::TokenAuthority,
    pub config: config::Config,
}

impl AppState {
    pub fn new(store: Arc<dyn store::Store>, config: config::Config) -> Self {
        let tokens = token::TokenAuthority::new(config.jwt_secret.as_bytes(), config.token_ttl);
        Self {
            store,
            tokens,
            config,
        }
    }
}
