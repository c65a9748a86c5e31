use std::time::Duration;

use crate::middleware::scope::ScopeMatch;

const PLACEHOLDER_SECRET: &str = "CHANGE_ME_JWT_SIGNING_SECRET";

/// Which `Store` implementation the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub store: StoreBackend,
    /// HS256 key used to sign and verify bearer tokens.
    pub jwt_secret: String,
    /// Lifetime of tokens minted without an explicit expiry.
    pub token_ttl: Duration,
    pub scope_match: ScopeMatch,
    /// Allowed CORS origin for the web UI.
    pub dashboard_origin: String,
    /// Emit logs as JSON lines. Set via DNSBEACON_LOG_FORMAT=json.
    pub json_logs: bool,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let jwt_secret =
        std::env::var("DNSBEACON_JWT_SECRET").unwrap_or_else(|_| PLACEHOLDER_SECRET.into());

    if jwt_secret == PLACEHOLDER_SECRET {
        let env_mode = std::env::var("DNSBEACON_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "DNSBEACON_JWT_SECRET is still the insecure placeholder. \
                 Set a proper signing secret before running in production."
            );
        }
        eprintln!("⚠️  DNSBEACON_JWT_SECRET is not set, using insecure placeholder.");
    }

    let store = match std::env::var("DNSBEACON_STORE").as_deref() {
        Ok("memory") => StoreBackend::Memory,
        Ok("postgres") | Err(_) => StoreBackend::Postgres,
        Ok(other) => anyhow::bail!("unknown DNSBEACON_STORE '{}'", other),
    };

    let scope_match = match std::env::var("DNSBEACON_SCOPE_MATCH") {
        Ok(v) => ScopeMatch::parse(&v)
            .ok_or_else(|| anyhow::anyhow!("unknown DNSBEACON_SCOPE_MATCH '{}'", v))?,
        Err(_) => ScopeMatch::default(),
    };

    Ok(Config {
        port: std::env::var("DNSBEACON_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/dnsbeacon".into()),
        store,
        jwt_secret,
        token_ttl: Duration::from_secs(
            std::env::var("DNSBEACON_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30 * 24 * 3600),
        ),
        scope_match,
        dashboard_origin: std::env::var("DASHBOARD_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        json_logs: json_logs_from_env(),
    })
}

/// `DNSBEACON_LOG_FORMAT=json`. Read on its own so logging can start before
/// (or without) the server config.
pub fn json_logs_from_env() -> bool {
    std::env::var("DNSBEACON_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
