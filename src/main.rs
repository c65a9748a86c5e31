use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dnsbeacon::agent::{self, AgentOptions, ApiClient, WaitPolicy, ZoneTable};
use dnsbeacon::cli::{self, Commands, TokenCommands, ZoneCommands};
use dnsbeacon::config::{self, Config, StoreBackend};
use dnsbeacon::middleware::scope::ScopeSet;
use dnsbeacon::models::zone::NewZone;
use dnsbeacon::registry::AgentRegistry;
use dnsbeacon::store::memory::MemoryStore;
use dnsbeacon::store::postgres::PgStore;
use dnsbeacon::store::Store;
use dnsbeacon::token::TokenAuthority;
use dnsbeacon::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(config::json_logs_from_env());

    let args = cli::Cli::parse();
    let cfg = server_config(&args.command)?;

    let result = match (args.command, cfg) {
        (
            Some(Commands::Agent {
                api_url,
                api_token,
                refresh_secs,
            }),
            _,
        ) => run_agent(&api_url, &api_token, refresh_secs).await,
        (Some(Commands::Serve { port }), Some(cfg)) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        (Some(Commands::Token { command }), Some(cfg)) => handle_token_command(command, &cfg),
        (Some(Commands::Zone { command }), Some(cfg)) => {
            let store = open_store(&cfg).await?;
            handle_zone_command(command, store.as_ref()).await
        }
        (None, Some(cfg)) => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
        (_, None) => Err(anyhow::anyhow!("server configuration was not loaded")),
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dnsbeacon=debug,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Server settings (signing key, store, scope policy) are only loaded for
/// subcommands that sign, verify or persist. The agent never holds the key.
fn server_config(command: &Option<Commands>) -> anyhow::Result<Option<Config>> {
    match command {
        Some(Commands::Agent { .. }) => Ok(None),
        _ => config::load().map(Some),
    }
}

async fn open_store(cfg: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match cfg.store {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let db = PgStore::connect(&cfg.database_url).await?;

            tracing::info!("Running migrations...");
            db.migrate().await?;
            Ok(Arc::new(db))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; nothing will persist across restarts");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let store = open_store(&cfg).await?;
    let dashboard_origin = cfg.dashboard_origin.clone();
    tracing::info!(scope_match = ?cfg.scope_match, "scope matching policy");

    let state = Arc::new(AppState::new(store, cfg));

    let app = api::app(state)
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true),
        )
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("dnsbeacon control plane listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: security headers on every response. Token bodies must never
/// be cached.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.remove(header::SERVER);

    resp
}

fn handle_token_command(cmd: TokenCommands, cfg: &Config) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Mint {
            subject,
            scopes,
            dns_server,
            ttl_secs,
        } => {
            let scopes = ScopeSet::parse(&scopes.replace(',', " "));
            if scopes.is_empty() {
                anyhow::bail!("at least one scope is required");
            }
            let authority = TokenAuthority::new(cfg.jwt_secret.as_bytes(), cfg.token_ttl);
            let ttl = ttl_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| authority.default_ttl());
            let token = authority
                .issue(&subject, &scopes, &dns_server, ttl)
                .context("failed to mint token")?;

            eprintln!(
                "Token minted:\n  Subject:    {}\n  Scopes:     {}\n  DNS server: {}\n  TTL:        {}s",
                subject,
                scopes,
                dns_server,
                ttl.as_secs()
            );
            println!("{}", token);
        }
    }
    Ok(())
}

async fn handle_zone_command(cmd: ZoneCommands, store: &dyn Store) -> anyhow::Result<()> {
    match cmd {
        ZoneCommands::Add {
            domain,
            ip,
            dns_server,
            records,
        } => {
            let dns_server_id = match dns_server {
                Some(name) => Some(AgentRegistry::new(store).resolve_or_create(&name).await?.id),
                None => None,
            };
            let zone = store
                .insert_zone(&NewZone {
                    domain: domain.trim().to_lowercase(),
                    ip,
                    dns_server_id,
                    records,
                })
                .await?;
            println!(
                "Zone created:\n  ID:     {}\n  Domain: {}\n  IP:     {}",
                zone.id, zone.domain, zone.ip
            );
        }
    }
    Ok(())
}

async fn run_agent(api_url: &str, api_token: &str, refresh_secs: u64) -> anyhow::Result<()> {
    let client = Arc::new(ApiClient::new(api_url, api_token)?);
    tracing::info!(dns_server = %client.dns_server_name(), api_url = %api_url, "starting agent");

    let opts = AgentOptions {
        wait: WaitPolicy::default(),
        refresh_interval: Duration::from_secs(refresh_secs.max(1)),
    };
    agent::run(client, opts, ZoneTable::new()).await
}
