//! subsync-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config and
//! secrets, builds the shared state, wires middleware, and starts the HTTP
//! server.  All route handlers live in `routes.rs`; all shared state types
//! live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use subsync_billing_http::HttpBillingClient;
use subsync_config::{load_layered_yaml, load_layered_yaml_from_strings, resolve_secrets, LoadedConfig};
use subsync_daemon::{routes, state};
use subsync_db::PgRecordStore;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

/// Comma-separated list of YAML layers, lowest precedence first.
const ENV_CONFIG_PATHS: &str = "SUBSYNC_CONFIG";
const ENV_DAEMON_ADDR: &str = "SUBSYNC_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let cfg = loaded.engine()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let secrets = resolve_secrets(&cfg, |name| std::env::var(name).ok());
    let base_url = cfg
        .billing_base_url
        .clone()
        .context("config key /billing/base_url is required")?;
    let billing = HttpBillingClient::new(base_url, secrets.require_billing_api_key(&cfg)?);

    let pool = subsync_db::connect(&cfg.database_url_env).await?;
    let store = PgRecordStore::new(pool);

    if secrets.webhook_secret.is_none() {
        info!("no webhook secret configured; /v1/webhooks/billing disabled");
    }

    let shared = Arc::new(state::AppState::new(
        Arc::new(billing),
        Arc::new(store),
        &cfg,
        secrets.webhook_secret.clone(),
    ));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("subsync-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    shared.coordinator.shutdown();
    info!("subsync-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config() -> anyhow::Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(list) => {
            let paths: Vec<&str> = list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            load_layered_yaml(&paths)
        }
        Err(_) => {
            info!("{ENV_CONFIG_PATHS} unset; using built-in defaults");
            load_layered_yaml_from_strings(&[])
        }
    }
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
