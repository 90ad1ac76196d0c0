//! rbx-daemon entry point.
//!
//! Loads configuration, connects to Postgres, builds the shared state, wires
//! middleware and starts the HTTP server. Route handlers live in `routes.rs`;
//! shared state and background loops live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use rbx_daemon::{routes, state};
use rbx_config::{Settings, UnusedKeyPolicy};
use rbx_runtime::{BatchDriver, BatchOptions, PgGuestStore, SystemClock};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

/// Comma-separated YAML paths, merged in order.
const ENV_CONFIG: &str = "RBX_CONFIG";
const ENV_ADDR: &str = "RBX_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let (settings, config_hash, unused) = load_settings()?;
    init_tracing(&settings.logging.filter);
    for p in unused {
        warn!(pointer = %p, "unused config key");
    }

    let pool = rbx_db::connect_from_env_var(
        &settings.database.url_env,
        settings.database.max_connections,
    )
    .await?;

    let mut store = PgGuestStore::new(pool);
    if let Some(h) = config_hash {
        store = store.with_config_hash(h);
    }
    let driver = BatchDriver::new(Arc::new(store), Arc::new(SystemClock));
    let options = BatchOptions::from_settings(&settings.reconcile);
    let schedule = settings.daemon.schedule_secs.map(Duration::from_secs);

    let shared = Arc::new(state::AppState::new(driver, options).with_schedule(schedule));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    if let Some(every) = schedule {
        info!(every_secs = every.as_secs(), "scheduled reconciliation enabled");
        state::spawn_scheduler(Arc::clone(&shared), every);
    }

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&settings)?;
    info!("rbx-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn load_settings() -> anyhow::Result<(Settings, Option<String>, Vec<String>)> {
    let paths: Vec<String> = std::env::var(ENV_CONFIG)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if paths.is_empty() {
        return Ok((Settings::default(), None, Vec::new()));
    }

    let loaded = rbx_config::load_layered_yaml(&paths)?;
    let report = rbx_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    let settings = loaded.settings()?;
    Ok((settings, Some(loaded.config_hash), report.unused_leaf_pointers))
}

fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `RBX_DAEMON_ADDR` wins over `daemon.addr`.
fn bind_addr(settings: &Settings) -> anyhow::Result<SocketAddr> {
    let raw = std::env::var(ENV_ADDR).unwrap_or_else(|_| settings.daemon.addr.clone());
    raw.parse()
        .with_context(|| format!("invalid bind address: {raw}"))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
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
