//! Telemetry store gateway: a single-document REST store for solar sensor
//! readings.
//! - Exposes POST /data (replace-or-create) and GET /data (latest reading).
//! - Serves an inline dashboard page at /dashboard.
//! - Mirrors the document to Postgres if a database URL is configured;
//!   otherwise runs in-memory only.

mod http;
mod store;
mod ui;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::store::ReadingStore;

#[derive(Clone)]
pub struct AppState {
    pub store: ReadingStore,
}

#[derive(Deserialize, Clone)]
struct GatewayConfig {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default)]
    database_url: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:62889".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_url: None,
        }
    }
}

impl GatewayConfig {
    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("read gateway config")?;
        let cfg: GatewayConfig =
            serde_yaml::from_str(&content).context("parse gateway config yaml")?;
        Ok(cfg)
    }
}

fn load_config() -> GatewayConfig {
    GatewayConfig::load_from_file("gateway.yaml").unwrap_or_else(|err| {
        tracing::warn!(?err, "failed to load gateway.yaml, falling back to defaults");
        GatewayConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = load_config();
    let store = match init_db(&cfg).await? {
        Some(pool) => {
            let store = ReadingStore::with_db(pool);
            store
                .restore_from_db()
                .await
                .context("restore reading from database")?;
            store
        }
        None => ReadingStore::in_memory(),
    };

    let app = http::router(AppState { store });

    let addr: SocketAddr = cfg.bind.parse().context("parse bind address")?;
    tracing::info!("sensor data gateway listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

async fn init_db(cfg: &GatewayConfig) -> Result<Option<sqlx::PgPool>> {
    // DATABASE_URL wins over the config file.
    let url = match std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| cfg.database_url.clone())
    {
        Some(url) => url,
        None => {
            tracing::warn!("no database url configured; running without Postgres persistence");
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("connect postgres")?;

    store::init_schema(&pool)
        .await
        .context("create sensor_reading table")?;

    Ok(Some(pool))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
