//! libris-enrich - Book Metadata Enrichment Service
//!
//! Serves canonical book records assembled from external metadata
//! providers behind a tiered cache, and runs batch enrichment jobs with
//! streamed progress.

use anyhow::Result;
use libris_common::config::TomlConfig;
use libris_enrich::config::Settings;
use libris_enrich::metrics::MetricsSink;
use libris_enrich::{build_router, db, AppState};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Interval between expired-entry sweeps of the KV cache
const KV_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting libris-enrich (Book Metadata Enrichment)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Optional config path as the first argument
    let config_arg: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    let toml_config = TomlConfig::load(config_arg.as_deref())?;
    let settings = Settings::from_toml(&toml_config)?;

    info!("Database: {}", settings.database_path);
    let pool = db::init_database_pool(Path::new(&settings.database_path)).await?;

    // Jobs from a previous run can never complete; fail them now
    db::jobs::recover_stale_jobs(&pool).await?;

    let metrics = MetricsSink::spawn();
    let shutdown = CancellationToken::new();

    let state = AppState::initialize(settings.clone(), pool.clone(), metrics, shutdown.clone())?;

    // Periodic KV cache sweep, off the request path
    {
        let kv = libris_enrich::cache::KvCache::new(pool.clone());
        let sweep_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(KV_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => kv.sweep().await,
                    _ = sweep_shutdown.cancelled() => break,
                }
            }
        });
    }

    let app = build_router(state);
    let bind_addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{bind_addr}");
    info!("Health check: http://{bind_addr}/health");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cancelling in-flight jobs");
            server_shutdown.cancel();
        })
        .await?;

    Ok(())
}
