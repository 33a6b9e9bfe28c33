//! libris-enrich library interface
//!
//! Book-metadata enrichment and orchestration service: tiered caching
//! in front of external providers, canonical normalization, batch jobs
//! with streamed progress, and per-caller admission control.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod normalize;
pub mod orchestrate;
pub mod providers;
pub mod ratelimit;
pub mod service;

pub use crate::error::{ApiError, ApiResult};

use crate::cache::{EdgeCache, KvCache, UnifiedCache};
use crate::config::Settings;
use crate::jobs::JobRegistry;
use crate::metrics::MetricsSink;
use crate::orchestrate::Orchestrator;
use crate::providers::{GoogleBooksClient, IsbndbClient, OpenLibraryClient, VisionClient};
use crate::ratelimit::RateLimiter;
use crate::service::BookService;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub books: Arc<BookService>,
    pub jobs: Arc<JobRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: MetricsSink,
    pub startup_time: DateTime<Utc>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every component from settings and a database pool.
    pub fn initialize(
        settings: Settings,
        db: SqlitePool,
        metrics: MetricsSink,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let open_library = Arc::new(
            OpenLibraryClient::new(&settings.providers)
                .map_err(|e| anyhow::anyhow!("open library client: {e}"))?,
        );
        let google_books = Arc::new(
            GoogleBooksClient::new(&settings.providers)
                .map_err(|e| anyhow::anyhow!("google books client: {e}"))?,
        );
        let isbndb = IsbndbClient::new(&settings.providers)
            .map_err(|e| anyhow::anyhow!("isbndb client: {e}"))?
            .map(Arc::new);
        let vision = VisionClient::new(&settings.providers)
            .map_err(|e| anyhow::anyhow!("vision client: {e}"))?
            .map(Arc::new);

        let orchestrator = Arc::new(Orchestrator::new(
            open_library,
            google_books,
            isbndb,
            metrics.clone(),
            settings.providers.timeout,
        ));

        let cache = Arc::new(UnifiedCache::new(
            EdgeCache::new(settings.cache.edge_ttl),
            KvCache::new(db.clone()),
            settings.cache.clone(),
            metrics.clone(),
        ));

        let books = Arc::new(BookService::new(cache, orchestrator, vision));

        let jobs = JobRegistry::new(
            db.clone(),
            settings.batch.clone(),
            metrics.clone(),
            books.clone(),
            shutdown.clone(),
        );

        let rate_limiter = Arc::new(RateLimiter::new(
            settings.rate_limit.requests_per_window,
            settings.rate_limit.window,
            metrics.clone(),
        ));

        Ok(Self {
            db,
            settings: Arc::new(settings),
            books,
            jobs,
            rate_limiter,
            metrics,
            startup_time: Utc::now(),
            shutdown,
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::search_routes())
        .merge(api::batch_routes())
        .merge(api::import_routes())
        .merge(api::progress_routes())
        .merge(api::health_routes())
        .layer(axum::middleware::from_fn(api::request_context))
        .with_state(state)
}
