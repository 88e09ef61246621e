use std::sync::Arc;

use feedme_core::scheduler::{self, Schedule};
use feedme_core::{
    build_http_client, AppConfig, CacheBackend, CacheCoordinator, FeedFetcher, Ingestor,
    MemoryCache, RedisCache, SharedCache, StartupOutcome, Store,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{self, ApiState};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] feedme_core::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Process-scoped components, created once and shared by the startup
/// sequence, the scheduler and the HTTP handlers.
pub struct App {
    config: AppConfig,
    store: Store,
    cache: SharedCache,
    ingestor: Ingestor,
    coordinator: CacheCoordinator,
}

impl App {
    pub async fn build(config: AppConfig) -> Result<Self, ServerError> {
        let store = Store::open(&config.store.database_path, config.store.max_connections)
            .await
            .map_err(feedme_core::Error::from)?;
        info!(path = %config.store.database_path.display(), "store opened");

        let cache: SharedCache = match config.cache.backend {
            CacheBackend::Redis => Arc::new(
                RedisCache::connect(&config.cache.redis_url)
                    .await
                    .map_err(feedme_core::Error::from)?,
            ),
            CacheBackend::Memory => {
                warn!("using in-process cache; entries are lost on restart");
                Arc::new(MemoryCache::new())
            }
        };

        let client = build_http_client(&config.ingest)?;
        let ingestor = Ingestor::new(
            store.clone(),
            FeedFetcher::new(client),
            config.ingest.fetch_concurrency,
        );
        let coordinator = CacheCoordinator::new(store.clone(), cache.clone(), &config);

        Ok(Self {
            config,
            store,
            cache,
            ingestor,
            coordinator,
        })
    }

    /// Cache invalidation and cold/warm start detection. Must complete
    /// before [`App::serve`] starts the cycles.
    pub async fn startup(&self) -> Result<StartupOutcome, ServerError> {
        let outcome = self
            .coordinator
            .startup(&self.ingestor, &self.config.store.catalog_path)
            .await?;
        info!(
            cold_start = outcome.cold_start,
            populated = outcome.populated,
            "startup sequence finished"
        );
        Ok(outcome)
    }

    /// Starts both cycles and serves HTTP on `listener` until `shutdown` is
    /// cancelled, then drains requests, stops the cycles and closes the store.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), ServerError> {
        let schedule = Schedule {
            crawl_interval: self.config.schedule.crawl_interval(),
            refresh_interval: self.config.schedule.refresh_interval(),
            catalog_path: self.config.store.catalog_path.clone(),
        };
        let cycles = scheduler::start(self.ingestor, self.coordinator, schedule, &shutdown);

        let router = api::router(
            ApiState::new(self.cache),
            &self.config.server.views_dir,
            &self.config.server.assets_dir,
        );
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
            .map_err(ServerError::Serve);

        // Stop the cycles even when the server failed on its own.
        shutdown.cancel();
        cycles.shutdown().await?;
        self.store.close().await;
        info!("shutdown complete");
        served
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.server.listen_addr.clone();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }
}
