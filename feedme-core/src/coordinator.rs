//! Cache-aside coordination between the article store and the cache.
//!
//! The coordinator writes the cache at three moments:
//!
//! 1. Startup: the article keys are deleted unconditionally, then an empty
//!    store triggers a first import followed by a population, and a cache
//!    still empty after that is populated from the store as it stands.
//! 2. Every refresh tick: the keys are recomputed and overwritten whether or
//!    not the previous value has expired.
//! 3. Never on read: the query API does not fall back to the store.
//!
//! Every write carries the configured TTL from the moment of writing. The
//! refresh interval is shorter than the TTL, so the key only expires when the
//! refresh cycle has stalled.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::{SharedCache, ARTICLES_KEY};
use crate::config::{AppConfig, Sampling};
use crate::error::{CacheError, Result};
use crate::ingest::{IngestReport, Ingestor};
use crate::models::Period;
use crate::storage::Store;

/// What the startup sequence did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupOutcome {
    pub cold_start: bool,
    pub imported: Option<IngestReport>,
    pub populated: bool,
}

#[derive(Clone)]
pub struct CacheCoordinator {
    store: Store,
    cache: SharedCache,
    ttl: Duration,
    sampling: Sampling,
    sample_limit: u32,
    populate_periods: bool,
}

impl CacheCoordinator {
    pub fn new(store: Store, cache: SharedCache, config: &AppConfig) -> Self {
        Self {
            store,
            cache,
            ttl: config.cache.ttl(),
            sampling: config.schedule.sampling,
            sample_limit: config.schedule.sample_limit,
            populate_periods: config.schedule.populate_periods,
        }
    }

    /// Deletes every key this coordinator owns.
    pub async fn invalidate(&self) -> Result<(), CacheError> {
        self.cache.delete(ARTICLES_KEY).await?;
        for period in Period::ALL {
            self.cache.delete(period.cache_key()).await?;
        }
        debug!("article cache keys invalidated");
        Ok(())
    }

    /// Recomputes and overwrites the article payloads. Returns the number of
    /// records written under the `articles` key.
    pub async fn refresh(&self) -> Result<usize> {
        let articles = self
            .store
            .sample_articles(self.sampling, self.sample_limit, None)
            .await?;
        let payload = serde_json::to_string(&articles).map_err(CacheError::from)?;
        self.cache.set(ARTICLES_KEY, &payload, self.ttl).await?;

        if self.populate_periods {
            let now = Utc::now();
            for period in Period::ALL {
                let scoped = self
                    .store
                    .sample_articles(self.sampling, self.sample_limit, Some(period.window_start(now)))
                    .await?;
                let payload = serde_json::to_string(&scoped).map_err(CacheError::from)?;
                self.cache.set(period.cache_key(), &payload, self.ttl).await?;
                debug!(key = period.cache_key(), records = scoped.len(), "period cache written");
            }
        }

        info!(records = articles.len(), ttl_secs = self.ttl.as_secs(), "article cache refreshed");
        Ok(articles.len())
    }

    /// Runs once per process, before any cycle is scheduled.
    pub async fn startup(&self, ingestor: &Ingestor, catalog: &Path) -> Result<StartupOutcome> {
        self.invalidate().await?;

        let mut outcome = StartupOutcome {
            cold_start: false,
            imported: None,
            populated: false,
        };

        if self.store.count_articles().await? == 0 {
            outcome.cold_start = true;
            outcome.imported = Some(ingestor.first_import(catalog).await?);
            self.refresh().await?;
            outcome.populated = true;
        }

        let current = self.cache.get(ARTICLES_KEY).await?;
        if current.map_or(true, |payload| payload.is_empty()) {
            info!("article cache empty after invalidation, populating from store");
            self.refresh().await?;
            outcome.populated = true;
        }

        Ok(outcome)
    }
}
