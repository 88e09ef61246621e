use std::path::Path;
use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{load_catalog, CatalogReport};
use crate::error::{CatalogError, StoreError};
use crate::feed::FeedFetcher;
use crate::storage::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub sources: usize,
    pub failed: usize,
    pub fetched: usize,
    pub inserted: usize,
}

/// Crawls every known source and appends new articles to the store.
///
/// All store writers go through `write_lock`, so a scheduled crawl, a
/// catalog reload and the first import never overlap on the SQLite file.
/// Feeds may be fetched concurrently (`concurrency > 1`) but their items are
/// always written one at a time.
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: Store,
    fetcher: FeedFetcher,
    concurrency: usize,
    write_lock: Arc<Mutex<()>>,
}

impl Ingestor {
    pub fn new(store: Store, fetcher: FeedFetcher, concurrency: usize) -> Self {
        Self {
            store,
            fetcher,
            concurrency: concurrency.max(1),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one full crawl. A source whose feed cannot be fetched or parsed
    /// is logged and skipped; only store failures abort the run.
    pub async fn run(&self) -> Result<IngestReport, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.crawl().await
    }

    /// Loads the catalog, then crawls. Any catalog error is returned before
    /// a single source is stored.
    pub async fn first_import(&self, catalog: &Path) -> Result<IngestReport, CatalogError> {
        let _guard = self.write_lock.lock().await;
        info!("no articles stored, starting first import");
        load_catalog(&self.store, catalog).await?;
        let report = self.crawl().await?;
        info!(inserted = report.inserted, "first import done");
        Ok(report)
    }

    /// Additive catalog reload followed by a crawl. A broken catalog is
    /// logged and the crawl still runs over the sources already stored.
    pub async fn reload_and_run(&self, catalog: &Path) -> Result<IngestReport, StoreError> {
        let _guard = self.write_lock.lock().await;
        match load_catalog(&self.store, catalog).await {
            Ok(CatalogReport { added, .. }) if added > 0 => info!(added, "new sources from catalog"),
            Ok(_) => {}
            Err(CatalogError::Store(err)) => return Err(err),
            Err(err) => warn!(error = %err, path = %catalog.display(), "catalog reload failed"),
        }
        self.crawl().await
    }

    async fn crawl(&self) -> Result<IngestReport, StoreError> {
        let sources = self.store.list_sources().await?;
        let mut report = IngestReport {
            sources: sources.len(),
            ..IngestReport::default()
        };

        let fetcher = &self.fetcher;
        let mut results = stream::iter(sources)
            .map(|source| async move {
                let result = fetcher.fetch(&source).await;
                (source, result)
            })
            .buffer_unordered(self.concurrency);

        while let Some((source, result)) = results.next().await {
            let drafts = match result {
                Ok(drafts) => drafts,
                Err(err) => {
                    warn!(source = %source.url, error = %err, "failed to fetch feed");
                    report.failed += 1;
                    continue;
                }
            };
            debug!(source = %source.url, items = drafts.len(), "parsed feed");
            report.fetched += drafts.len();
            for draft in &drafts {
                if self.store.insert_article(source.id, draft).await? {
                    report.inserted += 1;
                }
            }
        }

        info!(
            sources = report.sources,
            failed = report.failed,
            fetched = report.fetched,
            inserted = report.inserted,
            "crawl finished"
        );
        Ok(report)
    }
}
