mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedme_core::{
    AppConfig, Article, CacheCoordinator, CacheError, CacheStore, FeedFetcher, Ingestor,
    MemoryCache, ARTICLES_KEY,
};
use reqwest::Client;
use wiremock::MockServer;

use common::{mount_feed, rss_feed, source, temp_store, write_catalog};

/// Records every write so tests can tell how often a key was populated.
#[derive(Default)]
struct CountingCache {
    inner: MemoryCache,
    sets: Mutex<HashMap<String, usize>>,
}

impl CountingCache {
    fn sets(&self, key: &str) -> usize {
        self.sets.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), CacheError> {
        *self.sets.lock().unwrap().entry(key.to_owned()).or_default() += 1;
        self.inner.set(key, payload, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }
}

fn articles_in(payload: &str) -> Vec<Article> {
    serde_json::from_str(payload).unwrap()
}

#[tokio::test]
async fn cold_start_imports_and_populates_once() {
    let server = MockServer::start().await;
    mount_feed(&server, "/a", rss_feed("a", 2)).await;
    mount_feed(&server, "/b", rss_feed("b", 3)).await;

    let (dir, store) = temp_store().await;
    let catalog = write_catalog(
        dir.path(),
        &[format!("{}/a", server.uri()), format!("{}/b", server.uri())],
    );
    let cache = Arc::new(CountingCache::default());
    let coordinator = CacheCoordinator::new(store.clone(), cache.clone(), &AppConfig::default());
    let ingestor = Ingestor::new(store.clone(), FeedFetcher::new(Client::new()), 1);

    let outcome = coordinator.startup(&ingestor, &catalog).await.unwrap();

    assert!(outcome.cold_start);
    assert!(outcome.populated);
    assert_eq!(outcome.imported.map(|r| r.inserted), Some(5));
    assert_eq!(store.list_sources().await.unwrap().len(), 2);
    assert_eq!(store.count_articles().await.unwrap(), 5);
    assert_eq!(cache.sets(ARTICLES_KEY), 1);

    let payload = cache.get(ARTICLES_KEY).await.unwrap().unwrap();
    assert_eq!(articles_in(&payload).len(), 5);
}

#[tokio::test]
async fn cold_start_with_broken_catalog_aborts() {
    let (dir, store) = temp_store().await;
    let catalog = dir.path().join("source.csv");
    std::fs::write(&catalog, "only,three,columns\n").unwrap();

    let cache = Arc::new(MemoryCache::new());
    let coordinator = CacheCoordinator::new(store.clone(), cache.clone(), &AppConfig::default());
    let ingestor = Ingestor::new(store.clone(), FeedFetcher::new(Client::new()), 1);

    let err = coordinator.startup(&ingestor, &catalog).await.unwrap_err();
    assert!(matches!(err, feedme_core::Error::Catalog(_)));
    assert!(store.list_sources().await.unwrap().is_empty());
    assert_eq!(cache.get(ARTICLES_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn warm_start_replaces_stale_cache_without_ingesting() {
    let (dir, store) = temp_store().await;
    store.insert_source(&source("http://a.example/rss")).await.unwrap();
    let source_id = store.list_sources().await.unwrap()[0].id;
    store
        .insert_article(
            source_id,
            &feedme_core::ArticleDraft {
                title: "Stored".into(),
                url: "http://a.example/1".into(),
                published_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

    let cache = Arc::new(CountingCache::default());
    for key in [ARTICLES_KEY, "today", "month"] {
        cache
            .inner
            .set(key, "stale", Duration::from_secs(600))
            .await
            .unwrap();
    }
    let mut config = AppConfig::default();
    config.schedule.populate_periods = false;
    let coordinator = CacheCoordinator::new(store.clone(), cache.clone(), &config);
    let ingestor = Ingestor::new(store.clone(), FeedFetcher::new(Client::new()), 1);

    // A catalog that does not exist proves no first import is attempted.
    let outcome = coordinator
        .startup(&ingestor, &dir.path().join("absent.csv"))
        .await
        .unwrap();

    assert!(!outcome.cold_start);
    assert!(outcome.imported.is_none());
    assert!(outcome.populated);
    assert_eq!(cache.sets(ARTICLES_KEY), 1);

    let payload = cache.get(ARTICLES_KEY).await.unwrap().unwrap();
    let articles = articles_in(&payload);
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Stored");
    assert_eq!(articles[0].source.url, "http://a.example/rss");

    // Period keys are not repopulated here, so startup must have removed them.
    assert_eq!(cache.get("today").await.unwrap(), None);
    assert_eq!(cache.get("month").await.unwrap(), None);
}

#[tokio::test]
async fn refresh_is_bounded_by_sample_limit() {
    let (_dir, store) = temp_store().await;
    store.insert_source(&source("http://a.example/rss")).await.unwrap();
    let source_id = store.list_sources().await.unwrap()[0].id;
    for n in 0..9 {
        store
            .insert_article(
                source_id,
                &feedme_core::ArticleDraft {
                    title: format!("t{n}"),
                    url: format!("http://a.example/{n}"),
                    published_at: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();
    }

    let mut config = AppConfig::default();
    config.schedule.sample_limit = 4;
    let cache = Arc::new(MemoryCache::new());
    let coordinator = CacheCoordinator::new(store, cache.clone(), &config);

    assert_eq!(coordinator.refresh().await.unwrap(), 4);
    let payload = cache.get(ARTICLES_KEY).await.unwrap().unwrap();
    assert_eq!(articles_in(&payload).len(), 4);
    for key in ["today", "month"] {
        let scoped = cache.get(key).await.unwrap().unwrap();
        assert!(articles_in(&scoped).len() <= 4);
    }
}

#[tokio::test]
async fn period_keys_stay_absent_when_disabled() {
    let (_dir, store) = temp_store().await;
    let mut config = AppConfig::default();
    config.schedule.populate_periods = false;
    let cache = Arc::new(MemoryCache::new());
    let coordinator = CacheCoordinator::new(store, cache.clone(), &config);

    coordinator.refresh().await.unwrap();
    assert_eq!(cache.get(ARTICLES_KEY).await.unwrap().as_deref(), Some("[]"));
    assert_eq!(cache.get("today").await.unwrap(), None);
    assert_eq!(cache.get("month").await.unwrap(), None);
}

#[tokio::test]
async fn refreshed_key_outlives_the_refresh_interval() {
    let (_dir, store) = temp_store().await;
    let config = AppConfig::default();
    let cache = Arc::new(MemoryCache::new());
    let coordinator = CacheCoordinator::new(store, cache.clone(), &config);

    coordinator.refresh().await.unwrap();
    let remaining = cache.time_to_live(ARTICLES_KEY).await.unwrap();
    assert!(remaining > config.schedule.refresh_interval());
    assert!(remaining <= config.cache.ttl());

    // Store work is done; drive the clock by hand from here on.
    tokio::time::pause();
    tokio::time::advance(config.schedule.refresh_interval()).await;
    assert!(cache.get(ARTICLES_KEY).await.unwrap().is_some());

    // A stalled refresh cycle lets the entry lapse at the TTL.
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(cache.get(ARTICLES_KEY).await.unwrap(), None);
}
