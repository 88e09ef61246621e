pub mod cache;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod models;
pub mod scheduler;
pub mod storage;

pub use cache::{CacheStore, MemoryCache, RedisCache, SharedCache, ARTICLES_KEY};
pub use catalog::{load_catalog, parse_catalog, CatalogReport};
pub use config::{AppConfig, CacheBackend, Sampling};
pub use coordinator::{CacheCoordinator, StartupOutcome};
pub use error::{CacheError, CatalogError, ConfigError, Error, FetchError, StoreError};
pub use feed::{build_http_client, parse_feed, FeedFetcher};
pub use ingest::{IngestReport, Ingestor};
pub use models::{Article, ArticleDraft, NewSource, Period, Source};
pub use scheduler::{spawn_cycle, CycleHandle, Schedule, SchedulerHandle};
pub use storage::Store;
