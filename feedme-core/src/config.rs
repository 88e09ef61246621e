use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "FEEDME_CONFIG";
/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "feedme.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub catalog_path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub ttl_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub views_dir: PathBuf,
    pub assets_dir: PathBuf,
}

/// How the cached article sample is drawn from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// Uniform random subset of the whole article set.
    Random,
    /// Newest articles first, by publication date.
    Recent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub crawl_interval_minutes: u64,
    pub refresh_interval_minutes: u64,
    pub sample_limit: u32,
    pub sampling: Sampling,
    pub populate_periods: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub request_timeout_seconds: u64,
    pub fetch_concurrency: usize,
    pub user_agent: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("feedme.db"),
            catalog_path: PathBuf::from("source.csv"),
            max_connections: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            ttl_minutes: 11,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            views_dir: PathBuf::from("views"),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            crawl_interval_minutes: 60,
            refresh_interval_minutes: 10,
            sample_limit: 500,
            sampling: Sampling::Random,
            populate_periods: true,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            fetch_concurrency: 1,
            user_agent: concat!("feedme/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Largest minute count accepted for a TTL or an interval: one year.
const MAX_MINUTES: u64 = 366 * 24 * 60;

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        minutes(self.ttl_minutes)
    }
}

impl ScheduleConfig {
    pub fn crawl_interval(&self) -> Duration {
        minutes(self.crawl_interval_minutes)
    }

    pub fn refresh_interval(&self) -> Duration {
        minutes(self.refresh_interval_minutes)
    }
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl AppConfig {
    /// Loads the configuration from `$FEEDME_CONFIG`, then `./feedme.json`,
    /// falling back to defaults when neither is present.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                info!("no config file found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.schedule;
        if schedule.crawl_interval_minutes == 0 || schedule.refresh_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "schedule intervals must be at least one minute".into(),
            ));
        }
        for (field, value) in [
            ("cache.ttl_minutes", self.cache.ttl_minutes),
            ("schedule.crawl_interval_minutes", schedule.crawl_interval_minutes),
            ("schedule.refresh_interval_minutes", schedule.refresh_interval_minutes),
        ] {
            if value > MAX_MINUTES {
                return Err(ConfigError::Invalid(format!(
                    "{field} ({value}) exceeds {MAX_MINUTES} minutes"
                )));
            }
        }
        // The TTL is only a safety net for a stalled refresh cycle.
        if self.cache.ttl() <= schedule.refresh_interval() {
            return Err(ConfigError::Invalid(format!(
                "cache ttl ({} min) must be longer than the refresh interval ({} min)",
                self.cache.ttl_minutes, schedule.refresh_interval_minutes
            )));
        }
        if schedule.sample_limit == 0 {
            return Err(ConfigError::Invalid("sample_limit must be positive".into()));
        }
        if self.ingest.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetch_concurrency must be positive".into(),
            ));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be positive".into()));
        }
        Ok(())
    }
}
