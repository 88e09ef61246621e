use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::coordinator::CacheCoordinator;
use crate::error::Error;
use crate::ingest::Ingestor;

/// A periodic background task that can be stopped.
pub struct CycleHandle {
    name: &'static str,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl CycleHandle {
    /// Requests the cycle to stop and waits for it. A tick already running
    /// is allowed to finish first.
    pub async fn stop(self) -> Result<(), Error> {
        debug!(cycle = self.name, "stopping cycle");
        self.cancel.cancel();
        self.join.await.map_err(Error::from)
    }
}

/// Spawns `task` every `period`, first one full period after the call.
/// Ticks missed while a run was still in progress are skipped.
pub fn spawn_cycle<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut task: F,
) -> CycleHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let token = cancel.clone();
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(cycle = name, "cycle shutdown requested");
                    break;
                }
                _ = ticker.tick() => task().await,
            }
        }
    });

    CycleHandle { name, cancel, join }
}

/// The two independent background cycles of the service.
pub struct SchedulerHandle {
    ingestion: CycleHandle,
    refresh: CycleHandle,
}

impl SchedulerHandle {
    /// Stops both cycles, letting in-flight runs complete.
    pub async fn shutdown(self) -> Result<(), Error> {
        let (ingestion, refresh) = tokio::join!(self.ingestion.stop(), self.refresh.stop());
        ingestion?;
        refresh?;
        info!("scheduler stopped");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub crawl_interval: Duration,
    pub refresh_interval: Duration,
    pub catalog_path: PathBuf,
}

/// Starts the ingestion cycle (catalog reload + crawl) and the cache refresh
/// cycle. They are not synchronized with each other: a refresh may sample a
/// store that a crawl is still appending to.
pub fn start(
    ingestor: Ingestor,
    coordinator: CacheCoordinator,
    schedule: Schedule,
    shutdown: &CancellationToken,
) -> SchedulerHandle {
    let catalog = schedule.catalog_path;
    let ingestion = spawn_cycle(
        "ingestion",
        schedule.crawl_interval,
        shutdown.child_token(),
        move || {
            let ingestor = ingestor.clone();
            let catalog = catalog.clone();
            async move {
                info!("scheduled import started");
                if let Err(err) = ingestor.reload_and_run(&catalog).await {
                    error!(error = %err, "scheduled import failed");
                }
            }
        },
    );

    let refresh = spawn_cycle(
        "refresh",
        schedule.refresh_interval,
        shutdown.child_token(),
        move || {
            let coordinator = coordinator.clone();
            async move {
                if let Err(err) = coordinator.refresh().await {
                    error!(error = %err, "scheduled cache refresh failed");
                }
            }
        },
    );

    info!(
        crawl_secs = schedule.crawl_interval.as_secs(),
        refresh_secs = schedule.refresh_interval.as_secs(),
        "scheduler started"
    );
    SchedulerHandle { ingestion, refresh }
}
