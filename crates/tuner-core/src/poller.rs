//! Periodic now-playing refresh for the active station.
//!
//! One poll task at a time.  Every `start`/`stop` moves the shared generation
//! forward; a cycle only reports if the generation it was started under is
//! still current, so a fetch that resolves after `stop()` is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use tuner_proto::protocol::StationId;

use crate::error::MetadataError;
use crate::metadata::MetadataFetcher;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

struct PollTask {
    station: StationId,
    handle: JoinHandle<()>,
}

pub struct MetadataPoller {
    fetcher: Arc<dyn MetadataFetcher>,
    period: Duration,
    fetch_timeout: Duration,
    generation: Arc<AtomicU64>,
    task: Option<PollTask>,
}

impl MetadataPoller {
    pub fn new(fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self::with_timing(fetcher, DEFAULT_POLL_INTERVAL, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timing(
        fetcher: Arc<dyn MetadataFetcher>,
        period: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            period,
            fetch_timeout,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Fetch now, then every `period`, reporting titles through `on_title`
    /// until `stop()`.  A running schedule is cancelled first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(&mut self, station: StationId, metadata_url: impl Into<String>, on_title: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        if let Some(task) = &self.task {
            warn!(
                "MetadataPoller: start for {} while polling {}, cancelling old schedule",
                station, task.station
            );
            self.stop();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle = PollCycle {
            fetcher: Arc::clone(&self.fetcher),
            station,
            url: metadata_url.into(),
            fetch_timeout: self.fetch_timeout,
            current: Arc::clone(&self.generation),
            generation,
        };

        debug!(
            "MetadataPoller: polling {} every {:?} from {} (gen={})",
            station, self.period, cycle.url, generation
        );

        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // first tick completes immediately
                ticker.tick().await;
                if !cycle.run(&on_title).await {
                    break;
                }
            }
        });

        self.task = Some(PollTask { station, handle });
    }

    /// Cancel the schedule.  No-op when idle.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            task.handle.abort();
            debug!("MetadataPoller: stopped polling {}", task.station);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Station currently being polled.
    pub fn station(&self) -> Option<StationId> {
        self.task.as_ref().map(|t| t.station)
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for MetadataPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollCycle {
    fetcher: Arc<dyn MetadataFetcher>,
    station: StationId,
    url: String,
    fetch_timeout: Duration,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl PollCycle {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// One fetch-and-report.  Returns false once the schedule is superseded.
    async fn run<F: Fn(String)>(&self, on_title: &F) -> bool {
        if !self.is_current() {
            return false;
        }

        let result = match tokio::time::timeout(
            self.fetch_timeout,
            self.fetcher.fetch_title(&self.url),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MetadataError::Timeout),
        };

        if !self.is_current() {
            debug!(
                "MetadataPoller: discarding result for {} from stale gen={}",
                self.station, self.generation
            );
            return false;
        }

        match result {
            Ok(title) => on_title(title),
            Err(e) => debug!("MetadataPoller: {} cycle skipped: {}", self.station, e),
        }
        true
    }
}
