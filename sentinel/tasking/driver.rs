use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;
use parking_lot::RwLock;
use sentinel_tracking::{snapshot, TrackStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_event_bus::topics;
use shared_logging::{LogLevel, Telemetry};
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle},
    time::{self, MissedTickBehavior},
};
use tracing::instrument;

use crate::{
    config::OptimizerConfig,
    error::TaskingError,
    model::TaskingSummary,
    policy::TaskingPolicyEngine,
    publisher::TaskingStore,
};

/// Why a tick published nothing. The next tick starts over from a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Reading tracks failed.
    SnapshotFailed(String),
    /// Reading tracks exceeded the call timeout.
    SnapshotTimedOut,
    /// The tasking store refused or could not be reached.
    PublishFailed(String),
    /// Publishing exceeded the call timeout.
    PublishTimedOut,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SnapshotFailed(detail) => write!(f, "snapshot failed: {detail}"),
            Self::SnapshotTimedOut => f.write_str("snapshot timed out"),
            Self::PublishFailed(detail) => write!(f, "publish failed: {detail}"),
            Self::PublishTimedOut => f.write_str("publish timed out"),
        }
    }
}

/// Result of one optimizer tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A plan was computed and published.
    Published(TaskingSummary),
    /// Nothing was published this tick.
    Skipped(SkipReason),
}

/// Running counters for the optimizer loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizerStats {
    /// Ticks executed.
    pub runs: u64,
    /// Ticks that published a plan.
    pub published: u64,
    /// Ticks that skipped.
    pub skipped: u64,
    /// Epoch seconds of the last tick.
    pub last_run_at: Option<i64>,
    /// Last skip, if the most recent tick skipped.
    pub last_skip: Option<SkipReason>,
}

/// Periodically snapshots tracks, computes a plan, and publishes it.
pub struct OptimizerDriver {
    tracks: Arc<dyn TrackStore>,
    store: Arc<dyn TaskingStore>,
    engine: TaskingPolicyEngine,
    interval: Duration,
    call_timeout: Duration,
    snapshot_limit: usize,
    stats: RwLock<OptimizerStats>,
    telemetry: Option<Telemetry>,
}

impl OptimizerDriver {
    /// Creates a driver using the cadence, limits, and roster of `config`.
    #[must_use]
    pub fn new(
        tracks: Arc<dyn TrackStore>,
        store: Arc<dyn TaskingStore>,
        config: &OptimizerConfig,
    ) -> Self {
        Self {
            tracks,
            store,
            engine: config.engine(),
            interval: config.interval(),
            call_timeout: config.call_timeout(),
            snapshot_limit: config.snapshot_limit,
            stats: RwLock::new(OptimizerStats::default()),
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> OptimizerStats {
        self.stats.read().clone()
    }

    /// Runs a single snapshot → compute → publish cycle.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickOutcome {
        let outcome = match self.compute_and_publish().await {
            Ok(summary) => TickOutcome::Published(summary),
            Err(reason) => TickOutcome::Skipped(reason),
        };
        self.record(&outcome).await;
        outcome
    }

    async fn compute_and_publish(&self) -> Result<TaskingSummary, SkipReason> {
        let tracks = time::timeout(
            self.call_timeout,
            snapshot(self.tracks.as_ref(), self.snapshot_limit),
        )
        .await
        .map_err(|_| SkipReason::SnapshotTimedOut)?
        .map_err(|err| SkipReason::SnapshotFailed(TaskingError::from(err).to_string()))?;

        let plan = self.engine.compute(&tracks, Utc::now().timestamp());
        time::timeout(self.call_timeout, self.store.publish(&plan))
            .await
            .map_err(|_| SkipReason::PublishTimedOut)?
            .map_err(|err| match err {
                TaskingError::Timeout { .. } => SkipReason::PublishTimedOut,
                other => SkipReason::PublishFailed(other.to_string()),
            })?;
        Ok(plan.summary)
    }

    async fn record(&self, outcome: &TickOutcome) {
        {
            let mut stats = self.stats.write();
            stats.runs += 1;
            stats.last_run_at = Some(Utc::now().timestamp());
            match outcome {
                TickOutcome::Published(_) => {
                    stats.published += 1;
                    stats.last_skip = None;
                }
                TickOutcome::Skipped(reason) => {
                    stats.skipped += 1;
                    stats.last_skip = Some(reason.clone());
                }
            }
        }
        match outcome {
            TickOutcome::Published(summary) => {
                if let Some(tel) = &self.telemetry {
                    let _ = tel.log(
                        LogLevel::Info,
                        "tasking.optimizer.published",
                        json!({
                            "tracks_total": summary.tracks_total,
                            "low_conf_tracks": summary.low_conf_tracks,
                            "pressure": summary.pressure,
                        }),
                    );
                    let _ = tel
                        .emit(
                            topics::TASKING_PUBLISHED,
                            json!({ "pressure": summary.pressure }),
                        )
                        .await;
                }
            }
            TickOutcome::Skipped(reason) => {
                tracing::warn!("optimizer tick skipped: {reason}");
                if let Some(tel) = &self.telemetry {
                    let _ = tel.log(
                        LogLevel::Warn,
                        "tasking.optimizer.tick_skipped",
                        json!({ "reason": reason.to_string() }),
                    );
                }
            }
        }
    }

    /// Ticks every interval until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first tick fires immediately. A stop request never interrupts a tick in flight.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> OptimizerHandle {
        let (stop, shutdown) = watch::channel(false);
        let driver = Arc::clone(&self);
        let task = tokio::spawn(async move { driver.run(shutdown).await });
        OptimizerHandle {
            driver: self,
            stop,
            task,
        }
    }
}

/// Handle to a spawned optimizer loop.
pub struct OptimizerHandle {
    driver: Arc<OptimizerDriver>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl OptimizerHandle {
    /// Requests a stop and waits for the loop to exit after any tick in flight.
    pub async fn stop(self) -> Result<OptimizerStats, JoinError> {
        let _ = self.stop.send(true);
        self.task.await?;
        Ok(self.driver.stats())
    }
}
