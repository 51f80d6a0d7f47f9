use std::{collections::HashMap, sync::Arc, time::Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_event_bus::topics;
use shared_logging::{LogLevel, Telemetry};
use tracing::instrument;

use crate::{
    error::TrackingError,
    fusion::fuse,
    model::{Observation, Track},
    store::TrackStore,
    validation::ObservationValidator,
};

type KeyLock = Arc<tokio::sync::Mutex<()>>;
type LockTable = Mutex<HashMap<String, KeySlot>>;

struct KeySlot {
    lock: KeyLock,
    holders: usize,
}

/// Claim on one object's lock slot; the slot is reclaimed when the last claim drops,
/// including when an ingestion is cancelled mid-flight.
struct LockLease<'a> {
    table: &'a LockTable,
    object_id: String,
    lock: KeyLock,
}

impl<'a> LockLease<'a> {
    fn acquire(table: &'a LockTable, object_id: &str) -> Self {
        let mut slots = table.lock();
        let slot = slots.entry(object_id.to_string()).or_insert_with(|| KeySlot {
            lock: Arc::default(),
            holders: 0,
        });
        slot.holders += 1;
        Self {
            table,
            object_id: object_id.to_string(),
            lock: Arc::clone(&slot.lock),
        }
    }
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        let mut slots = self.table.lock();
        if let Some(slot) = slots.get_mut(&self.object_id) {
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders == 0 {
                slots.remove(&self.object_id);
            }
        }
    }
}

/// Running counters for the ingestion pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionStats {
    /// Observations fused and stored.
    pub fused: u64,
    /// Observations refused by validation.
    pub rejected: u64,
    /// Ingestions that failed in the store.
    pub failed: u64,
    /// Latency of the most recent successful ingestion.
    pub last_latency_ms: Option<f64>,
    /// Sum of successful ingestion latencies.
    pub total_latency_ms: f64,
}

impl FusionStats {
    /// Mean latency over successful ingestions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_latency_ms(&self) -> Option<f64> {
        (self.fused > 0).then(|| self.total_latency_ms / self.fused as f64)
    }
}

/// Validates, fuses, and persists observations.
///
/// The get → fuse → put cycle for one object runs under that object's lock, so two
/// concurrent observations of the same object never read the same prior state.
/// Different objects never contend.
pub struct FusionService {
    store: Arc<dyn TrackStore>,
    validator: Option<ObservationValidator>,
    locks: LockTable,
    stats: RwLock<FusionStats>,
    telemetry: Option<Telemetry>,
}

impl FusionService {
    /// Creates a service over `store` with the default validator.
    #[must_use]
    pub fn new(store: Arc<dyn TrackStore>) -> Self {
        Self {
            store,
            validator: Some(ObservationValidator::default()),
            locks: Mutex::new(HashMap::new()),
            stats: RwLock::new(FusionStats::default()),
            telemetry: None,
        }
    }

    /// Replaces the validator; `None` fuses every observation as-is.
    #[must_use]
    pub fn with_validator(mut self, validator: Option<ObservationValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> FusionStats {
        self.stats.read().clone()
    }

    /// Fuses one observation and returns the stored track.
    #[instrument(skip(self, observation), fields(object_id = %observation.object_id))]
    pub async fn ingest(&self, observation: &Observation) -> Result<Track, TrackingError> {
        let started = Instant::now();
        if let Some(validator) = &self.validator {
            let flags = validator.validate(observation);
            if !flags.is_empty() {
                self.stats.write().rejected += 1;
                self.log(
                    LogLevel::Warn,
                    "tracking.validation.rejected",
                    json!({
                        "event_id": observation.event_id,
                        "object_id": observation.object_id,
                        "flags": flags,
                    }),
                );
                return Err(TrackingError::Rejected {
                    object_id: observation.object_id.clone(),
                    flags,
                });
            }
        }

        let outcome = {
            let lease = LockLease::acquire(&self.locks, &observation.object_id);
            let _guard = lease.lock.lock().await;
            self.fuse_and_store(observation).await
        };
        let track = match outcome {
            Ok(track) => track,
            Err(err) => {
                self.stats.write().failed += 1;
                return Err(err);
            }
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        {
            let mut stats = self.stats.write();
            stats.fused += 1;
            stats.last_latency_ms = Some(latency_ms);
            stats.total_latency_ms += latency_ms;
        }

        self.log(
            LogLevel::Debug,
            "tracking.fusion.updated",
            json!({
                "object_id": track.object_id,
                "sensor_id": observation.sensor_id,
                "confidence": track.confidence,
                "sources": track.sources.len(),
                "latency_ms": latency_ms,
            }),
        );
        if let Some(tel) = &self.telemetry {
            let _ = tel
                .emit(
                    topics::TRACK_FUSED,
                    json!({ "track_id": track.track_id, "confidence": track.confidence }),
                )
                .await;
        }
        Ok(track)
    }

    /// Objects with an ingestion currently holding or awaiting their lock.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.locks.lock().len()
    }

    async fn fuse_and_store(&self, observation: &Observation) -> Result<Track, TrackingError> {
        let previous = self.store.get(&observation.object_id).await?;
        let track = fuse(previous.as_ref(), observation);
        self.store.put(track.clone()).await?;
        Ok(track)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTrackStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use shared_event_bus::MemoryEventBus;

    fn observation(object_id: &str, sensor_id: &str, ts: &str) -> Observation {
        let measurement = json!({
            "x_km": 7000.0, "y_km": 10.0, "z_km": 420.0,
            "vx_kms": 1.0, "vy_kms": 7.4, "vz_kms": 0.0
        });
        Observation {
            event_id: format!("evt-{sensor_id}-{ts}"),
            sensor_id: sensor_id.into(),
            sensor_type: "radar".into(),
            timestamp: ts.into(),
            object_id: object_id.into(),
            measurement: measurement.as_object().cloned().unwrap(),
            quality: serde_json::Map::new(),
            integrity: None,
        }
    }

    /// Yields between read and write to widen the lost-update window.
    struct YieldingStore(MemoryTrackStore);

    #[async_trait]
    impl TrackStore for YieldingStore {
        async fn get(&self, object_id: &str) -> Result<Option<Track>, TrackingError> {
            let track = self.0.get(object_id).await?;
            tokio::task::yield_now().await;
            Ok(track)
        }

        async fn put(&self, track: Track) -> Result<(), TrackingError> {
            tokio::task::yield_now().await;
            self.0.put(track).await
        }

        async fn list_ids(&self, limit: usize) -> Result<Vec<String>, TrackingError> {
            self.0.list_ids(limit).await
        }
    }

    /// Never answers a read, leaving the ingestion parked under the object's lock.
    struct StalledStore;

    #[async_trait]
    impl TrackStore for StalledStore {
        async fn get(&self, _object_id: &str) -> Result<Option<Track>, TrackingError> {
            std::future::pending::<()>().await;
            Ok(None)
        }

        async fn put(&self, _track: Track) -> Result<(), TrackingError> {
            Ok(())
        }

        async fn list_ids(&self, _limit: usize) -> Result<Vec<String>, TrackingError> {
            Ok(Vec::new())
        }
    }

    struct OfflineStore;

    #[async_trait]
    impl TrackStore for OfflineStore {
        async fn get(&self, _object_id: &str) -> Result<Option<Track>, TrackingError> {
            Err(TrackingError::Storage("offline".into()))
        }

        async fn put(&self, _track: Track) -> Result<(), TrackingError> {
            Ok(())
        }

        async fn list_ids(&self, _limit: usize) -> Result<Vec<String>, TrackingError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn ingest_creates_then_updates() {
        let store: Arc<dyn TrackStore> = Arc::new(MemoryTrackStore::new());
        let service = FusionService::new(Arc::clone(&store));
        let first = service
            .ingest(&observation("obj-001", "radar-1", "2025-03-01T12:00:00Z"))
            .await
            .unwrap();
        assert!((first.confidence - 0.6).abs() < 1e-9);
        let second = service
            .ingest(&observation("obj-001", "optical-1", "2025-03-01T12:00:05Z"))
            .await
            .unwrap();
        assert!((second.confidence - 0.62).abs() < 1e-9);
        assert_eq!(store.get("obj-001").await.unwrap().unwrap(), second);
        assert_eq!(service.in_flight(), 0);

        let stats = service.stats();
        assert_eq!((stats.fused, stats.rejected, stats.failed), (2, 0, 0));
        assert!(stats.last_latency_ms.is_some());
        assert!(stats.mean_latency_ms().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn rejects_flagged_observation_without_touching_store() {
        let store: Arc<dyn TrackStore> = Arc::new(MemoryTrackStore::new());
        let service = FusionService::new(Arc::clone(&store));
        let mut obs = observation("obj-002", "radar-1", "t0");
        obs.measurement.insert("z_km".into(), Value::from(90_000.0));
        let err = service.ingest(&obs).await.unwrap_err();
        assert!(matches!(err, TrackingError::Rejected { .. }));
        assert!(store.list_ids(10).await.unwrap().is_empty());
        assert_eq!(service.stats().rejected, 1);
        assert_eq!(service.stats().mean_latency_ms(), None);

        let lenient = FusionService::new(Arc::clone(&store)).with_validator(None);
        assert!(lenient.ingest(&obs).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_to_one_object_are_serialized() {
        let store: Arc<dyn TrackStore> = Arc::new(YieldingStore(MemoryTrackStore::new()));
        let service = Arc::new(FusionService::new(Arc::clone(&store)));
        let mut handles = Vec::new();
        for idx in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .ingest(&observation("obj-003", "radar-1", &format!("t{idx}")))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let track = store.get("obj-003").await.unwrap().unwrap();
        assert_eq!(track.sources.len(), 8);
        assert!((track.confidence - (0.6 + 7.0 * 0.02)).abs() < 1e-9);
        assert_eq!(service.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_ingestions_release_their_lock_slot() {
        let service = Arc::new(FusionService::new(Arc::new(StalledStore)));
        let mut handles = Vec::new();
        for idx in 0..2 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .ingest(&observation("obj-004", "radar-1", &format!("t{idx}")))
                    .await
            }));
        }
        while service.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(service.in_flight(), 1);

        for handle in handles {
            handle.abort();
            assert!(handle.await.unwrap_err().is_cancelled());
        }
        assert_eq!(service.in_flight(), 0);
    }

    #[tokio::test]
    async fn store_failures_are_counted() {
        let service = FusionService::new(Arc::new(OfflineStore));
        let err = service
            .ingest(&observation("obj-005", "radar-1", "2025-03-01T12:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Storage(_)));
        let stats = service.stats();
        assert_eq!((stats.fused, stats.failed), (0, 1));
        assert_eq!(service.in_flight(), 0);
    }

    #[tokio::test]
    async fn fused_event_is_published_before_ingest_returns() {
        let bus = Arc::new(MemoryEventBus::new(8));
        let telemetry = Telemetry::builder("tracking")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let service =
            FusionService::new(Arc::new(MemoryTrackStore::new())).with_telemetry(telemetry);
        service
            .ingest(&observation("obj-006", "radar-1", "2025-03-01T12:00:00Z"))
            .await
            .unwrap();
        let events = bus.events_of_type(topics::TRACK_FUSED);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["track_id"], json!(Track::id_for("obj-006")));
    }
}
