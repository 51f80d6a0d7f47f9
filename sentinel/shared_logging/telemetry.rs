use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};

use crate::{JsonLogger, LogLevel, LogRecord};

/// Builder configuring telemetry for one component.
pub struct TelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl TelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Sets the JSON log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below the given level.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Assigns the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<Telemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::with_min_level(path, self.min_level)?),
            None => None,
        };
        Ok(Telemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Cloneable telemetry handle: JSON log lines plus bus events.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("module", &self.inner.module)
            .field("logging", &self.inner.logger.is_some())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl Telemetry {
    /// Returns a builder for the given component name.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> TelemetryBuilder {
        TelemetryBuilder::new(module)
    }

    /// Component name attached to every record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs a structured record.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.module, level, message);
            if let Value::Object(fields) = metadata {
                record.metadata = fields;
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Publishes an event on the configured bus and waits for the publisher.
    ///
    /// Returns once the record is durable on the bus, so an event emitted just before
    /// the runtime shuts down is not lost.
    pub async fn emit(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        publisher
            .publish(EventRecord::new(&self.inner.module, event_type, payload))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::{read_event_log, FileEventPublisher, MemoryEventBus};
    use tempfile::tempdir;

    #[tokio::test]
    async fn telemetry_logs_and_emits() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("fusion.log");
        let bus = Arc::new(MemoryEventBus::new(8));
        let telemetry = Telemetry::builder("tracking")
            .log_path(&log_path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(
                LogLevel::Info,
                "tracking.fusion.updated",
                json!({ "object_id": "obj-007" }),
            )
            .unwrap();
        telemetry
            .emit("track.fused", json!({ "object_id": "obj-007" }))
            .await
            .unwrap();
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("tracking.fusion.updated"));
        let events = bus.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "tracking");
    }

    #[tokio::test]
    async fn silent_telemetry_is_a_no_op() {
        let telemetry = Telemetry::builder("planning").build().unwrap();
        telemetry
            .log(LogLevel::Error, "planning.plan.failed", json!({}))
            .unwrap();
        telemetry
            .emit("planning.plan.failed", json!({}))
            .await
            .unwrap();
        assert_eq!(telemetry.module(), "planning");
    }

    #[test]
    fn events_survive_runtime_shutdown() {
        let dir = tempdir().unwrap();
        let event_log = dir.path().join("events.jsonl");
        let publisher = Arc::new(FileEventPublisher::new(&event_log).unwrap());
        let telemetry = Telemetry::builder("tasking")
            .event_publisher(publisher)
            .build()
            .unwrap();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            for seq in 0..50 {
                telemetry
                    .emit("tasking.published", json!({ "seq": seq }))
                    .await
                    .unwrap();
            }
        });
        drop(runtime);

        let events = read_event_log(&event_log, Some("tasking.published")).unwrap();
        assert_eq!(events.len(), 50);
        let order: Vec<i64> = events
            .iter()
            .map(|event| event.payload["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }
}
