#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Event bus abstractions carrying track, tasking, and planning events between components.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// Event types emitted by the Sentinel components.
pub mod topics {
    /// A track was created or updated by fusion.
    pub const TRACK_FUSED: &str = "track.fused";
    /// The optimizer published a new tasking plan.
    pub const TASKING_PUBLISHED: &str = "tasking.published";
    /// A mission planning request completed.
    pub const PLAN_COMPLETED: &str = "planning.plan.completed";
}

/// Generic event record encoded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier (`evt-<uuid>`).
    pub id: String,
    /// Component producing the event.
    pub source: String,
    /// Event type (e.g., `track.fused`).
    pub event_type: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Creates a record stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: format!("evt-{}", Uuid::new_v4()),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now().to_rfc3339(),
            payload,
        }
    }
}

/// Event publisher interface.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event to the bus.
    async fn publish(&self, event: EventRecord) -> Result<()>;
}

/// Event subscriber interface.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns a receiver that yields every event published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>>;
}

/// In-memory broadcast bus with a bounded backlog of recent events.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<EventRecord>,
    capacity: usize,
    backlog: Arc<Mutex<VecDeque<EventRecord>>>,
}

impl MemoryEventBus {
    /// Creates a new bus retaining at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Snapshot of recent events retained in memory, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Retained events of a single type, oldest first.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventRecord> {
        self.backlog
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }
}

/// File-backed publisher appending JSON lines.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads back an event log written by [`FileEventPublisher`], optionally keeping one type.
///
/// A missing file is an empty log. Blank lines are skipped; a malformed line is an error.
pub fn read_event_log(path: impl AsRef<Path>, event_type: Option<&str>) -> Result<Vec<EventRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: EventRecord = serde_json::from_str(&line)?;
        if event_type.map_or(true, |wanted| event.event_type == wanted) {
            events.push(event);
        }
    }
    Ok(events)
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(event.clone());
            while backlog.len() > self.capacity {
                backlog.pop_front();
            }
        }
        // No subscribers is fine; the backlog still records the event.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>> {
        Ok(self.sender.subscribe())
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut data = serde_json::to_vec(&event)?;
        data.push(b'\n');
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tasking_event() -> EventRecord {
        EventRecord::new(
            "tasking",
            topics::TASKING_PUBLISHED,
            serde_json::json!({ "pressure": 0.5 }),
        )
    }

    #[tokio::test]
    async fn publishes_and_receives() {
        let bus = MemoryEventBus::new(16);
        let mut rx = bus.subscribe().await.unwrap();
        bus.publish(tasking_event()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "tasking.published");
        assert!(event.id.starts_with("evt-"));
    }

    #[tokio::test]
    async fn backlog_is_bounded() {
        let bus = MemoryEventBus::new(2);
        for idx in 0..3 {
            let event = EventRecord::new("tracking", topics::TRACK_FUSED, serde_json::json!(idx));
            bus.publish(event).await.unwrap();
        }
        let backlog = bus.snapshot();
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog[0].payload, serde_json::json!(1));
        assert_eq!(bus.events_of_type("track.fused").len(), 2);
        assert!(bus.events_of_type("tasking.published").is_empty());
    }

    #[tokio::test]
    async fn file_log_replays_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/events.jsonl");
        let publisher = FileEventPublisher::new(&path).unwrap();
        publisher.publish(tasking_event()).await.unwrap();
        let fused = EventRecord::new("tracking", topics::TRACK_FUSED, serde_json::json!({}));
        publisher.publish(fused).await.unwrap();
        publisher.publish(tasking_event()).await.unwrap();

        let all = read_event_log(publisher.path(), None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].event_type, topics::TRACK_FUSED);
        let tasking = read_event_log(&path, Some(topics::TASKING_PUBLISHED)).unwrap();
        assert_eq!(tasking.len(), 2);
        assert!(read_event_log(dir.path().join("absent.jsonl"), None)
            .unwrap()
            .is_empty());
    }
}
