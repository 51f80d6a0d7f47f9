use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::{error::TrackingError, model::Track};

/// Keyed persistence of the latest track per object plus the object index.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Latest track for `object_id`, if any.
    async fn get(&self, object_id: &str) -> Result<Option<Track>, TrackingError>;
    /// Stores `track` under its object id and adds the id to the index.
    async fn put(&self, track: Track) -> Result<(), TrackingError>;
    /// Up to `limit` known object ids.
    async fn list_ids(&self, limit: usize) -> Result<Vec<String>, TrackingError>;
}

/// Reads up to `limit` tracks from the index. Ids whose record vanished are skipped.
pub async fn snapshot(store: &dyn TrackStore, limit: usize) -> Result<Vec<Track>, TrackingError> {
    let ids = store.list_ids(limit).await?;
    let mut tracks = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(track) = store.get(&id).await? {
            tracks.push(track);
        }
    }
    Ok(tracks)
}

/// Track listing with a minimum-confidence filter, scanning at most `limit.max(1)` ids.
pub async fn query_tracks(
    store: &dyn TrackStore,
    min_confidence: f64,
    limit: usize,
) -> Result<Vec<Track>, TrackingError> {
    let tracks = snapshot(store, limit.max(1)).await?;
    Ok(tracks
        .into_iter()
        .filter(|track| track.confidence >= min_confidence)
        .collect())
}

/// In-memory store keeping insertion order of object ids.
#[derive(Debug, Default)]
pub struct MemoryTrackStore {
    tracks: RwLock<IndexMap<String, Track>>,
}

impl MemoryTrackStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    /// Whether no object has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }
}

#[async_trait]
impl TrackStore for MemoryTrackStore {
    async fn get(&self, object_id: &str) -> Result<Option<Track>, TrackingError> {
        Ok(self.tracks.read().get(object_id).cloned())
    }

    async fn put(&self, track: Track) -> Result<(), TrackingError> {
        self.tracks.write().insert(track.object_id.clone(), track);
        Ok(())
    }

    async fn list_ids(&self, limit: usize) -> Result<Vec<String>, TrackingError> {
        Ok(self.tracks.read().keys().take(limit).cloned().collect())
    }
}

/// Store backed by an append-only JSON-lines journal; replayed on open, last record wins.
#[derive(Debug)]
pub struct FileTrackStore {
    path: PathBuf,
    tracks: RwLock<IndexMap<String, Track>>,
    journal: Mutex<File>,
}

impl FileTrackStore {
    /// Opens (or creates) the journal at `path` and replays it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TrackingError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tracks = IndexMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let track: Track = serde_json::from_str(&line)?;
                tracks.insert(track.object_id.clone(), track);
            }
        }
        let journal = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            tracks: RwLock::new(tracks),
            journal: Mutex::new(journal),
        })
    }

    /// Rewrites the journal so it holds exactly one record per object.
    pub fn compact(&self) -> Result<(), TrackingError> {
        let tracks = self.tracks.read();
        let mut journal = self.journal.lock();
        let staging = self.path.with_extension("compact");
        {
            let mut out = File::create(&staging)?;
            for track in tracks.values() {
                serde_json::to_writer(&mut out, track)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        fs::rename(&staging, &self.path)?;
        *journal = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }

    /// Journal location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TrackStore for FileTrackStore {
    async fn get(&self, object_id: &str) -> Result<Option<Track>, TrackingError> {
        Ok(self.tracks.read().get(object_id).cloned())
    }

    async fn put(&self, track: Track) -> Result<(), TrackingError> {
        {
            let mut journal = self.journal.lock();
            serde_json::to_writer(&mut *journal, &track)?;
            journal.write_all(b"\n")?;
            journal.flush()?;
        }
        self.tracks.write().insert(track.object_id.clone(), track);
        Ok(())
    }

    async fn list_ids(&self, limit: usize) -> Result<Vec<String>, TrackingError> {
        Ok(self.tracks.read().keys().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackState;
    use indexmap::IndexSet;
    use tempfile::tempdir;

    fn track(object_id: &str, confidence: f64) -> Track {
        Track {
            track_id: Track::id_for(object_id),
            object_id: object_id.into(),
            last_update: "2025-03-01T12:00:00Z".into(),
            state: TrackState::default(),
            confidence,
            sources: Vec::new(),
            flags: IndexSet::from(["OK".to_string()]),
        }
    }

    #[tokio::test]
    async fn memory_store_keeps_latest_and_order() {
        let store = MemoryTrackStore::new();
        store.put(track("obj-b", 0.6)).await.unwrap();
        store.put(track("obj-a", 0.6)).await.unwrap();
        store.put(track("obj-b", 0.8)).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.list_ids(10).await.unwrap(), vec!["obj-b", "obj-a"]);
        let latest = store.get("obj-b").await.unwrap().unwrap();
        assert!((latest.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(store.list_ids(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_filters_by_confidence() {
        let store = MemoryTrackStore::new();
        store.put(track("obj-1", 0.6)).await.unwrap();
        store.put(track("obj-2", 0.9)).await.unwrap();
        let confident = query_tracks(&store, 0.75, 50).await.unwrap();
        assert_eq!(confident.len(), 1);
        assert_eq!(confident[0].object_id, "obj-2");
        assert_eq!(query_tracks(&store, 0.0, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_replays_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracks.jsonl");
        {
            let store = FileTrackStore::open(&path).unwrap();
            store.put(track("obj-1", 0.6)).await.unwrap();
            store.put(track("obj-1", 0.62)).await.unwrap();
            store.put(track("obj-2", 0.6)).await.unwrap();
        }
        let reopened = FileTrackStore::open(&path).unwrap();
        let tracks = snapshot(&reopened, 200).await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert!((tracks[0].confidence - 0.62).abs() < f64::EPSILON);

        reopened.compact().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        reopened.put(track("obj-3", 0.6)).await.unwrap();
        assert_eq!(FileTrackStore::open(&path).unwrap().list_ids(10).await.unwrap().len(), 3);
    }
}
