use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use sentinel_tracking::{snapshot, Track, TrackStore};
use serde_json::Value;

use crate::error::PlanningError;

/// Number of tracks a planning cycle reads.
pub const PLANNING_TRACK_LIMIT: usize = 150;

/// Supplies the track snapshot a planning cycle works from.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Returns up to `limit` tracks.
    async fn fetch(&self, limit: usize) -> Result<Vec<Track>, PlanningError>;
}

/// Reads tracks straight from an in-process store.
#[derive(Clone)]
pub struct StoreTrackSource {
    store: Arc<dyn TrackStore>,
}

impl StoreTrackSource {
    /// Wraps `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TrackStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TrackSource for StoreTrackSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<Track>, PlanningError> {
        let tracks = snapshot(self.store.as_ref(), limit).await?;
        Ok(tracks.into_iter().filter(has_valid_confidence).collect())
    }
}

/// Fetches tracks from a remote track API (`GET {base}/tracks?limit=N`).
#[derive(Debug, Clone)]
pub struct HttpTrackSource {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpTrackSource {
    /// Creates a source rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PlanningError> {
        let client = Client::builder()
            .user_agent("sentinel-mission-planning/0.1")
            .build()
            .map_err(|err| PlanningError::Tracks(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            timeout,
        })
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Listing endpoint for `limit` tracks.
    #[must_use]
    pub fn tracks_url(&self, limit: usize) -> String {
        format!("{}/tracks?limit={limit}", self.base_url)
    }
}

#[async_trait]
impl TrackSource for HttpTrackSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<Track>, PlanningError> {
        let mut request = self.client.get(self.tracks_url(limit)).timeout(self.timeout);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let body: Value = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| PlanningError::Tracks(err.to_string()))?
            .json()
            .await
            .map_err(|err| PlanningError::Tracks(err.to_string()))?;
        Ok(parse_track_listing(body))
    }
}

/// Decodes a track listing, either `{"tracks": [...]}` or a bare array.
///
/// Items that do not decode, or whose confidence lies outside [0, 1], are dropped.
#[must_use]
pub fn parse_track_listing(body: Value) -> Vec<Track> {
    let items = match body {
        Value::Object(mut envelope) => match envelope.remove("tracks") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Track>(item).ok())
        .filter(has_valid_confidence)
        .collect()
}

fn has_valid_confidence(track: &Track) -> bool {
    (0.0..=1.0).contains(&track.confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;
    use sentinel_tracking::{MemoryTrackStore, TrackState};
    use serde_json::json;

    fn item(object_id: &str, confidence: f64) -> Value {
        json!({
            "track_id": format!("trk-{object_id}"),
            "object_id": object_id,
            "updated_at": "2025-03-01T12:00:00Z",
            "state": {"x_km": 1.0, "y_km": 2.0, "z_km": 300.0, "vx_kms": 0.0, "vy_kms": 0.0, "vz_kms": 0.0},
            "confidence": confidence,
        })
    }

    #[test]
    fn accepts_envelope_or_bare_array() {
        let wrapped = parse_track_listing(json!({"tracks": [item("obj-001", 0.8)], "count": 1}));
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].last_update, "2025-03-01T12:00:00Z");
        let bare = parse_track_listing(json!([item("obj-001", 0.8), item("obj-002", 0.7)]));
        assert_eq!(bare.len(), 2);
        assert!(parse_track_listing(json!({"status": "ok"})).is_empty());
        assert!(parse_track_listing(json!("nope")).is_empty());
    }

    #[test]
    fn skips_items_that_do_not_validate() {
        let listing = json!([
            item("obj-001", 0.8),
            item("obj-002", 1.4),
            {"object_id": "obj-003"},
            item("obj-004", -0.1),
        ]);
        let tracks = parse_track_listing(listing);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].object_id, "obj-001");
    }

    #[tokio::test]
    async fn store_source_honours_limit() {
        let store = Arc::new(MemoryTrackStore::new());
        for idx in 0..5 {
            let object_id = format!("obj-{idx:03}");
            store
                .put(Track {
                    track_id: Track::id_for(&object_id),
                    object_id,
                    last_update: "2025-03-01T12:00:00Z".into(),
                    state: TrackState::default(),
                    confidence: 0.6,
                    sources: Vec::new(),
                    flags: IndexSet::new(),
                })
                .await
                .unwrap();
        }
        let source = StoreTrackSource::new(store);
        assert_eq!(source.fetch(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unreachable_api_is_a_track_error() {
        let source = HttpTrackSource::new("http://127.0.0.1:9/", Duration::from_millis(500))
            .unwrap()
            .with_auth_token("service-token");
        assert_eq!(source.tracks_url(150), "http://127.0.0.1:9/tracks?limit=150");
        assert!(matches!(
            source.fetch(150).await,
            Err(PlanningError::Tracks(_))
        ));
    }
}
