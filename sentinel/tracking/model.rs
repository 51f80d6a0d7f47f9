use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Measurement keys making up the six-dimensional state vector, in vector order.
pub const STATE_FIELDS: [&str; 6] = ["x_km", "y_km", "z_km", "vx_kms", "vy_kms", "vz_kms"];

/// Prefix used to derive a track id from its object id.
pub const TRACK_ID_PREFIX: &str = "trk-";

/// Position (km) and velocity (km/s) estimate of one object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// X position (km).
    #[serde(default)]
    pub x_km: f64,
    /// Y position (km).
    #[serde(default)]
    pub y_km: f64,
    /// Z position (km).
    #[serde(default)]
    pub z_km: f64,
    /// X velocity (km/s).
    #[serde(default)]
    pub vx_kms: f64,
    /// Y velocity (km/s).
    #[serde(default)]
    pub vy_kms: f64,
    /// Z velocity (km/s).
    #[serde(default)]
    pub vz_kms: f64,
}

impl TrackState {
    /// Reads the state straight from a raw measurement; unusable fields become 0.0.
    #[must_use]
    pub fn from_measurement(measurement: &Map<String, Value>) -> Self {
        let mut values = [0.0; 6];
        for (slot, key) in values.iter_mut().zip(STATE_FIELDS) {
            *slot = coerce_f64(measurement.get(key));
        }
        Self::from_array(values)
    }

    /// Builds a state from `[x, y, z, vx, vy, vz]`.
    #[must_use]
    pub const fn from_array(values: [f64; 6]) -> Self {
        Self {
            x_km: values[0],
            y_km: values[1],
            z_km: values[2],
            vx_kms: values[3],
            vy_kms: values[4],
            vz_kms: values[5],
        }
    }

    /// Returns `[x, y, z, vx, vy, vz]`.
    #[must_use]
    pub const fn as_array(&self) -> [f64; 6] {
        [
            self.x_km,
            self.y_km,
            self.z_km,
            self.vx_kms,
            self.vy_kms,
            self.vz_kms,
        ]
    }

    /// Per-dimension `(1 - weight) * self + weight * measured`.
    #[must_use]
    pub fn blend(&self, measured: &Self, weight: f64) -> Self {
        let previous = self.as_array();
        let incoming = measured.as_array();
        let mut blended = [0.0; 6];
        for (idx, slot) in blended.iter_mut().enumerate() {
            *slot = (1.0 - weight) * previous[idx] + weight * incoming[idx];
        }
        Self::from_array(blended)
    }
}

/// Coerces a loosely-typed JSON value to `f64`, defaulting to 0.0.
///
/// Numbers pass through, numeric strings are parsed, booleans map to 1.0/0.0.
#[must_use]
pub fn coerce_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(raw)) => raw.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(flag)) => f64::from(u8::from(*flag)),
        _ => 0.0,
    }
}

/// Parses an ISO-8601 timestamp; anything unparseable resolves to `fallback`.
///
/// Offset-less timestamps are read as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .unwrap_or(fallback)
}

/// One contributing sensor report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Reporting sensor.
    pub sensor_id: String,
    /// Observation timestamp as reported.
    pub timestamp: String,
}

const fn default_confidence() -> f64 {
    0.6
}

/// Fused, persisted state estimate for one tracked object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// `trk-<object_id>`.
    pub track_id: String,
    /// Unique object key.
    pub object_id: String,
    /// Timestamp of the most recent contributing observation.
    #[serde(alias = "updated_at")]
    pub last_update: String,
    /// Current estimate.
    pub state: TrackState,
    /// Estimate confidence in [0, 1].
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Most recent contributing reports, oldest first (at most 10).
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    /// Qualitative condition tags.
    #[serde(default)]
    pub flags: IndexSet<String>,
}

impl Track {
    /// Derives the track id for an object.
    #[must_use]
    pub fn id_for(object_id: &str) -> String {
        format!("{TRACK_ID_PREFIX}{object_id}")
    }

    /// Altitude-like z component used by constraints and rules.
    #[must_use]
    pub const fn z_km(&self) -> f64 {
        self.state.z_km
    }

    /// Last update as a UTC instant (unparseable timestamps resolve to `now`).
    #[must_use]
    pub fn updated_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        parse_timestamp(&self.last_update, now)
    }

    /// Seconds elapsed since the last update, never negative.
    #[must_use]
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = now - self.updated_at(now);
        (elapsed.num_milliseconds() as f64 / 1000.0).max(0.0)
    }
}

/// Optional integrity block attached by the sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    /// Whether the sensor claims the record is signed.
    #[serde(default)]
    pub signed: bool,
    /// Signature material, if any.
    #[serde(default)]
    pub signature: Option<String>,
}

/// Raw sensor observation as received from the ingestion path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Sensor-assigned event id.
    pub event_id: String,
    /// Reporting sensor.
    pub sensor_id: String,
    /// Sensor class (`radar`, `optical`, `space`, ...).
    pub sensor_type: String,
    /// ISO-8601 observation time.
    pub timestamp: String,
    /// Observed object.
    pub object_id: String,
    /// Loosely-typed measurement fields (`x_km` ... `vz_kms`).
    #[serde(default)]
    pub measurement: Map<String, Value>,
    /// Loosely-typed quality fields (`snr_db`, `measurement_sigma`).
    #[serde(default)]
    pub quality: Map<String, Value>,
    /// Optional integrity claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

impl Observation {
    /// Measured state with every field coerced to `f64`.
    #[must_use]
    pub fn measured_state(&self) -> TrackState {
        TrackState::from_measurement(&self.measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn measurement_coercion_defaults_to_zero() {
        let measurement = json!({
            "x_km": 100.5,
            "y_km": "42",
            "z_km": "not-a-number",
            "vx_kms": null,
            "vy_kms": true
        });
        let state = TrackState::from_measurement(measurement.as_object().unwrap());
        assert_eq!(state.as_array(), [100.5, 42.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn blend_weights_each_dimension() {
        let previous = TrackState::from_array([10.0, 20.0, 30.0, 1.0, 2.0, 3.0]);
        let measured = TrackState::from_array([20.0, 0.0, 30.0, 3.0, 2.0, -3.0]);
        let blended = previous.blend(&measured, 0.5);
        assert_eq!(blended.as_array(), [15.0, 10.0, 30.0, 2.0, 2.0, 0.0]);
    }

    #[test]
    fn timestamps_fall_back_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp("2025-03-01T11:59:00Z", now),
            Utc.with_ymd_and_hms(2025, 3, 1, 11, 59, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2025-03-01T11:00:00", now),
            Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap()
        );
        assert_eq!(parse_timestamp("yesterday-ish", now), now);
    }

    #[test]
    fn stored_track_tolerates_missing_optional_fields() {
        let track: Track = serde_json::from_value(json!({
            "track_id": "trk-obj-001",
            "object_id": "obj-001",
            "last_update": "2025-03-01T11:59:00Z",
            "state": { "x_km": 1.0, "z_km": 400.0 }
        }))
        .unwrap();
        assert!((track.confidence - 0.6).abs() < f64::EPSILON);
        assert!(track.sources.is_empty());
        assert!((track.z_km() - 400.0).abs() < f64::EPSILON);
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert!((track.age_seconds(now) - 60.0).abs() < 1e-9);
    }
}
