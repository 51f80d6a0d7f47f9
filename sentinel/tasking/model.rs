use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Rate applied to sensors missing from the current plan.
pub const DEFAULT_RATE_HZ: f64 = 1.0;

/// Aggregate figures behind a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskingSummary {
    /// Track count used as the pressure denominator (never below 1).
    pub tracks_total: usize,
    /// Tracks below the low-confidence threshold.
    pub low_conf_tracks: usize,
    /// `low_conf_tracks / tracks_total`, rounded to 3 decimals.
    pub pressure: f64,
}

/// Recommended collection rate for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorTasking {
    /// Collection rate in Hz.
    pub rate_hz: f64,
}

impl Default for SensorTasking {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_RATE_HZ,
        }
    }
}

/// Per-sensor collection rates, regenerated wholesale every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskingPlan {
    /// Epoch seconds at generation.
    pub generated_at: i64,
    /// Policy tag that produced the plan.
    pub policy: String,
    /// Aggregate figures.
    #[serde(default)]
    pub summary: TaskingSummary,
    /// Rates keyed by sensor id.
    #[serde(default)]
    pub sensors: IndexMap<String, SensorTasking>,
}

impl TaskingPlan {
    /// Plan in effect before anything was published.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            generated_at: 0,
            policy: "none".into(),
            summary: TaskingSummary::default(),
            sensors: IndexMap::new(),
        }
    }

    /// Rate for `sensor_id`, if the plan covers it.
    #[must_use]
    pub fn rate_for(&self, sensor_id: &str) -> Option<f64> {
        self.sensors.get(sensor_id).map(|tasking| tasking.rate_hz)
    }
}

impl Default for TaskingPlan {
    fn default() -> Self {
        Self::empty()
    }
}

/// What a single sensor sees when it asks for its tasking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTaskingView {
    /// Requesting sensor.
    pub sensor_id: String,
    /// Its entry, or the default rate.
    pub tasking: SensorTasking,
    /// Generation time of the plan consulted.
    pub generated_at: i64,
}
