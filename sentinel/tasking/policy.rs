use chrono::Utc;
use indexmap::IndexMap;
use sentinel_tracking::Track;
use serde::{Deserialize, Serialize};

use crate::model::{SensorTasking, TaskingPlan, TaskingSummary};

/// Tag stamped on every plan this policy produces.
pub const POLICY_TAG: &str = "pressure_based_v1";
/// Tracks strictly below this confidence count toward pressure.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Sensor family; each has its own baseline, pressure gain, and cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorClass {
    /// Ground radar.
    Radar,
    /// Ground optical telescope.
    Optical,
    /// Space-based sensor.
    Space,
}

impl SensorClass {
    /// Rate with zero pressure.
    #[must_use]
    pub const fn baseline_hz(self) -> f64 {
        match self {
            Self::Radar => 2.0,
            Self::Optical => 1.0,
            Self::Space => 1.5,
        }
    }

    /// Added rate at full pressure.
    #[must_use]
    pub const fn pressure_gain_hz(self) -> f64 {
        match self {
            Self::Radar => 3.0,
            Self::Optical => 2.0,
            Self::Space => 2.5,
        }
    }

    /// Hard ceiling.
    #[must_use]
    pub const fn cap_hz(self) -> f64 {
        match self {
            Self::Radar => 5.0,
            Self::Optical => 3.0,
            Self::Space => 4.0,
        }
    }

    /// `min(cap, baseline + gain * pressure)`, rounded to 2 decimals.
    #[must_use]
    pub fn rate_hz(self, pressure: f64) -> f64 {
        round_to(
            (self.baseline_hz() + self.pressure_gain_hz() * pressure).min(self.cap_hz()),
            2,
        )
    }
}

/// Converts a track population into per-sensor collection rates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskingPolicyEngine {
    roster: IndexMap<String, SensorClass>,
}

impl TaskingPolicyEngine {
    /// Engine publishing rates for the given sensor ids.
    #[must_use]
    pub fn new(roster: IndexMap<String, SensorClass>) -> Self {
        Self { roster }
    }

    /// Sensor ids and their classes, in publication order.
    #[must_use]
    pub fn roster(&self) -> &IndexMap<String, SensorClass> {
        &self.roster
    }

    /// Computes the plan for `tracks`, stamped `generated_at` (epoch seconds).
    #[must_use]
    pub fn compute(&self, tracks: &[Track], generated_at: i64) -> TaskingPlan {
        let (low_conf_tracks, tracks_total) = count_low_confidence(tracks);
        let pressure = low_conf_tracks as f64 / tracks_total as f64;
        let sensors = self
            .roster
            .iter()
            .map(|(sensor_id, class)| {
                (
                    sensor_id.clone(),
                    SensorTasking {
                        rate_hz: class.rate_hz(pressure),
                    },
                )
            })
            .collect();
        let summary = TaskingSummary {
            tracks_total,
            low_conf_tracks,
            pressure: round_to(pressure, 3),
        };
        TaskingPlan {
            generated_at,
            policy: POLICY_TAG.into(),
            summary,
            sensors,
        }
    }
}

impl Default for TaskingPolicyEngine {
    fn default() -> Self {
        Self::new(default_roster())
    }
}

/// One radar, one optical, and one space sensor.
#[must_use]
pub fn default_roster() -> IndexMap<String, SensorClass> {
    IndexMap::from([
        ("radar-1".to_string(), SensorClass::Radar),
        ("optical-1".to_string(), SensorClass::Optical),
        ("space-1".to_string(), SensorClass::Space),
    ])
}

/// Computes a plan for the default roster stamped with the current time.
#[must_use]
pub fn compute_tasking(tracks: &[Track]) -> TaskingPlan {
    TaskingPolicyEngine::default().compute(tracks, Utc::now().timestamp())
}

// Denominator is floored at 1 so an empty population has zero pressure.
fn count_low_confidence(tracks: &[Track]) -> (usize, usize) {
    let low = tracks
        .iter()
        .filter(|track| track.confidence < LOW_CONFIDENCE_THRESHOLD)
        .count();
    (low, tracks.len().max(1))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;
    use sentinel_tracking::TrackState;

    fn track(object_id: &str, confidence: f64) -> Track {
        Track {
            track_id: Track::id_for(object_id),
            object_id: object_id.into(),
            last_update: "2025-03-01T12:00:00Z".into(),
            state: TrackState::default(),
            confidence,
            sources: Vec::new(),
            flags: IndexSet::new(),
        }
    }

    fn rates(plan: &TaskingPlan) -> (f64, f64, f64) {
        (
            plan.rate_for("radar-1").unwrap(),
            plan.rate_for("optical-1").unwrap(),
            plan.rate_for("space-1").unwrap(),
        )
    }

    #[test]
    fn empty_population_runs_at_baseline() {
        let plan = TaskingPolicyEngine::default().compute(&[], 1_700_000_000);
        assert!(plan.summary.pressure.abs() < f64::EPSILON);
        assert_eq!(plan.summary.low_conf_tracks, 0);
        assert_eq!(plan.summary.tracks_total, 1);
        assert_eq!(rates(&plan), (2.0, 1.0, 1.5));
        assert_eq!(plan.policy, POLICY_TAG);
        assert_eq!(plan.generated_at, 1_700_000_000);
    }

    #[test]
    fn all_low_confidence_hits_caps() {
        let tracks: Vec<_> = (0..4).map(|i| track(&format!("obj-{i}"), 0.6)).collect();
        let plan = TaskingPolicyEngine::default().compute(&tracks, 0);
        assert!((plan.summary.pressure - 1.0).abs() < f64::EPSILON);
        assert_eq!(rates(&plan), (5.0, 3.0, 4.0));
    }

    #[test]
    fn partial_pressure_is_rounded() {
        let tracks = vec![
            track("obj-1", 0.6),
            track("obj-2", 0.75),
            track("obj-3", 0.9),
        ];
        let plan = TaskingPolicyEngine::default().compute(&tracks, 0);
        assert_eq!(plan.summary.low_conf_tracks, 1);
        assert_eq!(plan.summary.tracks_total, 3);
        assert!((plan.summary.pressure - 0.333).abs() < 1e-12);
        assert_eq!(rates(&plan), (3.0, 1.67, 2.33));
    }

    #[test]
    fn custom_roster_controls_published_sensors() {
        let engine = TaskingPolicyEngine::new(IndexMap::from([
            ("radar-7".to_string(), SensorClass::Radar),
            ("radar-8".to_string(), SensorClass::Radar),
        ]));
        let plan = engine.compute(&[track("obj-1", 0.1)], 0);
        assert_eq!(plan.sensors.len(), 2);
        assert_eq!(plan.rate_for("radar-8"), Some(5.0));
        assert_eq!(plan.rate_for("radar-1"), None);
    }

    #[test]
    fn compute_tasking_uses_default_roster() {
        let plan = compute_tasking(&[]);
        assert_eq!(plan.sensors.keys().collect::<Vec<_>>(), ["radar-1", "optical-1", "space-1"]);
        assert!(plan.generated_at > 0);
    }
}
