use chrono::{DateTime, Utc};
use sentinel_tracking::Track;

use crate::{
    model::{ConstraintResult, ScoreBreakdown},
    policy::{HardConstraints, PriorityRule, RuleConditions, ScoringWeights, SensorDef},
};

/// Upper bound on the summed priority boost.
pub const MAX_PRIORITY_BOOST: f64 = 0.40;
/// Score given to components that are not modelled yet.
pub const NEUTRAL_COMPONENT: f64 = 0.5;

impl RuleConditions {
    /// True when every present condition holds for `track`, whose age is `age_min` minutes.
    #[must_use]
    pub fn matches(&self, track: &Track, age_min: f64) -> bool {
        self.z_km_min.map_or(true, |floor| track.z_km() >= floor)
            && self
                .confidence_max
                .map_or(true, |ceiling| track.confidence <= ceiling)
            && self
                .updated_within_min
                .map_or(true, |window| age_min <= window)
    }
}

/// Sum of the boosts of all matching rules, clamped to `[0, MAX_PRIORITY_BOOST]`.
#[must_use]
pub fn priority_boost(track: &Track, rules: &[PriorityRule], now: DateTime<Utc>) -> f64 {
    let age_min = track.age_seconds(now) / 60.0;
    rules
        .iter()
        .filter(|rule| rule.when.matches(track, age_min))
        .map(|rule| rule.boost)
        .sum::<f64>()
        .clamp(0.0, MAX_PRIORITY_BOOST)
}

/// Evaluates every hard constraint for the pair and reports all failures.
#[must_use]
pub fn check_constraints(
    track: &Track,
    sensor: &SensorDef,
    hard: &HardConstraints,
) -> ConstraintResult {
    let mut reasons = Vec::new();
    if track.confidence < hard.min_track_confidence {
        reasons.push(format!(
            "confidence {:.2} below {:.2}",
            track.confidence, hard.min_track_confidence
        ));
    }
    if !hard.allowed_sensor_types.is_empty()
        && !hard.allowed_sensor_types.contains(&sensor.sensor_type)
    {
        reasons.push(format!("sensor_type {} not allowed", sensor.sensor_type));
    }
    if track.z_km() < hard.no_task_z_km_below {
        reasons.push(format!(
            "z_km {:.2} below floor {:.2}",
            track.z_km(),
            hard.no_task_z_km_below
        ));
    }
    if !sensor.is_available {
        reasons.push("sensor unavailable".to_string());
    }
    ConstraintResult::from_reasons(reasons)
}

/// Scores a track and returns the weighted total with its components.
#[must_use]
pub fn score(
    track: &Track,
    boost: f64,
    weights: &ScoringWeights,
    horizon_min: u32,
    now: DateTime<Utc>,
) -> (f64, ScoreBreakdown) {
    let horizon_sec = (f64::from(horizon_min) * 60.0).max(1.0);
    let breakdown = ScoreBreakdown {
        mission_priority: (NEUTRAL_COMPONENT + boost).clamp(0.0, 1.0),
        confidence: track.confidence.clamp(0.0, 1.0),
        recency: 1.0 - (track.age_seconds(now) / horizon_sec).min(1.0),
        geometry: NEUTRAL_COMPONENT,
        diversity: NEUTRAL_COMPONENT,
    };
    (breakdown.weighted_total(weights), breakdown)
}
