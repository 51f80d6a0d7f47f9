use serde::{Deserialize, Serialize};

use crate::policy::ScoringWeights;

/// Action attached to every recommendation.
pub const COLLECT_OBSERVATION: &str = "collect_observation";

/// Operator request for one planning cycle.
///
/// Absent or zero `time_horizon_min`/`max_tasks` fall back to the policy defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRequest {
    /// Caller-chosen mission identifier, echoed in the response.
    pub mission_id: String,
    /// Recency horizon in minutes.
    #[serde(default)]
    pub time_horizon_min: Option<u32>,
    /// Upper bound on selected tasks.
    #[serde(default)]
    pub max_tasks: Option<usize>,
    /// Free text, only forwarded to the explanation provider.
    #[serde(default)]
    pub operator_intent: Option<String>,
    /// Restricts the sensor inventory to these ids when non-empty.
    #[serde(default)]
    pub preferred_sensors: Option<Vec<String>>,
}

impl MissionRequest {
    /// Request with every optional field unset.
    #[must_use]
    pub fn new(mission_id: impl Into<String>) -> Self {
        Self {
            mission_id: mission_id.into(),
            ..Self::default()
        }
    }

    /// Sets the recency horizon.
    #[must_use]
    pub const fn with_horizon(mut self, minutes: u32) -> Self {
        self.time_horizon_min = Some(minutes);
        self
    }

    /// Sets the task cap.
    #[must_use]
    pub const fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    /// Sets the operator intent.
    #[must_use]
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.operator_intent = Some(intent.into());
        self
    }

    /// Restricts planning to the given sensors.
    #[must_use]
    pub fn with_preferred_sensors<I, S>(mut self, sensors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_sensors = Some(sensors.into_iter().map(Into::into).collect());
        self
    }
}

/// Outcome of a hard-constraint check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintResult {
    /// True when no constraint failed.
    pub passed: bool,
    /// One entry per failed constraint.
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl ConstraintResult {
    /// Builds a result from the collected failure reasons.
    #[must_use]
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

/// Normalized score components, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// `0.5 + boost`, clamped.
    pub mission_priority: f64,
    /// Track confidence, clamped.
    pub confidence: f64,
    /// Linear decay of track age over the horizon.
    pub recency: f64,
    /// Neutral placeholder.
    pub geometry: f64,
    /// Neutral placeholder.
    pub diversity: f64,
}

impl ScoreBreakdown {
    /// Weighted sum of the components. Weights are used as given.
    #[must_use]
    pub fn weighted_total(&self, weights: &ScoringWeights) -> f64 {
        weights.mission_priority * self.mission_priority
            + weights.confidence * self.confidence
            + weights.recency * self.recency
            + weights.geometry * self.geometry
            + weights.diversity * self.diversity
    }
}

/// One proposed (sensor, object) collection task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecommendation {
    /// `task-<sensor_id>-<object_id>`.
    pub task_id: String,
    /// Target object.
    pub object_id: String,
    /// Assigned sensor.
    pub sensor_id: String,
    /// Class of the assigned sensor.
    pub sensor_type: String,
    /// Always [`COLLECT_OBSERVATION`].
    pub action: String,
    /// Weighted total.
    pub score: f64,
    /// Components behind `score`.
    pub score_breakdown: ScoreBreakdown,
    /// Constraint outcome (always passed for emitted tasks).
    pub constraints: ConstraintResult,
    /// Optional per-task rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl TaskRecommendation {
    /// Deterministic task id for a sensor/object pair.
    #[must_use]
    pub fn id_for(sensor_id: &str, object_id: &str) -> String {
        format!("task-{sensor_id}-{object_id}")
    }
}

/// Result of one planning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    /// Echo of the request's mission id.
    pub mission_id: String,
    /// Version of the policy that produced the plan.
    pub policy_version: String,
    /// Selected tasks, best first.
    pub tasks: Vec<TaskRecommendation>,
    /// Explanation or diagnostic notes.
    #[serde(default)]
    pub notes: Vec<String>,
    /// Whether an explanation provider contributed a note.
    #[serde(default)]
    pub llm_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_minimal_json() {
        let request: MissionRequest = serde_json::from_str(r#"{"mission_id": "m-1"}"#).unwrap();
        assert_eq!(request, MissionRequest::new("m-1"));
        let request = MissionRequest::new("m-2")
            .with_horizon(45)
            .with_preferred_sensors(["radar-1"]);
        assert_eq!(request.time_horizon_min, Some(45));
        assert_eq!(request.preferred_sensors.as_deref(), Some(&["radar-1".to_string()][..]));
    }

    #[test]
    fn constraint_result_passes_without_reasons() {
        assert!(ConstraintResult::from_reasons(Vec::new()).passed);
        assert!(!ConstraintResult::from_reasons(vec!["sensor unavailable".into()]).passed);
    }

    #[test]
    fn breakdown_serializes_as_named_components() {
        let breakdown = ScoreBreakdown {
            mission_priority: 0.5,
            confidence: 0.9,
            recency: 1.0,
            geometry: 0.5,
            diversity: 0.5,
        };
        let encoded = serde_json::to_value(breakdown).unwrap();
        assert_eq!(encoded["confidence"], 0.9);
        let total = breakdown.weighted_total(&ScoringWeights::default());
        assert!((total - 0.695).abs() < 1e-9);
        assert_eq!(TaskRecommendation::id_for("radar-1", "obj-001"), "task-radar-1-obj-001");
    }
}
