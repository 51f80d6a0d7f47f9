use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sentinel_tracking::Track;
use serde_json::json;
use shared_event_bus::topics;
use shared_logging::{LogLevel, Telemetry};
use tokio::time;
use tracing::instrument;

use crate::{
    error::PlanningError,
    explain::{ExplainerConfig, ExplanationProvider, ExplanationRequest},
    model::{MissionRequest, PlanResponse, TaskRecommendation, COLLECT_OBSERVATION},
    policy::{HardConstraints, Policy, PolicySource, PolicySummary, SensorDef},
    rules::{check_constraints, priority_boost, score},
    track_source::{TrackSource, PLANNING_TRACK_LIMIT},
};

/// Note attached when the explanation provider fails.
pub const EXPLANATION_FALLBACK_NOTE: &str =
    "LLM explanation unavailable; returned deterministic results only.";
/// Note attached when nothing could be selected.
pub const NO_TASKS_NOTE: &str =
    "No valid task recommendations. Check track availability and policy constraints.";

const UNKNOWN_SENSOR_CAP: usize = 3;

/// Running per-sensor and per-object task counts for one planning cycle.
#[derive(Debug, Clone)]
pub struct AllocationLedger {
    sensor_caps: IndexMap<String, usize>,
    per_sensor_cap: usize,
    per_object_cap: usize,
    sensor_counts: IndexMap<String, usize>,
    object_counts: IndexMap<String, usize>,
}

impl AllocationLedger {
    /// Empty ledger for `sensors` under `hard`.
    #[must_use]
    pub fn new(sensors: &[SensorDef], hard: &HardConstraints) -> Self {
        Self {
            sensor_caps: sensors
                .iter()
                .map(|sensor| (sensor.sensor_id.clone(), sensor.max_tasks))
                .collect(),
            per_sensor_cap: hard.max_tasks_per_sensor,
            per_object_cap: hard.max_tasks_per_object,
            sensor_counts: IndexMap::new(),
            object_counts: IndexMap::new(),
        }
    }

    /// `min(sensor.max_tasks, max_tasks_per_sensor)`.
    #[must_use]
    pub fn sensor_cap(&self, sensor_id: &str) -> usize {
        self.sensor_caps
            .get(sensor_id)
            .copied()
            .unwrap_or(UNKNOWN_SENSOR_CAP)
            .min(self.per_sensor_cap)
    }

    /// Tasks already given to `sensor_id`.
    #[must_use]
    pub fn sensor_load(&self, sensor_id: &str) -> usize {
        self.sensor_counts.get(sensor_id).copied().unwrap_or(0)
    }

    /// Tasks already aimed at `object_id`.
    #[must_use]
    pub fn object_load(&self, object_id: &str) -> usize {
        self.object_counts.get(object_id).copied().unwrap_or(0)
    }

    /// True when neither the sensor nor the object has reached its cap.
    #[must_use]
    pub fn has_capacity(&self, sensor_id: &str, object_id: &str) -> bool {
        self.sensor_load(sensor_id) < self.sensor_cap(sensor_id)
            && self.object_load(object_id) < self.per_object_cap
    }

    /// Counts one task against both caps.
    pub fn record(&mut self, sensor_id: &str, object_id: &str) {
        *self.sensor_counts.entry(sensor_id.to_string()).or_default() += 1;
        *self.object_counts.entry(object_id.to_string()).or_default() += 1;
    }
}

/// Generates, ranks, and greedily selects tasks for one cycle.
///
/// Every (track, sensor) pair with remaining capacity is constraint-checked; passing pairs
/// are scored, stably sorted by descending score (ties keep generation order), and taken
/// while the caps and `max_tasks` allow.
#[must_use]
pub fn plan_tasks(
    tracks: &[Track],
    sensors: &[SensorDef],
    policy: &Policy,
    horizon_min: u32,
    max_tasks: usize,
    now: DateTime<Utc>,
) -> Vec<TaskRecommendation> {
    let hard = &policy.hard_constraints;
    let mut ledger = AllocationLedger::new(sensors, hard);

    let mut candidates = Vec::new();
    for track in tracks {
        let boost = priority_boost(track, &policy.priority_rules, now);
        for sensor in sensors {
            if !ledger.has_capacity(&sensor.sensor_id, &track.object_id) {
                continue;
            }
            let constraints = check_constraints(track, sensor, hard);
            if !constraints.passed {
                continue;
            }
            let (total, breakdown) =
                score(track, boost, &policy.scoring.weights, horizon_min, now);
            candidates.push(TaskRecommendation {
                task_id: TaskRecommendation::id_for(&sensor.sensor_id, &track.object_id),
                object_id: track.object_id.clone(),
                sensor_id: sensor.sensor_id.clone(),
                sensor_type: sensor.sensor_type.clone(),
                action: COLLECT_OBSERVATION.to_string(),
                score: total,
                score_breakdown: breakdown,
                constraints,
                rationale: None,
            });
        }
    }
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selected = Vec::new();
    for candidate in candidates {
        if selected.len() >= max_tasks {
            break;
        }
        if !ledger.has_capacity(&candidate.sensor_id, &candidate.object_id) {
            continue;
        }
        ledger.record(&candidate.sensor_id, &candidate.object_id);
        selected.push(candidate);
    }
    selected
}

/// Planning service: loads the policy and tracks, plans, and optionally explains.
///
/// Stateless between requests; concurrent calls do not interact.
pub struct MissionPlanner {
    policy: PolicySource,
    tracks: Arc<dyn TrackSource>,
    explainer: Option<Arc<dyn ExplanationProvider>>,
    explain_timeout: Duration,
    track_limit: usize,
    telemetry: Option<Telemetry>,
}

impl MissionPlanner {
    /// Planner reading its policy from `policy` and tracks from `tracks`.
    #[must_use]
    pub fn new(policy: PolicySource, tracks: Arc<dyn TrackSource>) -> Self {
        Self {
            policy,
            tracks,
            explainer: None,
            explain_timeout: ExplainerConfig::default().timeout(),
            track_limit: PLANNING_TRACK_LIMIT,
            telemetry: None,
        }
    }

    /// Attaches an explanation provider.
    #[must_use]
    pub fn with_explainer(mut self, explainer: Arc<dyn ExplanationProvider>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    /// Bounds how long a plan waits on the explanation provider.
    #[must_use]
    pub const fn with_explain_timeout(mut self, timeout: Duration) -> Self {
        self.explain_timeout = timeout;
        self
    }

    /// Overrides how many tracks each cycle reads.
    #[must_use]
    pub fn with_track_limit(mut self, limit: usize) -> Self {
        self.track_limit = limit.max(1);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Summary of the policy currently in force.
    pub fn policy_summary(&self) -> Result<PolicySummary, PlanningError> {
        Ok(self.policy.load().map_err(PlanningError::Policy)?.summary())
    }

    /// Plans against the current time.
    pub async fn build_plan(&self, request: &MissionRequest) -> Result<PlanResponse, PlanningError> {
        self.build_plan_at(request, Utc::now()).await
    }

    /// Plans as of `now`.
    #[instrument(skip(self, request, now), fields(mission_id = %request.mission_id))]
    pub async fn build_plan_at(
        &self,
        request: &MissionRequest,
        now: DateTime<Utc>,
    ) -> Result<PlanResponse, PlanningError> {
        let policy = self.policy.load().map_err(PlanningError::Policy)?;
        let horizon_min = request
            .time_horizon_min
            .filter(|minutes| *minutes > 0)
            .unwrap_or(policy.mission_defaults.time_horizon_min);
        let max_tasks = request
            .max_tasks
            .filter(|count| *count > 0)
            .unwrap_or(policy.mission_defaults.max_tasks);

        let tracks = self.tracks.fetch(self.track_limit).await?;
        let sensors = preferred_sensors(policy.sensors(), request.preferred_sensors.as_deref());
        let tasks = plan_tasks(&tracks, &sensors, &policy, horizon_min, max_tasks, now);

        let mut notes = Vec::new();
        let mut llm_used = false;
        if let Some(explainer) = self.explainer.as_ref().filter(|_| !tasks.is_empty()) {
            let explanation = ExplanationRequest {
                mission_id: &request.mission_id,
                operator_intent: request.operator_intent.as_deref(),
                tasks: &tasks,
            };
            let explained = time::timeout(self.explain_timeout, explainer.explain(&explanation))
                .await
                .unwrap_or_else(|_| {
                    Err(PlanningError::Explanation(format!(
                        "no answer within {:?}",
                        self.explain_timeout
                    )))
                });
            match explained {
                Ok(Some(text)) if !text.is_empty() => {
                    notes.push(text);
                    llm_used = true;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("plan explanation degraded: {err}");
                    self.log(
                        LogLevel::Warn,
                        "planning.explanation.failed",
                        json!({ "mission_id": request.mission_id, "error": err.to_string() }),
                    );
                    notes.push(EXPLANATION_FALLBACK_NOTE.to_string());
                }
            }
        }
        if tasks.is_empty() {
            notes.push(NO_TASKS_NOTE.to_string());
        }

        let response = PlanResponse {
            mission_id: request.mission_id.clone(),
            policy_version: policy.policy_version.clone(),
            tasks,
            notes,
            llm_used,
        };
        self.log(
            LogLevel::Info,
            "planning.plan.completed",
            json!({
                "mission_id": response.mission_id,
                "policy_version": response.policy_version,
                "tracks": tracks.len(),
                "sensors": sensors.len(),
                "tasks": response.tasks.len(),
                "llm_used": response.llm_used,
            }),
        );
        if let Some(tel) = &self.telemetry {
            let _ = tel
                .emit(
                    topics::PLAN_COMPLETED,
                    json!({ "mission_id": response.mission_id, "tasks": response.tasks.len() }),
                )
                .await;
        }
        Ok(response)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

fn preferred_sensors(inventory: &[SensorDef], preferred: Option<&[String]>) -> Vec<SensorDef> {
    match preferred {
        Some(ids) if !ids.is_empty() => inventory
            .iter()
            .filter(|sensor| ids.contains(&sensor.sensor_id))
            .cloned()
            .collect(),
        _ => inventory.to_vec(),
    }
}
