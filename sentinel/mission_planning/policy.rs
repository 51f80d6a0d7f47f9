use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Versioned planning policy, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Version tag echoed in every plan.
    #[serde(default = "default_policy_version")]
    pub policy_version: String,
    /// Fallbacks for request fields.
    #[serde(default)]
    pub mission_defaults: MissionDefaults,
    /// Eligibility rules for (track, sensor) pairs.
    #[serde(default)]
    pub hard_constraints: HardConstraints,
    /// Score weighting.
    #[serde(default)]
    pub scoring: Scoring,
    /// Additive boosts, evaluated independently.
    #[serde(default)]
    pub priority_rules: Vec<PriorityRule>,
    /// Carried through to the policy summary; selection breaks ties by generation order.
    #[serde(default)]
    pub tie_break: Map<String, Value>,
    /// Sensors that can receive tasks.
    #[serde(default)]
    pub sensor_inventory: SensorInventory,
}

/// Request defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionDefaults {
    /// Recency horizon in minutes.
    #[serde(default = "default_time_horizon_min")]
    pub time_horizon_min: u32,
    /// Task cap per plan.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

impl Default for MissionDefaults {
    fn default() -> Self {
        Self {
            time_horizon_min: default_time_horizon_min(),
            max_tasks: default_max_tasks(),
        }
    }
}

/// Non-negotiable eligibility rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardConstraints {
    /// Tracks below this confidence are never tasked.
    #[serde(default)]
    pub min_track_confidence: f64,
    /// Permitted sensor classes; empty permits all.
    #[serde(default)]
    pub allowed_sensor_types: Vec<String>,
    /// Tracks whose z component is below this floor are never tasked.
    #[serde(default = "default_z_floor")]
    pub no_task_z_km_below: f64,
    /// Per-sensor task cap, combined with each sensor's own `max_tasks`.
    #[serde(default = "default_max_tasks_per_sensor")]
    pub max_tasks_per_sensor: usize,
    /// Per-object task cap.
    #[serde(default = "default_max_tasks_per_object")]
    pub max_tasks_per_object: usize,
}

impl Default for HardConstraints {
    fn default() -> Self {
        Self {
            min_track_confidence: 0.0,
            allowed_sensor_types: Vec::new(),
            no_task_z_km_below: default_z_floor(),
            max_tasks_per_sensor: default_max_tasks_per_sensor(),
            max_tasks_per_object: default_max_tasks_per_object(),
        }
    }
}

/// Scoring section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
    /// Component weights.
    #[serde(default)]
    pub weights: ScoringWeights,
}

/// Weights applied to score components. They need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of `0.5 + boost`.
    #[serde(default = "default_mission_priority_weight")]
    pub mission_priority: f64,
    /// Weight of track confidence.
    #[serde(default = "default_confidence_weight")]
    pub confidence: f64,
    /// Weight of recency.
    #[serde(default = "default_recency_weight")]
    pub recency: f64,
    /// Weight of the geometry placeholder.
    #[serde(default = "default_placeholder_weight")]
    pub geometry: f64,
    /// Weight of the diversity placeholder.
    #[serde(default = "default_placeholder_weight")]
    pub diversity: f64,
}

impl ScoringWeights {
    fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("mission_priority", self.mission_priority),
            ("confidence", self.confidence),
            ("recency", self.recency),
            ("geometry", self.geometry),
            ("diversity", self.diversity),
        ]
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            mission_priority: default_mission_priority_weight(),
            confidence: default_confidence_weight(),
            recency: default_recency_weight(),
            geometry: default_placeholder_weight(),
            diversity: default_placeholder_weight(),
        }
    }
}

/// Situational boost applied when every present condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityRule {
    /// Optional label for summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Conditions; an empty set always matches.
    #[serde(default)]
    pub when: RuleConditions,
    /// Amount added to the boost when matched.
    #[serde(default)]
    pub boost: f64,
}

/// Optional conditions of a priority rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    /// Matches when `z_km >= z_km_min`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_km_min: Option<f64>,
    /// Matches when `confidence <= confidence_max`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_max: Option<f64>,
    /// Matches when the track was updated at most this many minutes ago.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_within_min: Option<f64>,
}

impl RuleConditions {
    fn thresholds(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("z_km_min", self.z_km_min),
            ("confidence_max", self.confidence_max),
            ("updated_within_min", self.updated_within_min),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
    }
}

/// Sensor inventory section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInventory {
    /// Declared sensors, in planning order.
    #[serde(default)]
    pub sensors: Vec<SensorDef>,
}

/// One taskable sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDef {
    /// Unique sensor id.
    pub sensor_id: String,
    /// Sensor class matched against `allowed_sensor_types`.
    pub sensor_type: String,
    /// Unavailable sensors fail the constraint check.
    #[serde(default = "default_available")]
    pub is_available: bool,
    /// Per-cycle task cap for this sensor.
    #[serde(default = "default_sensor_max_tasks")]
    pub max_tasks: usize,
    /// Free-form coverage description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_hint: Option<String>,
}

impl SensorDef {
    /// Available sensor with the default task cap.
    #[must_use]
    pub fn new(sensor_id: impl Into<String>, sensor_type: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type: sensor_type.into(),
            is_available: true,
            max_tasks: default_sensor_max_tasks(),
            coverage_hint: None,
        }
    }
}

/// Read-only view of a policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    /// Version tag.
    pub policy_version: String,
    /// Hard constraints in force.
    pub hard_constraints: HardConstraints,
    /// Scoring weights in force.
    pub scoring: Scoring,
    /// Priority rules in force.
    pub priority_rules: Vec<PriorityRule>,
    /// Tie-break section as loaded.
    pub tie_break: Map<String, Value>,
    /// Number of declared sensors.
    pub sensor_count: usize,
}

impl Policy {
    /// Reads and validates a TOML policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading policy {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing policy {}", path.display()))
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let policy: Self = toml::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Checks sensor declarations, weights, and numeric thresholds.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for sensor in &self.sensor_inventory.sensors {
            if sensor.sensor_id.trim().is_empty() {
                bail!("sensor_id must not be empty");
            }
            if sensor.sensor_type.trim().is_empty() {
                bail!("sensor {} has an empty sensor_type", sensor.sensor_id);
            }
            if !seen.insert(sensor.sensor_id.as_str()) {
                bail!("sensor {} is declared twice", sensor.sensor_id);
            }
        }
        for (name, weight) in self.scoring.weights.entries() {
            if !weight.is_finite() || weight < 0.0 {
                bail!("scoring weight {name} must be a non-negative number, got {weight}");
            }
        }
        let hard = &self.hard_constraints;
        for (name, value) in [
            ("min_track_confidence", hard.min_track_confidence),
            ("no_task_z_km_below", hard.no_task_z_km_below),
        ] {
            if !value.is_finite() {
                bail!("hard constraint {name} must be finite, got {value}");
            }
        }
        for (idx, rule) in self.priority_rules.iter().enumerate() {
            let label = rule.name.clone().unwrap_or_else(|| format!("#{idx}"));
            if !rule.boost.is_finite() {
                bail!("priority rule {label} has a non-finite boost {}", rule.boost);
            }
            for (name, value) in rule.when.thresholds() {
                if !value.is_finite() {
                    bail!("priority rule {label} has a non-finite {name} {value}");
                }
            }
        }
        Ok(())
    }

    /// Declared sensors.
    #[must_use]
    pub fn sensors(&self) -> &[SensorDef] {
        &self.sensor_inventory.sensors
    }

    /// Summary suitable for a read-only policy endpoint.
    #[must_use]
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            policy_version: self.policy_version.clone(),
            hard_constraints: self.hard_constraints.clone(),
            scoring: self.scoring,
            priority_rules: self.priority_rules.clone(),
            tie_break: self.tie_break.clone(),
            sensor_count: self.sensor_inventory.sensors.len(),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            policy_version: default_policy_version(),
            mission_defaults: MissionDefaults::default(),
            hard_constraints: HardConstraints::default(),
            scoring: Scoring::default(),
            priority_rules: Vec::new(),
            tie_break: Map::new(),
            sensor_inventory: SensorInventory::default(),
        }
    }
}

/// Where a planner obtains its policy each cycle.
#[derive(Debug, Clone)]
pub enum PolicySource {
    /// Re-read from disk on every request, so edits apply to the next plan.
    File(PathBuf),
    /// Fixed policy held in memory.
    Fixed(Arc<Policy>),
}

impl PolicySource {
    /// Current policy.
    pub fn load(&self) -> Result<Arc<Policy>> {
        match self {
            Self::File(path) => Policy::load(path).map(Arc::new),
            Self::Fixed(policy) => Ok(Arc::clone(policy)),
        }
    }
}

impl From<Policy> for PolicySource {
    fn from(policy: Policy) -> Self {
        Self::Fixed(Arc::new(policy))
    }
}

fn default_policy_version() -> String {
    "unknown".into()
}

const fn default_time_horizon_min() -> u32 {
    30
}

const fn default_max_tasks() -> usize {
    5
}

const fn default_z_floor() -> f64 {
    -1e9
}

const fn default_max_tasks_per_sensor() -> usize {
    3
}

const fn default_max_tasks_per_object() -> usize {
    1
}

const fn default_mission_priority_weight() -> f64 {
    0.35
}

const fn default_confidence_weight() -> f64 {
    0.30
}

const fn default_recency_weight() -> f64 {
    0.15
}

const fn default_placeholder_weight() -> f64 {
    0.10
}

const fn default_available() -> bool {
    true
}

const fn default_sensor_max_tasks() -> usize {
    3
}
