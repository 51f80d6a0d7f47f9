#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Sentinel mission planning: filters (track, sensor) pairs through hard constraints,
//! scores the survivors with rule-based boosts, and greedily selects a capped task list.

/// Request/response contracts.
#[path = "../model.rs"]
pub mod model;

/// Typed policy document and loader.
#[path = "../policy.rs"]
pub mod policy;

/// Constraint checks, priority rules, and scoring.
#[path = "../rules.rs"]
pub mod rules;

/// Candidate generation, selection, and the planning service.
#[path = "../planner.rs"]
pub mod planner;

/// Where planning cycles read tracks from.
#[path = "../track_source.rs"]
pub mod track_source;

/// Best-effort natural-language plan summaries.
#[path = "../explain.rs"]
pub mod explain;

/// Error type for planning.
#[path = "../error.rs"]
pub mod error;

pub use error::PlanningError;
pub use explain::{ChatCompletionsExplainer, ExplainerConfig, ExplanationProvider, ExplanationRequest};
pub use model::{ConstraintResult, MissionRequest, PlanResponse, ScoreBreakdown, TaskRecommendation};
pub use planner::{plan_tasks, AllocationLedger, MissionPlanner};
pub use policy::{
    HardConstraints, MissionDefaults, Policy, PolicySource, PolicySummary, PriorityRule,
    RuleConditions, ScoringWeights, SensorDef,
};
pub use rules::{check_constraints, priority_boost, score};
pub use track_source::{HttpTrackSource, StoreTrackSource, TrackSource};
