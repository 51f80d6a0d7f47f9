#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Sentinel tasking: turns the track population into per-sensor collection rates and
//! publishes them on a fixed cadence.

/// Tasking plan data contracts.
#[path = "../model.rs"]
pub mod model;

/// Pressure-based rate policy.
#[path = "../policy.rs"]
pub mod policy;

/// Explicitly owned last-known plan.
#[path = "../state.rs"]
pub mod state;

/// Plan publication targets.
#[path = "../publisher.rs"]
pub mod publisher;

/// Periodic optimizer driver.
#[path = "../driver.rs"]
pub mod driver;

/// Optimizer configuration file.
#[path = "../config.rs"]
pub mod config;

/// Error type for tasking.
#[path = "../error.rs"]
pub mod error;

pub use config::OptimizerConfig;
pub use driver::{OptimizerDriver, OptimizerHandle, OptimizerStats, SkipReason, TickOutcome};
pub use error::TaskingError;
pub use model::{SensorTasking, SensorTaskingView, TaskingPlan, TaskingSummary};
pub use policy::{compute_tasking, SensorClass, TaskingPolicyEngine};
pub use publisher::{HttpTaskingStore, TaskingStore};
pub use state::TaskingState;
