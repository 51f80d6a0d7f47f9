#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Sentinel tracking: fuses asynchronous sensor observations into persisted track estimates.

/// Track, observation, and state vector definitions.
#[path = "../model.rs"]
pub mod model;

/// Exponential-blend fusion of observations into tracks.
#[path = "../fusion.rs"]
pub mod fusion;

/// Sanity checks applied before fusion.
#[path = "../validation.rs"]
pub mod validation;

/// Track persistence (memory and journal-backed stores).
#[path = "../store.rs"]
pub mod store;

/// Serialized read-modify-write ingestion pipeline.
#[path = "../service.rs"]
pub mod service;

/// Seeded observation generator for local runs.
#[path = "../sensor_sim.rs"]
pub mod sensor_sim;

/// Error type shared by the tracking components.
#[path = "../error.rs"]
pub mod error;

pub use error::TrackingError;
pub use fusion::fuse;
pub use model::{Integrity, Observation, SourceRef, Track, TrackState};
pub use sensor_sim::SensorSimulator;
pub use service::{FusionService, FusionStats};
pub use store::{query_tracks, snapshot, FileTrackStore, MemoryTrackStore, TrackStore};
pub use validation::{ObservationValidator, ValidationFlag};
