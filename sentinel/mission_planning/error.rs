use sentinel_tracking::TrackingError;
use thiserror::Error;

/// Errors that abort a planning request.
///
/// Constraint failures and explanation failures never surface here; the former filter
/// candidates and the latter degrade to a fallback note.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// The policy document could not be read or failed validation.
    #[error("policy unavailable: {0:#}")]
    Policy(anyhow::Error),
    /// The track source could not be reached or answered with an error.
    #[error("track source failed: {0}")]
    Tracks(String),
    /// The in-process track store failed.
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    /// The explanation provider failed.
    #[error("explanation failed: {0}")]
    Explanation(String),
}
