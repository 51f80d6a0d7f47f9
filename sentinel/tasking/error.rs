use std::time::Duration;

use sentinel_tracking::TrackingError;
use thiserror::Error;

/// Errors surfaced while snapshotting tracks or publishing a plan.
#[derive(Debug, Error)]
pub enum TaskingError {
    /// Reading the track index failed.
    #[error("track snapshot failed: {0}")]
    Snapshot(#[from] TrackingError),
    /// The tasking store could not be reached.
    #[error("tasking publish failed: {0}")]
    Publish(String),
    /// The tasking store answered with a non-success status.
    #[error("tasking store rejected plan with status {0}")]
    Rejected(u16),
    /// The call exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation that stalled.
        operation: &'static str,
        /// Deadline applied.
        timeout: Duration,
    },
}

impl From<reqwest::Error> for TaskingError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Rejected(status.as_u16()),
            None => Self::Publish(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_names_operation_and_deadline() {
        let err = TaskingError::Timeout {
            operation: "publish",
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "publish timed out after 3s");
        let err = TaskingError::from(TrackingError::Storage("index offline".into()));
        assert_eq!(err.to_string(), "track snapshot failed: track store error: index offline");
    }
}
