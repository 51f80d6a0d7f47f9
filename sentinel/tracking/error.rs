use thiserror::Error;

use crate::validation::ValidationFlag;

/// Errors surfaced by track ingestion and storage.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The observation failed the pre-fusion sanity check.
    #[error("observation for {object_id} rejected: {}", join_flags(.flags))]
    Rejected {
        /// Object the observation referred to.
        object_id: String,
        /// Every flag raised.
        flags: Vec<ValidationFlag>,
    },
    /// Backing store failure.
    #[error("track store error: {0}")]
    Storage(String),
    /// A stored record could not be encoded or decoded.
    #[error("track record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    /// Filesystem failure in a journal-backed store.
    #[error("track journal io failed: {0}")]
    Io(#[from] std::io::Error),
}

fn join_flags(flags: &[ValidationFlag]) -> String {
    flags
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_lists_every_flag() {
        let err = TrackingError::Rejected {
            object_id: "obj-009".into(),
            flags: vec![
                ValidationFlag::PositionOutOfBounds,
                ValidationFlag::SignedMissingSignature,
            ],
        };
        assert_eq!(
            err.to_string(),
            "observation for obj-009 rejected: position_out_of_bounds, signed_missing_signature"
        );
    }
}
