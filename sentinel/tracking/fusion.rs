use indexmap::IndexSet;

use crate::model::{Observation, SourceRef, Track};

/// Weight given to a new observation when blending into an existing estimate.
pub const BLEND_WEIGHT: f64 = 0.35;
/// Confidence assigned to a track created from its first observation.
pub const INITIAL_CONFIDENCE: f64 = 0.6;
/// Confidence gained per fused observation.
pub const CONFIDENCE_STEP: f64 = 0.02;
/// Upper bound on confidence.
pub const CONFIDENCE_CAP: f64 = 0.99;
/// Number of contributing sources retained per track.
pub const MAX_SOURCES: usize = 10;
/// Flag set on every newly created track.
pub const INITIAL_FLAG: &str = "OK";

/// Merges `observation` into `previous`, producing the updated track.
///
/// Never fails: unusable measurement fields read as 0.0. Flags are set when the track
/// is created and carried over unchanged afterwards.
#[must_use]
pub fn fuse(previous: Option<&Track>, observation: &Observation) -> Track {
    let measured = observation.measured_state();
    let source = SourceRef {
        sensor_id: observation.sensor_id.clone(),
        timestamp: observation.timestamp.clone(),
    };
    let (state, confidence, sources, flags) = match previous {
        None => (
            measured,
            INITIAL_CONFIDENCE,
            vec![source],
            initial_flags(),
        ),
        Some(previous) => (
            previous.state.blend(&measured, BLEND_WEIGHT),
            (previous.confidence + CONFIDENCE_STEP).min(CONFIDENCE_CAP),
            retain_sources(&previous.sources, source),
            if previous.flags.is_empty() {
                initial_flags()
            } else {
                previous.flags.clone()
            },
        ),
    };
    Track {
        track_id: Track::id_for(&observation.object_id),
        object_id: observation.object_id.clone(),
        last_update: observation.timestamp.clone(),
        state,
        confidence: round3(confidence),
        sources,
        flags,
    }
}

fn retain_sources(previous: &[SourceRef], latest: SourceRef) -> Vec<SourceRef> {
    let keep_from = previous.len().saturating_sub(MAX_SOURCES - 1);
    let mut sources = Vec::with_capacity(MAX_SOURCES);
    sources.extend_from_slice(&previous[keep_from..]);
    sources.push(latest);
    sources
}

fn initial_flags() -> IndexSet<String> {
    IndexSet::from([INITIAL_FLAG.to_string()])
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
