use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::model::{Observation, STATE_FIELDS};

/// Reason an observation failed the pre-fusion sanity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFlag {
    /// A state field is absent from the measurement.
    MissingMeasurement(&'static str),
    /// Some |x|, |y|, |z| exceeds the position limit.
    PositionOutOfBounds,
    /// Some velocity component exceeds the velocity limit.
    VelocityOutOfBounds,
    /// A measurement field is present but not numeric.
    NonNumericMeasurement,
    /// Integrity claims a signature but carries none.
    SignedMissingSignature,
}

impl fmt::Display for ValidationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMeasurement(field) => write!(f, "missing_measurement_{field}"),
            Self::PositionOutOfBounds => f.write_str("position_out_of_bounds"),
            Self::VelocityOutOfBounds => f.write_str("velocity_out_of_bounds"),
            Self::NonNumericMeasurement => f.write_str("non_numeric_measurement"),
            Self::SignedMissingSignature => f.write_str("signed_missing_signature"),
        }
    }
}

impl Serialize for ValidationFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Minimal physical-plausibility checks run before an observation is fused.
#[derive(Debug, Clone, Copy)]
pub struct ObservationValidator {
    position_limit_km: f64,
    velocity_limit_kms: f64,
}

impl ObservationValidator {
    /// Creates a validator with explicit limits.
    #[must_use]
    pub const fn new(position_limit_km: f64, velocity_limit_kms: f64) -> Self {
        Self {
            position_limit_km,
            velocity_limit_kms,
        }
    }

    /// Returns every flag raised by `observation`; empty means valid.
    #[must_use]
    pub fn validate(&self, observation: &Observation) -> Vec<ValidationFlag> {
        let measurement = &observation.measurement;
        let mut flags: Vec<ValidationFlag> = STATE_FIELDS
            .into_iter()
            .filter(|field| !measurement.contains_key(*field))
            .map(ValidationFlag::MissingMeasurement)
            .collect();

        let mut values = [0.0; 6];
        let mut numeric = true;
        for (slot, field) in values.iter_mut().zip(STATE_FIELDS) {
            match measurement.get(field).map(strict_f64) {
                None => {}
                Some(Some(value)) => *slot = value,
                Some(None) => numeric = false,
            }
        }
        if numeric {
            let [x, y, z, vx, vy, vz] = values;
            if [x, y, z].iter().any(|v| v.abs() > self.position_limit_km) {
                flags.push(ValidationFlag::PositionOutOfBounds);
            }
            if [vx, vy, vz].iter().any(|v| v.abs() > self.velocity_limit_kms) {
                flags.push(ValidationFlag::VelocityOutOfBounds);
            }
        } else {
            flags.push(ValidationFlag::NonNumericMeasurement);
        }

        if let Some(integrity) = &observation.integrity {
            let unsigned = integrity
                .signature
                .as_deref()
                .map_or(true, |sig| sig.trim().is_empty());
            if integrity.signed && unsigned {
                flags.push(ValidationFlag::SignedMissingSignature);
            }
        }
        flags
    }
}

impl Default for ObservationValidator {
    fn default() -> Self {
        Self::new(50_000.0, 20.0)
    }
}

fn strict_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        Value::Bool(flag) => Some(f64::from(u8::from(*flag))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Integrity;
    use serde_json::json;

    fn observation(measurement: Value, integrity: Option<Integrity>) -> Observation {
        Observation {
            event_id: "evt-1".into(),
            sensor_id: "radar-1".into(),
            sensor_type: "radar".into(),
            timestamp: "2025-03-01T12:00:00Z".into(),
            object_id: "obj-001".into(),
            measurement: measurement.as_object().cloned().unwrap_or_default(),
            quality: serde_json::Map::new(),
            integrity,
        }
    }

    #[test]
    fn accepts_plausible_observation() {
        let obs = observation(
            json!({ "x_km": 7000.0, "y_km": -12.0, "z_km": 400.0, "vx_kms": 7.5, "vy_kms": 0.0, "vz_kms": -0.1 }),
            Some(Integrity {
                signed: true,
                signature: Some("sig".into()),
            }),
        );
        assert!(ObservationValidator::default().validate(&obs).is_empty());
    }

    #[test]
    fn reports_missing_fields_and_bounds_together() {
        let obs = observation(
            json!({ "x_km": 60_000.0, "y_km": 0.0, "z_km": 0.0, "vx_kms": 25.0 }),
            Some(Integrity {
                signed: true,
                signature: None,
            }),
        );
        let flags: Vec<String> = ObservationValidator::default()
            .validate(&obs)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            flags,
            vec![
                "missing_measurement_vy_kms",
                "missing_measurement_vz_kms",
                "position_out_of_bounds",
                "velocity_out_of_bounds",
                "signed_missing_signature",
            ]
        );
    }

    #[test]
    fn non_numeric_values_skip_bound_checks() {
        let obs = observation(
            json!({ "x_km": "far", "y_km": 0, "z_km": 0, "vx_kms": 99, "vy_kms": 0, "vz_kms": 0 }),
            None,
        );
        assert_eq!(
            ObservationValidator::default().validate(&obs),
            vec![ValidationFlag::NonNumericMeasurement]
        );
    }

    #[test]
    fn flags_serialize_as_names() {
        let encoded = serde_json::to_string(&ValidationFlag::MissingMeasurement("z_km")).unwrap();
        assert_eq!(encoded, "\"missing_measurement_z_km\"");
    }
}
