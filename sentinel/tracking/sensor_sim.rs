use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::{json, Map, Value};

use crate::model::{Integrity, Observation};

const MIN_RATE_HZ: f64 = 0.2;
const MAX_RATE_HZ: f64 = 10.0;

/// Synthetic sensor emitting observations of a fixed pool of objects.
///
/// Object selection uses one seeded generator; each object's measurements come from
/// its own generator derived from the seed, so runs with the same seed are identical.
#[derive(Debug)]
pub struct SensorSimulator {
    sensor_id: String,
    sensor_type: String,
    object_pool: u32,
    seed: u64,
    rate_hz: f64,
    sequence: u64,
    picker: SmallRng,
    generators: HashMap<u32, SmallRng>,
}

impl SensorSimulator {
    /// Creates a simulator for `object_pool` objects (`obj-001` ...).
    #[must_use]
    pub fn new(
        sensor_id: impl Into<String>,
        sensor_type: impl Into<String>,
        object_pool: u32,
        seed: u64,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type: sensor_type.into(),
            object_pool: object_pool.max(1),
            seed,
            rate_hz: 1.5,
            sequence: 0,
            picker: SmallRng::seed_from_u64(seed),
            generators: HashMap::new(),
        }
    }

    /// Current emission rate.
    #[must_use]
    pub const fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    /// Applies a recommended collection rate, clamped to [0.2, 10] Hz.
    pub fn apply_tasking(&mut self, rate_hz: f64) -> f64 {
        if rate_hz.is_finite() {
            self.rate_hz = rate_hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ);
        }
        self.rate_hz
    }

    /// Delay between two emissions at the current rate.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz.max(0.1))
    }

    /// Produces the next observation stamped with `now`.
    pub fn next_observation(&mut self, now: DateTime<Utc>) -> Observation {
        let index = self.picker.gen_range(1..=self.object_pool);
        self.sequence += 1;
        let seed = self.seed;
        let rng = self
            .generators
            .entry(index)
            .or_insert_with(|| SmallRng::seed_from_u64(object_seed(seed, index)));

        let measurement = json!({
            "x_km": rng.gen_range(-20_000.0..20_000.0),
            "y_km": rng.gen_range(-20_000.0..20_000.0),
            "z_km": rng.gen_range(-20_000.0..20_000.0),
            "vx_kms": rng.gen_range(-2.0..2.0),
            "vy_kms": rng.gen_range(-2.0..2.0),
            "vz_kms": rng.gen_range(-2.0..2.0),
        });
        let quality = json!({
            "snr_db": round2(rng.gen_range(5.0..25.0)),
            "measurement_sigma": round2(rng.gen_range(0.1..1.0)),
        });

        Observation {
            event_id: format!(
                "evt-{}-{}-{}",
                self.sensor_id,
                now.timestamp_millis(),
                self.sequence
            ),
            sensor_id: self.sensor_id.clone(),
            sensor_type: self.sensor_type.clone(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            object_id: format!("obj-{index:03}"),
            measurement: into_map(measurement),
            quality: into_map(quality),
            integrity: Some(Integrity {
                signed: true,
                signature: Some(format!("sim-{}", self.sensor_id)),
            }),
        }
    }
}

fn object_seed(seed: u64, index: u32) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ u64::from(index)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ObservationValidator;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = SensorSimulator::new("radar-1", "radar", 25, 7);
        let mut b = SensorSimulator::new("radar-1", "radar", 25, 7);
        for _ in 0..20 {
            assert_eq!(a.next_observation(now()), b.next_observation(now()));
        }
    }

    #[test]
    fn observations_pass_validation() {
        let mut sim = SensorSimulator::new("optical-1", "optical", 5, 11);
        let validator = ObservationValidator::default();
        for _ in 0..50 {
            let obs = sim.next_observation(now());
            assert!(validator.validate(&obs).is_empty(), "{obs:?}");
            let idx: u32 = obs.object_id.trim_start_matches("obj-").parse().unwrap();
            assert!((1..=5).contains(&idx));
            assert_eq!(obs.timestamp, "2025-03-01T12:00:00Z");
        }
    }

    #[test]
    fn tasking_rate_is_clamped() {
        let mut sim = SensorSimulator::new("space-1", "space", 3, 1);
        assert!((sim.rate_hz() - 1.5).abs() < f64::EPSILON);
        assert!((sim.apply_tasking(50.0) - 10.0).abs() < f64::EPSILON);
        assert!((sim.apply_tasking(0.0) - 0.2).abs() < f64::EPSILON);
        assert!((sim.apply_tasking(f64::NAN) - 0.2).abs() < f64::EPSILON);
        sim.apply_tasking(4.0);
        assert_eq!(sim.period(), Duration::from_millis(250));
    }
}
