use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::policy::{default_roster, SensorClass, TaskingPolicyEngine};

/// Optimizer settings, typically loaded from `optimizer.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Delay between ticks in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Deadline for each snapshot read and each publish.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Maximum tracks read per tick; further tracks are ignored.
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,
    /// Remote tasking service; absent means publish in-process only.
    #[serde(default)]
    pub tasking_url: Option<String>,
    /// Bearer token presented to the tasking service.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Sensors that receive a rate, keyed by id.
    #[serde(default = "default_roster")]
    pub sensors: IndexMap<String, SensorClass>,
}

impl OptimizerConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading optimizer config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            bail!("interval_ms must be positive");
        }
        if self.call_timeout_ms == 0 {
            bail!("call_timeout_ms must be positive");
        }
        if self.snapshot_limit == 0 {
            bail!("snapshot_limit must be positive");
        }
        if self.sensors.keys().any(|id| id.trim().is_empty()) {
            bail!("sensor ids must not be empty");
        }
        Ok(())
    }

    /// Tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Per-call deadline.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Policy engine for the configured roster.
    #[must_use]
    pub fn engine(&self) -> TaskingPolicyEngine {
        TaskingPolicyEngine::new(self.sensors.clone())
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            snapshot_limit: default_snapshot_limit(),
            tasking_url: None,
            auth_token: None,
            sensors: default_roster(),
        }
    }
}

const fn default_interval_ms() -> u64 {
    5_000
}

const fn default_call_timeout_ms() -> u64 {
    3_000
}

const fn default_snapshot_limit() -> usize {
    200
}
