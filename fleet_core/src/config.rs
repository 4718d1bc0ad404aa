//! Runtime configuration.
//!
//! Every section has a `Default` matching production behaviour, so a config
//! file only needs the values it overrides:
//!
//! ```json
//! { "scheduler": { "tick_interval_ms": 500 }, "status": { "resume_at": 80.0 } }
//! ```

use crate::navigation::EnergyModel;
use crate::scheduler::{SchedulerConfig, SpeedMultiplier};
use crate::status::StatusPolicy;
use crate::store::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for a fleet process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub scheduler: SchedulerConfig,
    pub pool: PoolConfig,
    pub energy: EnergyModel,
    pub status: StatusPolicy,
}

impl FleetConfig {
    /// Loads a JSON config file and validates it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: FleetConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        if SpeedMultiplier::new(self.scheduler.initial_multiplier).is_none() {
            return Err(ConfigError::Invalid(format!(
                "initial_multiplier {} outside [0.1, 10.0]",
                self.scheduler.initial_multiplier
            )));
        }
        if !self.pool.is_consistent() {
            return Err(ConfigError::Invalid("pool limits must be positive".into()));
        }
        if !self.energy.is_consistent() {
            return Err(ConfigError::Invalid("energy rates must be non-negative and ordered".into()));
        }
        if !self.status.is_consistent() {
            return Err(ConfigError::Invalid(format!(
                "charge_below {} must sit below resume_at {}",
                self.status.charge_below, self.status.resume_at
            )));
        }
        Ok(())
    }
}
