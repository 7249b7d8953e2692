//! Configuration
//!
//! Engine and environment settings are plain serde structs so that drivers
//! can load them from JSON next to the model description. Every field has a
//! default; an empty object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Stop after this many steps.
    pub max_steps: Option<u64>,

    /// Stop before firing any reaction scheduled after this time.
    pub final_time: Option<f64>,

    /// Worker threads for the parallel update phase. `0` and `1` keep all
    /// updates on the driving thread.
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            final_time: None,
            worker_threads: 1,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Stop after `steps` steps.
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Stop at `time`.
    pub fn with_final_time(mut self, time: f64) -> Self {
        self.final_time = Some(time);
        self
    }

    /// Use `threads` workers for the update phase.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(time) = self.final_time {
            if time.is_nan() || time < 0.0 {
                return Err(ConfigError::Invalid {
                    reason: format!("final_time must be a non-negative time, got {time}"),
                });
            }
        }
        Ok(())
    }

    /// Whether the parallel update phase is enabled.
    pub fn is_parallel(&self) -> bool {
        self.worker_threads > 1
    }
}

/// Settings for the spatial environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Number of coordinates in every position.
    pub dimensions: usize,

    /// Edge length of a spatial index cell.
    pub grid_cell_size: f64,

    /// Entries kept by the range-query cache.
    pub range_cache_capacity: usize,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            dimensions: 2,
            grid_cell_size: 1.0,
            range_cache_capacity: 128,
        }
    }
}

impl EnvironmentConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::Invalid {
                reason: "dimensions must be at least 1".into(),
            });
        }
        if !(self.grid_cell_size.is_finite() && self.grid_cell_size > 0.0) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "grid_cell_size must be positive and finite, got {}",
                    self.grid_cell_size
                ),
            });
        }
        Ok(())
    }
}
