//! Timing and probability parameters of the simulated workflow.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ValidationError;

/// Inclusive range of seconds a phase waits before moving on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    /// Shortest wait in seconds
    pub min_secs: f64,
    /// Longest wait in seconds
    pub max_secs: f64,
}

impl DelayRange {
    /// Range between two bounds, in seconds
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Fixed wait, in seconds
    pub const fn fixed(secs: f64) -> Self {
        Self::new(secs, secs)
    }

    /// Draw a wait uniformly from the range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = if self.max_secs > self.min_secs {
            rng.random_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn validate(&self, name: &str) -> Result<(), ValidationError> {
        if !(self.min_secs >= 0.0 && self.max_secs >= self.min_secs && self.max_secs.is_finite()) {
            return Err(ValidationError::InvalidValue {
                field: name.to_string(),
                reason: format!(
                    "expected 0 <= min <= max, got {}..{}",
                    self.min_secs, self.max_secs
                ),
            });
        }
        Ok(())
    }
}

/// Work-process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Wait of the `getting_ready` phase
    pub getting_ready_delay: DelayRange,
    /// Wait of the `load_eggs` phase
    pub load_eggs_delay: DelayRange,
    /// Wait of the `ready_to_process` phase
    pub ready_to_process_delay: DelayRange,
    /// Eggs inspected per second
    pub egg_processing_rate: f64,
    /// Probability that an egg passes inspection
    pub success_rate: f64,
    /// A progress event is emitted every this many eggs
    pub progress_interval: u32,
    /// Egg count used when a start request names none
    pub default_egg_count: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            getting_ready_delay: DelayRange::new(2.0, 3.0),
            load_eggs_delay: DelayRange::new(3.0, 4.0),
            ready_to_process_delay: DelayRange::fixed(1.0),
            egg_processing_rate: 0.8,
            success_rate: 0.95,
            progress_interval: 3,
            default_egg_count: 10,
        }
    }
}

impl ProcessConfig {
    /// Time spent on a single egg
    pub fn egg_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.egg_processing_rate)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.getting_ready_delay.validate("getting_ready_delay")?;
        self.load_eggs_delay.validate("load_eggs_delay")?;
        self.ready_to_process_delay
            .validate("ready_to_process_delay")?;

        if !(self.egg_processing_rate > 0.0 && self.egg_processing_rate.is_finite()) {
            return Err(ValidationError::InvalidValue {
                field: "egg_processing_rate".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(ValidationError::InvalidValue {
                field: "success_rate".to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }
        if self.progress_interval == 0 {
            return Err(ValidationError::InvalidValue {
                field: "progress_interval".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.default_egg_count == 0 {
            return Err(ValidationError::InvalidValue {
                field: "default_egg_count".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
