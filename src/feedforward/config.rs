use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Step-size constants of resilient backpropagation.
///
/// Every weight and bias gets its own update value (step size), starting at
/// `initial_step`. It grows by `increase_factor` while the gradient keeps its sign and
/// shrinks by `decrease_factor` when the sign flips, staying within
/// `[min_step, max_step]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpropConfig {
    pub increase_factor: f64,
    pub decrease_factor: f64,
    pub initial_step: f64,
    pub min_step: f64,
    pub max_step: f64,
}

impl Default for RpropConfig {
    fn default() -> Self {
        RpropConfig {
            increase_factor: 1.2,
            decrease_factor: 0.5,
            initial_step: 0.0125,
            min_step: 1e-6,
            max_step: 50.0,
        }
    }
}

impl RpropConfig {
    /// Checks `0 < decrease_factor < 1 < increase_factor` and
    /// `0 < min_step <= initial_step <= max_step`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            self.increase_factor,
            self.decrease_factor,
            self.initial_step,
            self.min_step,
            self.max_step,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::NotFinite);
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(ConfigError::BadDecreaseFactor(self.decrease_factor));
        }
        if self.increase_factor <= 1.0 {
            return Err(ConfigError::BadIncreaseFactor(self.increase_factor));
        }
        if !(self.min_step > 0.0
            && self.min_step <= self.initial_step
            && self.initial_step <= self.max_step)
        {
            return Err(ConfigError::BadStepBounds {
                min: self.min_step,
                initial: self.initial_step,
                max: self.max_step,
            });
        }
        Ok(())
    }
}

/// Stopping rule and progress reporting of the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Training is done once the epoch error divided by the sample count drops to this value.
    pub error_threshold: f64,

    /// Upper bound on epochs. `None` trains until the threshold is reached.
    pub max_epochs: Option<usize>,

    /// Log progress every `report_interval` epochs (0 disables periodic reports).
    pub report_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            error_threshold: 0.05,
            max_epochs: None,
            report_interval: 100,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.error_threshold.is_finite() && self.error_threshold >= 0.0) {
            return Err(ConfigError::BadErrorThreshold(self.error_threshold));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("All Rprop constants must be finite numbers!")]
    NotFinite,
    #[error("Decrease factor must lie in (0, 1), but got {0}!")]
    BadDecreaseFactor(f64),
    #[error("Increase factor must be greater than 1, but got {0}!")]
    BadIncreaseFactor(f64),
    #[error("Step sizes must satisfy 0 < min <= initial <= max, but got min={min}, initial={initial}, max={max}!")]
    BadStepBounds { min: f64, initial: f64, max: f64 },
    #[error("Error threshold must be a non-negative number, but got {0}!")]
    BadErrorThreshold(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(RpropConfig::default().validate(), Ok(()));
        assert_eq!(TrainingConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_factors() {
        let config = RpropConfig {
            increase_factor: 0.5,
            ..RpropConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::BadIncreaseFactor(0.5)));

        let config = RpropConfig {
            decrease_factor: 1.5,
            ..RpropConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::BadDecreaseFactor(1.5)));
    }

    #[test]
    fn rejects_initial_step_outside_bounds() {
        let config = RpropConfig {
            initial_step: 100.0,
            ..RpropConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadStepBounds { .. })
        ));
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config: TrainingConfig = serde_yaml::from_str("max_epochs: 500\n").unwrap();
        assert_eq!(config.max_epochs, Some(500));
        assert_eq!(config.error_threshold, 0.05);
        assert_eq!(config.report_interval, 100);
    }
}
