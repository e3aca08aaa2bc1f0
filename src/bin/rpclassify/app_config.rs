use serde::Deserialize;
use std::{fs, path::Path};

use rpclassifier::feedforward::{Activation, RpropConfig, TrainingConfig};

pub const DEFAULT_HIDDEN: [usize; 2] = [100, 50];
pub const DEFAULT_ALPHA: f64 = 0.5;
pub const DEFAULT_INITIAL_STEP: f64 = 0.01;
pub const DEFAULT_MAX_EPOCHS: usize = 100_000;

/// Training settings of the command line tool.
/// Also defines the config file format (every field can be omitted).
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Neuron counts of the hidden layers
    pub hidden: Option<Vec<usize>>,
    pub activation: Option<Activation>,
    /// Rprop constants, missing ones keep their defaults
    #[serde(default)]
    pub rprop: RpropSettings,
    pub error_threshold: Option<f64>,
    /// 0 trains until convergence
    pub max_epochs: Option<usize>,
    pub report_interval: Option<usize>,
    /// Seed of the weight initialization
    pub seed: Option<u64>,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    // merge configs where the second overwrites the first
    pub fn merge(self, other: Self) -> Self {
        Self {
            hidden: other.hidden.or(self.hidden),
            activation: other.activation.or(self.activation),
            rprop: self.rprop.merge(other.rprop),
            error_threshold: other.error_threshold.or(self.error_threshold),
            max_epochs: other.max_epochs.or(self.max_epochs),
            report_interval: other.report_interval.or(self.report_interval),
            seed: other.seed.or(self.seed),
        }
    }

    pub fn hidden(&self) -> Vec<usize> {
        self.hidden
            .clone()
            .unwrap_or_else(|| DEFAULT_HIDDEN.to_vec())
    }

    pub fn activation(&self) -> Activation {
        self.activation
            .unwrap_or(Activation::Sigmoid { alpha: DEFAULT_ALPHA })
    }

    pub fn rprop(&self) -> RpropConfig {
        self.rprop.apply(RpropConfig {
            initial_step: DEFAULT_INITIAL_STEP,
            ..RpropConfig::default()
        })
    }

    pub fn training(&self) -> TrainingConfig {
        let defaults = TrainingConfig::default();
        TrainingConfig {
            error_threshold: self.error_threshold.unwrap_or(defaults.error_threshold),
            max_epochs: match self.max_epochs.unwrap_or(DEFAULT_MAX_EPOCHS) {
                0 => None,
                max => Some(max),
            },
            report_interval: self.report_interval.unwrap_or(defaults.report_interval),
        }
    }
}

/// Rprop constants of a config file or of the command line, each one optional.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpropSettings {
    pub increase_factor: Option<f64>,
    pub decrease_factor: Option<f64>,
    pub initial_step: Option<f64>,
    pub min_step: Option<f64>,
    pub max_step: Option<f64>,
}

impl RpropSettings {
    // merge settings where the second overwrites the first
    pub fn merge(self, other: Self) -> Self {
        Self {
            increase_factor: other.increase_factor.or(self.increase_factor),
            decrease_factor: other.decrease_factor.or(self.decrease_factor),
            initial_step: other.initial_step.or(self.initial_step),
            min_step: other.min_step.or(self.min_step),
            max_step: other.max_step.or(self.max_step),
        }
    }

    /// Fills the unset constants from `base`.
    pub fn apply(&self, base: RpropConfig) -> RpropConfig {
        RpropConfig {
            increase_factor: self.increase_factor.unwrap_or(base.increase_factor),
            decrease_factor: self.decrease_factor.unwrap_or(base.decrease_factor),
            initial_step: self.initial_step.unwrap_or(base.initial_step),
            min_step: self.min_step.unwrap_or(base.min_step),
            max_step: self.max_step.unwrap_or(base.max_step),
        }
    }
}

/// Name of a training run, e.g. `rprop-4-100-50-3-0_01-0_5`.
pub fn run_name(geometry: &[usize], rprop: &RpropConfig, activation: &Activation) -> String {
    let layers: Vec<String> = geometry.iter().map(usize::to_string).collect();
    format!(
        "rprop-{}-{}-{}",
        layers.join("-"),
        rprop.initial_step,
        activation.alpha()
    )
    .replace('.', "_")
}
