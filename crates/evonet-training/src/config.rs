//! Run configuration.
//!
//! A [`RunConfig`] is fixed when a run starts, persisted with the run, and
//! read back unchanged when the run is resumed.

use evonet_dataset::{Dataset, Encoding, ProblemDomain};
use evonet_network::{AlleleBounds, LayerSizes, TrainParams, allele::InvalidAlleleBounds};
use serde::{Deserialize, Serialize};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[display("{name} must be at most 100%, got {value}%")]
    Percent { name: &'static str, value: u32 },
    #[display("{name} must be a positive finite number, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[display("{_0}")]
    AlleleBounds(InvalidAlleleBounds),
    #[display("the {split} split of the dataset is empty ({rows} rows, {percent}% validation)")]
    EmptySplit {
        split: &'static str,
        rows: usize,
        percent: u32,
    },
}

/// Per-job back-propagation schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Rows per batch; `0` trains on the whole train split as one batch.
    pub batch_size: usize,
    pub dropout_percent: u32,
    pub epochs: usize,
    /// Back-propagation iterations per batch.
    pub loops_per_batch: usize,
    pub learn_rate: f64,
    pub learn_decay: f64,
    /// Minimum number of seconds between two progress reports of one job.
    pub report_interval_secs: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            batch_size: 100,
            dropout_percent: 0,
            epochs: 2,
            loops_per_batch: 10,
            learn_rate: 0.1,
            learn_decay: 1.0,
            report_interval_secs: 5,
        }
    }
}

impl TrainingParams {
    /// Parameters of one [`Network::train`](evonet_network::Network::train) call.
    #[must_use]
    pub fn train_params(&self) -> TrainParams {
        TrainParams {
            iterations: self.loops_per_batch,
            dropout_percent: self.dropout_percent,
            learn_rate: self.learn_rate,
            learn_decay: self.learn_decay,
        }
    }
}

/// Population and genetic operator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionParams {
    pub population_size: usize,
    /// Number of generations a `train` or `resume` call runs.
    pub evolutions: usize,
    pub swap_percent: u32,
    pub mutate_percent: u32,
    pub allele_min: usize,
    pub allele_max: usize,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        let bounds = AlleleBounds::default();
        Self {
            population_size: 10,
            evolutions: 10,
            swap_percent: 50,
            mutate_percent: 5,
            allele_min: bounds.min(),
            allele_max: bounds.max(),
        }
    }
}

impl EvolutionParams {
    /// Number of elites carried between generations, `max(1, population / 5)`.
    #[must_use]
    pub fn top_k(&self) -> usize {
        (self.population_size / 5).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub domain: ProblemDomain,
    /// Number of problems to generate.
    pub input_quantity: usize,
    /// Hidden width as a multiple of the input bit width.
    pub hidden_factor: usize,
    /// Number of times the input bits are repeated.
    pub input_factor: usize,
    pub validation_percent: u32,
    pub seed: u64,
    pub training: TrainingParams,
    pub evolution: EvolutionParams,
}

impl RunConfig {
    /// A configuration with default parameters.
    #[must_use]
    pub fn new(domain: ProblemDomain, seed: u64) -> Self {
        Self {
            domain,
            input_quantity: 10_000,
            hidden_factor: 2,
            input_factor: 1,
            validation_percent: 10,
            seed,
            training: TrainingParams::default(),
            evolution: EvolutionParams::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero_checks = [
            ("input quantity", self.input_quantity),
            ("hidden factor", self.hidden_factor),
            ("input factor", self.input_factor),
            ("epochs", self.training.epochs),
            ("loops per batch", self.training.loops_per_batch),
            ("population size", self.evolution.population_size),
        ];
        for (name, value) in zero_checks {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        let percent_checks = [
            ("validation percent", self.validation_percent),
            ("dropout percent", self.training.dropout_percent),
            ("swap percent", self.evolution.swap_percent),
            ("mutate percent", self.evolution.mutate_percent),
        ];
        for (name, value) in percent_checks {
            if value > 100 {
                return Err(ConfigError::Percent { name, value });
            }
        }
        if self.training.dropout_percent == 100 {
            return Err(ConfigError::Percent {
                name: "dropout percent",
                value: 100,
            });
        }

        for (name, value) in [
            ("learn rate", self.training.learn_rate),
            ("learn decay", self.training.learn_decay),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        self.allele_bounds()?;
        Ok(())
    }

    pub fn allele_bounds(&self) -> Result<AlleleBounds, ConfigError> {
        AlleleBounds::new(self.evolution.allele_min, self.evolution.allele_max)
            .map_err(ConfigError::AlleleBounds)
    }

    /// Network sizes for a dataset with `encoding`.
    #[must_use]
    pub fn layer_sizes(&self, encoding: &Encoding) -> LayerSizes {
        LayerSizes::new(
            encoding.input_width(),
            encoding.input_bits * self.hidden_factor,
            encoding.output_bits,
        )
    }

    /// Checks that both splits of `dataset` have at least one row.
    pub fn validate_dataset(&self, dataset: &Dataset) -> Result<(), ConfigError> {
        let rows = dataset.len();
        let percent = dataset.validation_percent();
        if dataset.validation().0.nrows() == 0 {
            return Err(ConfigError::EmptySplit {
                split: "validation",
                rows,
                percent,
            });
        }
        if dataset.train().0.nrows() == 0 {
            return Err(ConfigError::EmptySplit {
                split: "train",
                rows,
                percent,
            });
        }
        Ok(())
    }
}
