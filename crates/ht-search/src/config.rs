//! Search configuration.

use ht_types::{validation_error, Statistic, TuneResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dimension::ParameterDimension;

/// Top-level configuration for a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Statistic used to rank configurations.
    pub statistic: Statistic,

    /// The tunable dimensions, in point order.
    pub dimensions: Vec<ParameterDimension>,

    /// Folds for the initial space; below 2 means train-then-score on the same data.
    pub initial_folds: usize,

    /// Folds for the refinement sub-spaces.
    pub subsequent_folds: usize,

    /// Share of the training data (in percent) the search rounds work on.
    pub sample_percent: f64,

    /// Worker-pool width; 1 runs evaluations sequentially.
    pub execution_slots: usize,

    /// Half-width of the neighborhood explored around each center.
    pub neighborhood_radius: usize,

    /// Seed for subsampling and cross-validation.
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            statistic: Statistic::CorrelationCoefficient,
            dimensions: Vec::new(),
            initial_folds: 2,
            subsequent_folds: 10,
            sample_percent: 100.0,
            execution_slots: 1,
            neighborhood_radius: 1,
            seed: 1,
        }
    }
}

impl SearchConfig {
    pub fn new(dimensions: Vec<ParameterDimension>) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> TuneResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> TuneResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> TuneResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_dimension(mut self, dimension: ParameterDimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    /// Selects the statistic by short code, e.g. `"RMSE"`.
    pub fn with_statistic_name(mut self, name: &str) -> TuneResult<Self> {
        self.statistic = name.parse()?;
        Ok(self)
    }

    pub fn with_folds(mut self, initial: usize, subsequent: usize) -> Self {
        self.initial_folds = initial;
        self.subsequent_folds = subsequent;
        self
    }

    pub fn with_sample_percent(mut self, percent: f64) -> Self {
        self.sample_percent = percent;
        self
    }

    pub fn with_execution_slots(mut self, slots: usize) -> Self {
        self.execution_slots = slots;
        self
    }

    pub fn with_neighborhood_radius(mut self, radius: usize) -> Self {
        self.neighborhood_radius = radius;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> TuneResult<()> {
        if self.dimensions.is_empty() {
            return Err(validation_error!("No search dimensions configured"));
        }
        if self.execution_slots == 0 {
            return Err(validation_error!("Execution slots must be at least 1"));
        }
        if !(self.sample_percent > 0.0 && self.sample_percent <= 100.0) {
            return Err(validation_error!(
                "Sample percentage must be in (0, 100], got {}",
                self.sample_percent
            ));
        }
        if self.neighborhood_radius == 0 {
            return Err(validation_error!("Neighborhood radius must be at least 1"));
        }
        for dimension in &self.dimensions {
            dimension.validate()?;
        }
        Ok(())
    }
}
