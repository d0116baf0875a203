//! Contracts for the wrapped model and the evaluation oracle.
//!
//! The search engine never looks inside a model: it clones a configured
//! [`Estimator`], asks an [`Evaluator`] to score it, and finally fits the
//! winning configuration to obtain a [`Predictor`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dataset::Dataset;
use crate::errors::EvaluationError;
use crate::statistic::Statistics;

/// Output of a trained model for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Prediction {
    /// Numeric prediction (regression) or class index.
    Value(f64),
    /// Probability per class label.
    Distribution(Vec<f64>),
}

/// A trained model.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &[f64]) -> Result<Prediction, EvaluationError>;
}

/// A model configuration that can be trained on labeled data.
///
/// `Clone` provides the deep copy each evaluation task works on.
pub trait Estimator: Clone + Send + Sync + fmt::Debug {
    type Model: Predictor;

    fn fit(&self, data: &Dataset) -> Result<Self::Model, EvaluationError>;

    /// Human-readable description for logs and summaries.
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// Scores estimator configurations.
pub trait Evaluator<E: Estimator>: Send + Sync {
    /// Cross-validate `estimator` on `data` with `folds` partitions (`folds >= 2`).
    fn cross_validate(
        &self,
        estimator: &E,
        data: &Dataset,
        folds: usize,
        seed: u64,
    ) -> Result<Statistics, EvaluationError>;

    /// Score an already trained model on `data`.
    fn score(&self, model: &E::Model, data: &Dataset) -> Result<Statistics, EvaluationError>;
}
