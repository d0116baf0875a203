//! Toy estimator and evaluators shared by the unit tests.

use ht_types::{
    ConfigurationError, Dataset, EvaluationError, Estimator, Evaluator, Instance, Point,
    Prediction, Predictor, Statistic, Statistics,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::setup::SetterRegistry;

/// Records the size of every dataset a [`ToyModel`] was fitted on.
#[derive(Debug, Clone, Default)]
pub struct FitLog(Arc<Mutex<Vec<usize>>>);

impl FitLog {
    pub fn lengths(&self) -> Vec<usize> {
        self.0.lock().clone()
    }
}

impl PartialEq for FitLog {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToyModel {
    pub x: f64,
    pub y: f64,
    pub mode: String,
    pub filter: Option<i64>,
    pub verbose: bool,
    pub fits: FitLog,
}

impl ToyModel {
    pub fn with_fit_log() -> (Self, FitLog) {
        let model = Self::default();
        let log = model.fits.clone();
        (model, log)
    }
}

pub struct ToyFitted {
    pub x: f64,
    pub y: f64,
}

impl Predictor for ToyFitted {
    fn predict(&self, features: &[f64]) -> Result<Prediction, EvaluationError> {
        let first = features.first().copied().unwrap_or(0.0);
        Ok(Prediction::Value(self.x * first + self.y))
    }
}

impl Estimator for ToyModel {
    type Model = ToyFitted;

    fn fit(&self, data: &Dataset) -> Result<ToyFitted, EvaluationError> {
        if data.is_empty() {
            return Err(EvaluationError::EmptyDataset);
        }
        self.fits.0.lock().push(data.len());
        Ok(ToyFitted {
            x: self.x,
            y: self.y,
        })
    }
}

pub fn registry() -> SetterRegistry<ToyModel> {
    SetterRegistry::new()
        .float("x", |m: &mut ToyModel, v| m.x = v)
        .float("y", |m: &mut ToyModel, v| m.y = v)
        .text("mode", |m: &mut ToyModel, v| {
            m.mode = v.to_string();
            Ok(())
        })
        .with("filter.components", |m: &mut ToyModel, value| {
            let filter = m
                .filter
                .as_mut()
                .ok_or_else(|| ConfigurationError::MissingComponent {
                    path: "filter.components".to_string(),
                })?;
            *filter = value.as_i64().unwrap_or_default();
            Ok(())
        })
}

/// Labels follow `2 * i + 1`.
pub fn ramp_data(n: usize) -> Dataset {
    let instances = (0..n)
        .map(|i| Instance::labeled(vec![i as f64], 2.0 * i as f64 + 1.0))
        .collect();
    Dataset::new("ramp", instances)
}

fn quadratic(x: f64, y: f64, optimum: (f64, f64)) -> f64 {
    -(x - optimum.0).powi(2) - (y - optimum.1).powi(2)
}

/// Score of a two-dimensional point under [`QuadraticEvaluator`]; peaks at (3, 3).
pub fn quadratic_score(point: &Point) -> f64 {
    let coord = |i| point.value(i).and_then(|v| v.as_f64()).unwrap_or(0.0);
    quadratic(coord(0), coord(1), (3.0, 3.0))
}

/// Reports CC as a downward parabola around (3, 3).
#[derive(Debug, Default)]
pub struct QuadraticEvaluator {
    evaluations: AtomicUsize,
    scored: AtomicUsize,
    coarse_optimum: Option<(f64, f64)>,
}

impl QuadraticEvaluator {
    /// Cross-validation with 2 folds or fewer peaks at `(x, y)` instead.
    pub fn with_coarse_optimum(x: f64, y: f64) -> Self {
        Self {
            coarse_optimum: Some((x, y)),
            ..Self::default()
        }
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn scored(&self) -> usize {
        self.scored.load(Ordering::SeqCst)
    }
}

impl Evaluator<ToyModel> for QuadraticEvaluator {
    fn cross_validate(
        &self,
        estimator: &ToyModel,
        _data: &Dataset,
        folds: usize,
        _seed: u64,
    ) -> Result<Statistics, EvaluationError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let optimum = match self.coarse_optimum {
            Some(coarse) if folds <= 2 => coarse,
            _ => (3.0, 3.0),
        };
        Ok(Statistics::new().with(
            Statistic::CorrelationCoefficient,
            quadratic(estimator.x, estimator.y, optimum),
        ))
    }

    fn score(&self, model: &ToyFitted, _data: &Dataset) -> Result<Statistics, EvaluationError> {
        self.scored.fetch_add(1, Ordering::SeqCst);
        Ok(Statistics::new().with(
            Statistic::CorrelationCoefficient,
            quadratic(model.x, model.y, (3.0, 3.0)),
        ))
    }
}

/// Reports the same CC for every configuration.
#[derive(Debug)]
pub struct ConstantEvaluator(pub f64);

impl Evaluator<ToyModel> for ConstantEvaluator {
    fn cross_validate(
        &self,
        _estimator: &ToyModel,
        _data: &Dataset,
        _folds: usize,
        _seed: u64,
    ) -> Result<Statistics, EvaluationError> {
        Ok(Statistics::new().with(Statistic::CorrelationCoefficient, self.0))
    }

    fn score(&self, _model: &ToyFitted, _data: &Dataset) -> Result<Statistics, EvaluationError> {
        Ok(Statistics::new().with(Statistic::CorrelationCoefficient, self.0))
    }
}

/// Like [`QuadraticEvaluator`], but training fails at one point.
#[derive(Debug)]
pub struct FailingEvaluator {
    x: f64,
    y: f64,
}

impl FailingEvaluator {
    pub fn at(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn check(&self, x: f64, y: f64) -> Result<Statistics, EvaluationError> {
        if x == self.x && y == self.y {
            return Err(EvaluationError::TrainingFailed {
                message: format!("singular matrix at x={x}, y={y}"),
            });
        }
        Ok(Statistics::new().with(
            Statistic::CorrelationCoefficient,
            quadratic(x, y, (3.0, 3.0)),
        ))
    }
}

impl Evaluator<ToyModel> for FailingEvaluator {
    fn cross_validate(
        &self,
        estimator: &ToyModel,
        _data: &Dataset,
        _folds: usize,
        _seed: u64,
    ) -> Result<Statistics, EvaluationError> {
        self.check(estimator.x, estimator.y)
    }

    fn score(&self, model: &ToyFitted, _data: &Dataset) -> Result<Statistics, EvaluationError> {
        self.check(model.x, model.y)
    }
}

#[derive(Debug)]
pub struct PanickingEvaluator;

impl Evaluator<ToyModel> for PanickingEvaluator {
    fn cross_validate(
        &self,
        _estimator: &ToyModel,
        _data: &Dataset,
        _folds: usize,
        _seed: u64,
    ) -> Result<Statistics, EvaluationError> {
        panic!("evaluator exploded")
    }

    fn score(&self, _model: &ToyFitted, _data: &Dataset) -> Result<Statistics, EvaluationError> {
        panic!("evaluator exploded")
    }
}
