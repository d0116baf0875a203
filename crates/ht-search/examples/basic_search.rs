//! Tunes a small k-nearest-neighbour regressor on a noisy sine curve.
//!
//! Run with `RUST_LOG=debug` to see the per-round tables.

use anyhow::Result;
use ht_search::{HillClimbSearch, ParameterDimension, SearchConfig, SetterRegistry};
use ht_types::{
    Dataset, EvaluationError, Estimator, Evaluator, Instance, Prediction, Predictor, Statistic,
    Statistics,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct KnnRegressor {
    k: usize,
    smoothing: f64,
}

struct FittedKnn {
    k: usize,
    smoothing: f64,
    points: Vec<(f64, f64)>,
}

impl Predictor for FittedKnn {
    fn predict(&self, features: &[f64]) -> Result<Prediction, EvaluationError> {
        let x = features.first().copied().ok_or_else(|| EvaluationError::ScoringFailed {
            message: "instance has no features".to_string(),
        })?;

        let mut neighbours: Vec<(f64, f64)> = self
            .points
            .iter()
            .map(|&(px, label)| ((px - x).abs(), label))
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (weighted, total) = neighbours
            .iter()
            .take(self.k)
            .fold((0.0, 0.0), |(sum, weights), &(distance, label)| {
                let w = 1.0 / (distance + self.smoothing);
                (sum + w * label, weights + w)
            });
        Ok(Prediction::Value(weighted / total))
    }
}

impl Estimator for KnnRegressor {
    type Model = FittedKnn;

    fn fit(&self, data: &Dataset) -> Result<FittedKnn, EvaluationError> {
        if data.is_empty() {
            return Err(EvaluationError::EmptyDataset);
        }
        let points = data
            .instances()
            .iter()
            .filter_map(|i| Some((*i.features.first()?, i.label?)))
            .collect();
        Ok(FittedKnn {
            k: self.k.max(1),
            smoothing: self.smoothing,
            points,
        })
    }
}

/// Plain k-fold cross-validation reporting the regression statistics.
struct RegressionEvaluator;

impl RegressionEvaluator {
    fn statistics(pairs: &[(f64, f64)]) -> Statistics {
        let n = pairs.len() as f64;
        let mean_actual = pairs.iter().map(|p| p.1).sum::<f64>() / n;
        let mean_predicted = pairs.iter().map(|p| p.0).sum::<f64>() / n;

        let mut squared = 0.0;
        let mut absolute = 0.0;
        let mut covariance = 0.0;
        let mut var_predicted = 0.0;
        let mut var_actual = 0.0;
        for &(predicted, actual) in pairs {
            squared += (predicted - actual).powi(2);
            absolute += (predicted - actual).abs();
            covariance += (predicted - mean_predicted) * (actual - mean_actual);
            var_predicted += (predicted - mean_predicted).powi(2);
            var_actual += (actual - mean_actual).powi(2);
        }

        Statistics::new()
            .with(Statistic::RootMeanSquaredError, (squared / n).sqrt())
            .with(Statistic::MeanAbsoluteError, absolute / n)
            .with(
                Statistic::CorrelationCoefficient,
                covariance / (var_predicted * var_actual).sqrt(),
            )
    }

    fn predict_all(model: &FittedKnn, data: &Dataset) -> Result<Vec<(f64, f64)>, EvaluationError> {
        let mut pairs = Vec::with_capacity(data.len());
        for instance in data.instances() {
            if let (Prediction::Value(p), Some(actual)) =
                (model.predict(&instance.features)?, instance.label)
            {
                pairs.push((p, actual));
            }
        }
        Ok(pairs)
    }
}

impl Evaluator<KnnRegressor> for RegressionEvaluator {
    fn cross_validate(
        &self,
        estimator: &KnnRegressor,
        data: &Dataset,
        folds: usize,
        seed: u64,
    ) -> Result<Statistics, EvaluationError> {
        let fold_of = |i: usize| (i + seed as usize) % folds;
        let mut pairs = Vec::with_capacity(data.len());
        for fold in 0..folds {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..data.len()).partition(|&i| fold_of(i) == fold);
            let model = estimator.fit(&data.subset(&train))?;
            pairs.extend(Self::predict_all(&model, &data.subset(&test))?);
        }
        Ok(Self::statistics(&pairs))
    }

    fn score(&self, model: &FittedKnn, data: &Dataset) -> Result<Statistics, EvaluationError> {
        Ok(Self::statistics(&Self::predict_all(model, data)?))
    }
}

fn noisy_sine(n: usize) -> Dataset {
    let instances = (0..n)
        .map(|i| {
            let x = i as f64 / n as f64 * std::f64::consts::TAU;
            let noise = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
            Instance::labeled(vec![x], x.sin() + 0.3 * noise)
        })
        .collect();
    Dataset::new("noisy-sine", instances)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let setters = SetterRegistry::new()
        .int("k", |m: &mut KnnRegressor, v| m.k = v.max(1) as usize)
        .float("smoothing", |m: &mut KnnRegressor, v| m.smoothing = v);

    let config = SearchConfig::new(vec![
        ParameterDimension::integer("k", 1, 20),
        ParameterDimension::power("smoothing", 2.0, -6, 2),
    ])
    .with_statistic_name("RMSE")?
    .with_folds(3, 5)
    .with_execution_slots(4);

    let template = KnnRegressor {
        k: 5,
        smoothing: 1.0,
    };
    let search = HillClimbSearch::new(template, setters, RegressionEvaluator, config);

    let tuned = search.search(&noisy_sine(200))?;
    info!("Search finished after {} rounds", tuned.report().rounds.len());
    println!("{tuned}");

    if let Prediction::Value(y) = tuned.predict(&[std::f64::consts::FRAC_PI_2])? {
        println!("prediction at pi/2: {y:.3}");
    }
    println!("{}", tuned.report().to_json()?);
    Ok(())
}
