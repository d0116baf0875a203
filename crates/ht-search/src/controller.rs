//! Two-phase search: a coarse pass over the whole space, then hill-climbing
//! over neighborhoods of the current best point until it stops moving.

use chrono::Utc;
use ht_types::{
    validation_error, Dataset, EvaluationError, Estimator, Evaluator, ParameterValue, Point,
    Prediction, Statistic, TuneError, TuneResult,
};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::PerformanceCache;
use crate::config::SearchConfig;
use crate::report::{RoundRecord, SearchReport, Termination};
use crate::scheduler::{EvaluationScheduler, RoundEntry};
use crate::setup::{SetterRegistry, SetupGenerator};
use crate::space::ParameterSpace;

/// Orders round entries best first.
///
/// Scores are compared with the statistic's own sense; exact ties go to the
/// lexicographically smallest grid coordinates, so the outcome does not
/// depend on the order in which tasks finished.
pub fn rank_entries(entries: &mut [RoundEntry], statistic: Statistic) {
    entries.sort_by(|a, b| {
        statistic
            .compare(a.performance.score(statistic), b.performance.score(statistic))
            .reverse()
            .then_with(|| a.coordinates.cmp(&b.coordinates))
    });
}

/// True if every entry carries the same score for `statistic`.
pub fn is_uniform(entries: &[RoundEntry], statistic: Statistic) -> bool {
    let mut scores = entries.iter().map(|e| e.performance.score(statistic));
    match scores.next() {
        None => true,
        Some(first) => scores.all(|s| statistic.compare(s, first) == Ordering::Equal),
    }
}

/// Mutable state of one search call.
struct SearchState {
    center: Point,
    space: ParameterSpace,
    iteration: usize,
    uniform_performance: bool,
}

/// Hyperparameter search over a wrapped estimator.
pub struct HillClimbSearch<E: Estimator, V> {
    template: E,
    setters: SetterRegistry<E>,
    evaluator: Arc<V>,
    config: SearchConfig,
    last_report: Mutex<Option<SearchReport>>,
}

impl<E, V> HillClimbSearch<E, V>
where
    E: Estimator + 'static,
    V: Evaluator<E> + 'static,
{
    pub fn new(template: E, setters: SetterRegistry<E>, evaluator: V, config: SearchConfig) -> Self {
        Self {
            template,
            setters,
            evaluator: Arc::new(evaluator),
            config,
            last_report: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn template(&self) -> &E {
        &self.template
    }

    /// Report of the most recent search call, including failed ones.
    pub fn last_report(&self) -> Option<SearchReport> {
        self.last_report.lock().clone()
    }

    /// Runs the full search on `data` and retrains the winner on all of it.
    pub fn search(&self, data: &Dataset) -> TuneResult<TunedModel<E>> {
        let mut report = SearchReport::new(self.config.statistic);
        report.status.mark_running();

        let result = self.run(data, &mut report);
        match &result {
            Ok(_) => report.status.mark_completed(),
            Err(e) => {
                warn!("Search {} failed: {}", report.id(), e);
                report.status.mark_failed(e.to_string());
            }
        }
        *self.last_report.lock() = Some(report.clone());

        result.map(|mut tuned| {
            tuned.report = report;
            tuned
        })
    }

    fn run(&self, data: &Dataset, report: &mut SearchReport) -> TuneResult<TunedModel<E>> {
        self.config.validate()?;

        let data = data.without_missing_labels();
        if data.is_empty() {
            return Err(validation_error!("No labeled instances to search with"));
        }

        let generator = Arc::new(SetupGenerator::new(
            self.template.clone(),
            &self.setters,
            self.config.dimensions.clone(),
        )?);
        let root = generator.space().clone();
        info!(
            "Search {}: {} dimensions, {} points, statistic {}",
            report.id(),
            root.num_dimensions(),
            root.size(),
            self.config.statistic.readable()
        );

        let sample = if self.config.sample_percent < 100.0 {
            info!("Generating sample ({}%)", self.config.sample_percent);
            Arc::new(data.resample(self.config.sample_percent, self.config.seed)?)
        } else {
            Arc::new(data.clone())
        };

        let winner = {
            // The pool lives for this block only and is released on every exit path.
            let scheduler = EvaluationScheduler::start(
                self.config.execution_slots,
                Arc::clone(&generator),
                Arc::clone(&self.evaluator),
                Arc::new(PerformanceCache::new()),
                self.config.statistic,
                self.config.seed,
            )?;
            self.find_best(&scheduler, &root, &sample, report)?
        };

        info!("Final result: {}", winner);
        let estimator = generator.instantiate(&winner)?;
        info!("Training {} on {} instances", estimator.describe(), data.len());
        let model = estimator.fit(&data)?;

        let coordinates = root.coordinates_of(&winner)?;
        Ok(TunedModel {
            values: generator.named_values(&winner),
            properties: generator.properties().map(str::to_string).collect(),
            winner,
            coordinates,
            estimator,
            model,
            statistic: self.config.statistic,
            report: SearchReport::new(self.config.statistic),
        })
    }

    fn find_best(
        &self,
        scheduler: &EvaluationScheduler<E, V>,
        root: &ParameterSpace,
        sample: &Arc<Dataset>,
        report: &mut SearchReport,
    ) -> TuneResult<Point> {
        info!("=== Initial space ===");
        let first = self.determine_best_in_space(
            scheduler,
            root,
            sample,
            self.config.initial_folds,
            0,
            report,
        )?;
        let mut state = SearchState {
            center: first.best.clone(),
            space: root.clone(),
            iteration: 0,
            uniform_performance: first.uniform,
        };
        report.push_round(first);

        if state.uniform_performance {
            info!("All performances are the same");
            report.termination = Some(Termination::UniformPerformance);
            return Ok(state.center);
        }

        loop {
            state.iteration += 1;
            let coordinates = root.coordinates_of(&state.center)?;

            if root.is_on_border(&coordinates)? {
                info!("Center {} is on border of space", state.center);
                report.termination = Some(Termination::OnBorder);
                break;
            }

            state.space =
                root.subspace_with_radius(&coordinates, self.config.neighborhood_radius)?;
            let round = self.determine_best_in_space(
                scheduler,
                &state.space,
                sample,
                self.config.subsequent_folds,
                state.iteration,
                report,
            )?;
            info!("Result of iteration {}: {}", state.iteration, round.best);

            let previous = std::mem::replace(&mut state.center, round.best.clone());
            state.uniform_performance = round.uniform;
            report.push_round(round);

            if state.uniform_performance {
                info!("All performances are the same");
                report.termination = Some(Termination::UniformPerformance);
                break;
            }
            if state.center == previous {
                info!("No better point found");
                report.termination = Some(Termination::NoImprovement);
                break;
            }
        }

        Ok(state.center)
    }

    fn determine_best_in_space(
        &self,
        scheduler: &EvaluationScheduler<E, V>,
        space: &ParameterSpace,
        data: &Arc<Dataset>,
        folds: usize,
        iteration: usize,
        report: &mut SearchReport,
    ) -> TuneResult<RoundRecord> {
        let statistic = self.config.statistic;
        if folds >= 2 {
            info!("Determining best values with {}-fold CV in {}", folds, space);
        } else {
            info!("Determining best values with evaluation on training set in {}", space);
        }

        let started_at = Utc::now();
        let results = scheduler.run_round(space, data, folds);

        if results.failed > 0 {
            report
                .status
                .record_evaluations(results.completed, results.failed, results.cached);
            return Err(TuneError::RoundFailure {
                failed: results.failed,
                total: results.total,
                failures: results.failures,
            });
        }
        if results.all_cached() {
            warn!("All {} points were already cached", results.total);
        }

        let mut entries = results.entries;
        rank_entries(&mut entries, statistic);
        let uniform = is_uniform(&entries, statistic);

        let best = entries
            .first()
            .map(|e| (e.performance.point.clone(), e.performance.score(statistic)))
            .ok_or_else(|| ht_types::internal_error!("Round produced no results"))?;

        let record = RoundRecord {
            iteration,
            folds,
            space: space.to_string(),
            entries,
            best: best.0,
            best_score: best.1,
            uniform,
            started_at,
            finished_at: Utc::now(),
        };

        if tracing::enabled!(tracing::Level::DEBUG) {
            let available = record
                .entries
                .first()
                .map(|e| e.performance.statistics.available())
                .unwrap_or_default();
            for stat in available {
                debug!("\n{}", record.table(stat));
            }
        }
        info!("Best performance: {} {}={}", record.best, statistic, record.best_score);

        Ok(record)
    }
}

/// The outcome of a successful search: the winning configuration, retrained
/// on the full data.
pub struct TunedModel<E: Estimator> {
    winner: Point,
    values: BTreeMap<String, ParameterValue>,
    properties: Vec<String>,
    coordinates: Vec<usize>,
    estimator: E,
    model: E::Model,
    statistic: Statistic,
    report: SearchReport,
}

impl<E: Estimator> TunedModel<E> {
    pub fn winner(&self) -> &Point {
        &self.winner
    }

    /// Winning value per property path.
    pub fn values(&self) -> &BTreeMap<String, ParameterValue> {
        &self.values
    }

    pub fn coordinates(&self) -> &[usize] {
        &self.coordinates
    }

    /// The winning configuration, untrained.
    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn model(&self) -> &E::Model {
        &self.model
    }

    pub fn report(&self) -> &SearchReport {
        &self.report
    }

    pub fn predict(&self, features: &[f64]) -> Result<Prediction, EvaluationError> {
        use ht_types::Predictor;
        self.model.predict(features)
    }

    /// Names of the numeric winning values, `measure-<dimension>`.
    pub fn measure_names(&self) -> Vec<String> {
        self.winner
            .values()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_numeric())
            .map(|(i, _)| format!("measure-{i}"))
            .collect()
    }

    pub fn measure(&self, name: &str) -> Option<f64> {
        let index: usize = name.strip_prefix("measure-")?.parse().ok()?;
        let value = self.winner.value(index)?;
        if value.is_numeric() {
            value.as_f64()
        } else {
            None
        }
    }
}

impl<E: Estimator> fmt::Display for TunedModel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Estimator: {}", self.estimator.describe())?;
        for (i, property) in self.properties.iter().enumerate() {
            writeln!(f, "{}. property: {}", i + 1, property)?;
        }
        writeln!(f, "Evaluation: {}", self.statistic.readable())?;
        writeln!(f, "Coordinates: {:?}", self.coordinates)?;
        write!(f, "Values: {}", self.winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Performance;
    use crate::dimension::ParameterDimension;
    use crate::report::RunState;
    use crate::test_support::{
        ramp_data, registry, ConstantEvaluator, FailingEvaluator, QuadraticEvaluator, ToyModel,
    };
    use ht_types::{Instance, Statistics};

    fn grid_dims() -> Vec<ParameterDimension> {
        vec![
            ParameterDimension::linear("x", 0, 4, 1.0, 1.0),
            ParameterDimension::linear("y", 0, 4, 1.0, 1.0),
        ]
    }

    fn entry(coords: Vec<usize>, score: f64) -> RoundEntry {
        RoundEntry {
            performance: Performance::new(
                Point::new(coords.iter().map(|&c| ParameterValue::Int(c as i64)).collect()),
                2,
                Statistics::new().with(Statistic::RootMeanSquaredError, score),
            ),
            coordinates: coords,
            cached: false,
        }
    }

    #[test]
    fn ranking_uses_statistic_sense_and_coordinate_tie_break() {
        let mut entries = vec![
            entry(vec![2, 0], 0.5),
            entry(vec![1, 1], 0.2),
            entry(vec![0, 3], 0.2),
            entry(vec![0, 0], f64::NAN),
        ];
        rank_entries(&mut entries, Statistic::RootMeanSquaredError);
        let order: Vec<Vec<usize>> = entries.iter().map(|e| e.coordinates.clone()).collect();
        assert_eq!(order, vec![vec![0, 3], vec![1, 1], vec![2, 0], vec![0, 0]]);

        let mut shuffled = vec![
            entries[2].clone(),
            entries[0].clone(),
            entries[3].clone(),
            entries[1].clone(),
        ];
        rank_entries(&mut shuffled, Statistic::RootMeanSquaredError);
        let reordered: Vec<Vec<usize>> = shuffled.iter().map(|e| e.coordinates.clone()).collect();
        assert_eq!(reordered, order);
    }

    #[test]
    fn uniformity_check() {
        let same = vec![entry(vec![0], 1.0), entry(vec![1], 1.0)];
        assert!(is_uniform(&same, Statistic::RootMeanSquaredError));
        let different = vec![entry(vec![0], 1.0), entry(vec![1], 1.5)];
        assert!(!is_uniform(&different, Statistic::RootMeanSquaredError));
    }

    #[test]
    fn end_to_end_quadratic_optimum() {
        let (template, fits) = ToyModel::with_fit_log();
        let search = HillClimbSearch::new(
            template,
            registry(),
            QuadraticEvaluator::default(),
            SearchConfig::new(grid_dims()).with_execution_slots(3),
        );
        let data = ramp_data(30);

        let tuned = search.search(&data).unwrap();
        assert_eq!(
            tuned.winner(),
            &Point::new(vec![ParameterValue::Float(3.0), ParameterValue::Float(3.0)])
        );
        assert_eq!(tuned.coordinates(), &[2, 2]);
        assert_eq!(tuned.values().get("x"), Some(&ParameterValue::Float(3.0)));
        assert_eq!(tuned.estimator().x, 3.0);

        let report = tuned.report();
        assert_eq!(report.rounds[0].entries.len(), 25);
        assert_eq!(report.rounds[0].folds, 2);
        assert_eq!(report.rounds.len(), 2);
        assert_eq!(report.rounds[1].folds, 10);
        assert_eq!(report.termination, Some(Termination::NoImprovement));
        assert_eq!(report.status.state, RunState::Completed);

        // One final training pass, on the full dataset.
        assert_eq!(fits.lengths(), vec![30]);
        assert_eq!(tuned.predict(&[1.0]).unwrap(), Prediction::Value(6.0));
    }

    #[test]
    fn climbs_from_a_coarse_guess() {
        // The coarse pass sees a shifted landscape; refinement rounds the true one.
        let evaluator = QuadraticEvaluator::with_coarse_optimum(2.0, 2.0);
        let search = HillClimbSearch::new(
            ToyModel::default(),
            registry(),
            evaluator,
            SearchConfig::new(grid_dims()),
        );

        let tuned = search.search(&ramp_data(10)).unwrap();
        assert_eq!(tuned.coordinates(), &[2, 2]);

        let rounds = &tuned.report().rounds;
        assert_eq!(rounds[0].best, Point::new(vec![2.0.into(), 2.0.into()]));
        assert_eq!(rounds[1].best, Point::new(vec![3.0.into(), 3.0.into()]));
        // Reached the optimum in round 1, confirmed it in round 2.
        assert_eq!(rounds.len(), 3);
        assert_eq!(tuned.report().termination, Some(Termination::NoImprovement));
    }

    #[test]
    fn border_center_stops_refinement() {
        let dims = vec![
            ParameterDimension::linear("x", 0, 2, 1.0, 1.0),
            ParameterDimension::linear("y", 0, 2, 1.0, 1.0),
        ];
        let search = HillClimbSearch::new(
            ToyModel::default(),
            registry(),
            QuadraticEvaluator::default(),
            SearchConfig::new(dims),
        );
        let tuned = search.search(&ramp_data(10)).unwrap();
        assert_eq!(tuned.coordinates(), &[2, 2]);
        assert_eq!(tuned.report().rounds.len(), 1);
        assert_eq!(tuned.report().termination, Some(Termination::OnBorder));
    }

    #[test]
    fn uniform_performance_stops_after_one_round() {
        let search = HillClimbSearch::new(
            ToyModel::default(),
            registry(),
            ConstantEvaluator(0.5),
            SearchConfig::new(grid_dims()),
        );
        let tuned = search.search(&ramp_data(10)).unwrap();

        let report = tuned.report();
        assert_eq!(report.rounds.len(), 1);
        assert!(report.rounds[0].uniform);
        assert_eq!(report.termination, Some(Termination::UniformPerformance));
        assert_eq!(tuned.coordinates(), &[0, 0]);
    }

    #[test]
    fn nan_scores_round_trip_through_the_report() {
        let search = HillClimbSearch::new(
            ToyModel::default(),
            registry(),
            ConstantEvaluator(f64::NAN),
            SearchConfig::new(grid_dims()),
        );
        let tuned = search.search(&ramp_data(10)).unwrap();
        assert_eq!(tuned.report().termination, Some(Termination::UniformPerformance));

        let json = tuned.report().to_json().unwrap();
        let back: SearchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rounds.len(), 1);
        assert!(back.rounds[0].best_score.is_nan());
        assert!(back.status.best_score.unwrap().is_nan());
        assert!(back.rounds[0]
            .entries
            .iter()
            .all(|e| e.performance.score(Statistic::CorrelationCoefficient).is_nan()));
    }

    #[test]
    fn failed_task_aborts_the_search() {
        let (template, fits) = ToyModel::with_fit_log();
        let search = HillClimbSearch::new(
            template,
            registry(),
            FailingEvaluator::at(4.0, 2.0),
            SearchConfig::new(grid_dims()).with_execution_slots(2),
        );

        match search.search(&ramp_data(10)) {
            Err(TuneError::RoundFailure { failed, total, failures }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 25);
                assert_eq!(failures[0].candidate, "[4, 2]");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("search should fail"),
        }
        assert!(fits.lengths().is_empty());

        let report = search.last_report().unwrap();
        assert_eq!(report.status.state, RunState::Failed);
        assert!(report.rounds.is_empty());
        assert_eq!(report.status.rounds_completed, 0);
        assert_eq!(report.status.evaluations_failed, 1);
        assert_eq!(report.status.evaluations_completed, 24);
        assert!(report.status.error.as_deref().unwrap().contains("1 of 25"));
    }

    #[test]
    fn configuration_error_for_one_point_fails_the_round() {
        let dims = vec![
            ParameterDimension::linear("x", 0, 4, 1.0, 1.0),
            ParameterDimension::list("mode", vec!["fast".into(), ParameterValue::Int(7)]),
        ];
        let search = HillClimbSearch::new(
            ToyModel::default(),
            registry(),
            QuadraticEvaluator::default(),
            SearchConfig::new(dims),
        );
        match search.search(&ramp_data(10)) {
            Err(TuneError::RoundFailure { failed, .. }) => assert_eq!(failed, 5),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("search should fail"),
        }
    }

    #[test]
    fn subsample_used_for_search_full_data_for_final_fit() {
        let (template, fits) = ToyModel::with_fit_log();
        let search = HillClimbSearch::new(
            template,
            registry(),
            QuadraticEvaluator::default(),
            SearchConfig::new(grid_dims())
                .with_sample_percent(50.0)
                .with_folds(1, 1),
        );
        let tuned = search.search(&ramp_data(40)).unwrap();

        let lengths = fits.lengths();
        let (last, search_fits) = lengths.split_last().unwrap();
        assert_eq!(*last, 40);
        assert!(!search_fits.is_empty());
        assert!(search_fits.iter().all(|&n| n == 20));
        assert_eq!(tuned.coordinates(), &[2, 2]);
    }

    #[test]
    fn missing_labels_are_dropped_before_searching() {
        let (template, fits) = ToyModel::with_fit_log();
        let search = HillClimbSearch::new(
            template,
            registry(),
            QuadraticEvaluator::default(),
            SearchConfig::new(grid_dims()),
        );
        let mut data = ramp_data(12);
        data.push(Instance::unlabeled(vec![99.0]));

        search.search(&data).unwrap();
        assert_eq!(fits.lengths(), vec![12]);

        let empty = Dataset::new("empty", vec![Instance::unlabeled(vec![1.0])]);
        assert!(matches!(search.search(&empty), Err(TuneError::Validation(_))));
    }

    #[test]
    fn unknown_property_fails_before_evaluating() {
        let evaluator = QuadraticEvaluator::default();
        let search = HillClimbSearch::new(
            ToyModel::default(),
            registry(),
            evaluator,
            SearchConfig::new(vec![ParameterDimension::integer("classifier.ridge", 0, 3)]),
        );
        assert!(matches!(
            search.search(&ramp_data(10)),
            Err(TuneError::Configuration(_))
        ));
        assert_eq!(search.last_report().unwrap().status.state, RunState::Failed);
    }

    #[test]
    fn measures_and_summary() {
        let dims = vec![
            ParameterDimension::linear("x", 0, 4, 1.0, 1.0),
            ParameterDimension::linear("y", 0, 4, 1.0, 1.0),
            ParameterDimension::list("mode", vec!["fast".into()]),
        ];
        let search = HillClimbSearch::new(
            ToyModel::default(),
            registry(),
            QuadraticEvaluator::default(),
            SearchConfig::new(dims),
        );
        let tuned = search.search(&ramp_data(10)).unwrap();

        assert_eq!(tuned.measure_names(), vec!["measure-0", "measure-1"]);
        assert_eq!(tuned.measure("measure-1"), Some(3.0));
        assert_eq!(tuned.measure("measure-2"), None);
        assert_eq!(tuned.measure("ridge"), None);

        let summary = tuned.to_string();
        assert!(summary.contains("1. property: x"));
        assert!(summary.contains("3. property: mode"));
        assert!(summary.contains("Evaluation: Correlation coefficient"));
        assert!(summary.contains("Values: [3, 3, fast]"));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let run = |slots| {
            let search = HillClimbSearch::new(
                ToyModel::default(),
                registry(),
                ConstantEvaluator(1.0),
                SearchConfig::new(grid_dims()).with_execution_slots(slots),
            );
            search.search(&ramp_data(10)).unwrap().winner().clone()
        };
        // Exact ties go to the lowest coordinates regardless of pool width.
        let expected = Point::new(vec![1.0.into(), 1.0.into()]);
        assert_eq!(run(1), expected);
        assert_eq!(run(4), expected);
    }
}
