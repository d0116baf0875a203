//! Bounded worker pool that evaluates one round of points.
//!
//! A round is submitted as a whole; [`EvaluationScheduler::run_round`] returns
//! once every task has either completed or failed. Task errors (and panics)
//! are captured as [`TaskFailure`]s and never take the pool down.

use crossbeam_channel::{unbounded, Sender};
use ht_types::{
    Dataset, EvaluationError, Estimator, Evaluator, Point, Statistic, TaskFailure, TuneResult,
};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::{Performance, PerformanceCache};
use crate::setup::SetupGenerator;
use crate::space::ParameterSpace;

/// One evaluated point of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    pub coordinates: Vec<usize>,
    pub performance: Performance,
    pub cached: bool,
}

/// Everything a finished round produced.
#[derive(Debug, Clone, Default)]
pub struct RoundResults {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cached: usize,
    pub entries: Vec<RoundEntry>,
    pub failures: Vec<TaskFailure>,
}

impl RoundResults {
    pub fn all_cached(&self) -> bool {
        self.total > 0 && self.cached == self.total
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RoundTally {
    total: usize,
    completed: usize,
    failed: usize,
}

impl RoundTally {
    fn done(&self) -> bool {
        self.completed + self.failed >= self.total
    }
}

/// One-shot barrier counting finished tasks of a round.
#[derive(Debug, Default)]
struct RoundLatch {
    tally: Mutex<RoundTally>,
    released: Condvar,
}

impl RoundLatch {
    fn new(total: usize, already_completed: usize) -> Self {
        Self {
            tally: Mutex::new(RoundTally {
                total,
                completed: already_completed,
                failed: 0,
            }),
            released: Condvar::new(),
        }
    }

    fn record(&self, success: bool) {
        let mut tally = self.tally.lock();
        if success {
            tally.completed += 1;
        } else {
            tally.failed += 1;
        }
        if tally.done() {
            self.released.notify_all();
        }
    }

    fn wait(&self) -> RoundTally {
        let mut tally = self.tally.lock();
        while !tally.done() {
            self.released.wait(&mut tally);
        }
        *tally
    }
}

/// Counts a task on the latch when dropped, so unwinding still releases the round.
struct LatchGuard<'a> {
    latch: &'a RoundLatch,
    success: bool,
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.record(self.success);
    }
}

enum TaskOutcome {
    Completed(RoundEntry),
    Failed(TaskFailure),
}

struct EvaluationTask {
    coordinates: Vec<usize>,
    point: Point,
}

/// Shared, read-only context every task of a search works against.
struct TaskContext<E: Estimator, V> {
    generator: Arc<SetupGenerator<E>>,
    evaluator: Arc<V>,
    cache: Arc<PerformanceCache>,
    statistic: Statistic,
    seed: u64,
}

impl<E, V> TaskContext<E, V>
where
    E: Estimator,
    V: Evaluator<E>,
{
    fn evaluate(&self, point: &Point, data: &Dataset, folds: usize) -> TuneResult<Performance> {
        let estimator = self.generator.instantiate(point)?;

        let statistics = if folds >= 2 {
            self.evaluator
                .cross_validate(&estimator, data, folds, self.seed)?
        } else {
            let model = estimator.fit(data)?;
            self.evaluator.score(&model, data)?
        };

        if statistics.get(self.statistic).is_none() {
            return Err(EvaluationError::MissingStatistic {
                statistic: self.statistic.to_string(),
            }
            .into());
        }

        Ok(Performance::new(point.clone(), folds, statistics))
    }

    fn run(
        &self,
        task: EvaluationTask,
        data: &Dataset,
        folds: usize,
        outcomes: &Sender<TaskOutcome>,
        latch: &RoundLatch,
    ) {
        let mut guard = LatchGuard {
            latch,
            success: false,
        };

        let result = catch_unwind(AssertUnwindSafe(|| self.evaluate(&task.point, data, folds)))
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EvaluationError::Panicked { message }.into())
            });

        guard.success = match result {
            Ok(performance) => {
                debug!("{}: cached=false", performance);
                self.cache.store(performance.clone());
                let _ = outcomes.send(TaskOutcome::Completed(RoundEntry {
                    coordinates: task.coordinates,
                    performance,
                    cached: false,
                }));
                true
            }
            Err(e) => {
                warn!("Evaluation failed for {}: {}", task.point, e);
                let _ = outcomes.send(TaskOutcome::Failed(TaskFailure {
                    candidate: task.point.to_string(),
                    cause: e.to_string(),
                }));
                false
            }
        };
        // The guard counts the task only after the outcome is queued.
    }
}

/// Worker pool scoped to one search call.
///
/// The pool is created by [`EvaluationScheduler::start`] and torn down when
/// the scheduler is dropped.
pub struct EvaluationScheduler<E: Estimator, V> {
    pool: rayon::ThreadPool,
    slots: usize,
    context: Arc<TaskContext<E, V>>,
}

impl<E, V> EvaluationScheduler<E, V>
where
    E: Estimator + 'static,
    V: Evaluator<E> + 'static,
{
    pub fn start(
        slots: usize,
        generator: Arc<SetupGenerator<E>>,
        evaluator: Arc<V>,
        cache: Arc<PerformanceCache>,
        statistic: Statistic,
        seed: u64,
    ) -> TuneResult<Self> {
        let slots = slots.max(1);
        info!("Starting evaluation pool with {} slots", slots);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(slots)
            .thread_name(|i| format!("ht-eval-{i}"))
            .panic_handler(|_| error!("Evaluation worker panicked outside of a task"))
            .build()
            .map_err(|e| ht_types::internal_error!("Failed to start evaluation pool: {}", e))?;

        Ok(Self {
            pool,
            slots,
            context: Arc::new(TaskContext {
                generator,
                evaluator,
                cache,
                statistic,
                seed,
            }),
        })
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Evaluates every point of `space` with `folds` folds and blocks until
    /// the whole round has finished. Cache hits are not re-evaluated.
    pub fn run_round(
        &self,
        space: &ParameterSpace,
        data: &Arc<Dataset>,
        folds: usize,
    ) -> RoundResults {
        let mut results = RoundResults {
            total: space.size(),
            ..RoundResults::default()
        };

        let mut pending = Vec::new();
        for cell in space.cells() {
            match self.context.cache.lookup(folds, &cell.point) {
                Some(performance) => {
                    debug!("{}: cached=true", performance);
                    results.entries.push(RoundEntry {
                        coordinates: cell.coordinates,
                        performance,
                        cached: true,
                    });
                    results.cached += 1;
                }
                None => pending.push(EvaluationTask {
                    coordinates: cell.coordinates,
                    point: cell.point,
                }),
            }
        }

        let latch = Arc::new(RoundLatch::new(results.total, results.cached));
        let (tx, rx) = unbounded();

        for task in pending {
            let context = Arc::clone(&self.context);
            let data = Arc::clone(data);
            let latch = Arc::clone(&latch);
            let tx = tx.clone();
            self.pool
                .spawn(move || context.run(task, &data, folds, &tx, &latch));
        }
        drop(tx);

        let tally = latch.wait();
        results.completed = tally.completed;
        results.failed = tally.failed;

        for outcome in rx.try_iter() {
            match outcome {
                TaskOutcome::Completed(entry) => results.entries.push(entry),
                TaskOutcome::Failed(failure) => results.failures.push(failure),
            }
        }

        results
    }
}

impl<E: Estimator, V> Drop for EvaluationScheduler<E, V> {
    fn drop(&mut self) {
        let stats = self.context.cache.get_stats();
        info!(
            "Shutting down evaluation pool ({} cached results, hit rate {:.2})",
            self.context.cache.len(),
            stats.hit_rate()
        );
    }
}
