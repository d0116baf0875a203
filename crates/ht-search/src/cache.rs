use dashmap::DashMap;
use ht_types::{Point, Statistic, Statistics};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Evaluation result of one point at one fold count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub point: Point,
    pub folds: usize,
    pub statistics: Statistics,
}

impl Performance {
    pub fn new(point: Point, folds: usize, statistics: Statistics) -> Self {
        Self {
            point,
            folds,
            statistics,
        }
    }

    /// The score for `statistic`; NaN if the evaluator did not report it.
    pub fn score(&self, statistic: Statistic) -> f64 {
        self.statistics.get(statistic).unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Performance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} folds={}", self.point, self.folds)?;
        for statistic in self.statistics.available() {
            write!(f, " {}={:.6}", statistic, self.score(statistic))?;
        }
        Ok(())
    }
}

/// Cache key: fold count plus point value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    folds: usize,
    point: Point,
}

/// Run-scoped memo of evaluation results.
///
/// Entries are never evicted; a new cache is created for each search.
#[derive(Debug, Default)]
pub struct PerformanceCache {
    entries: DashMap<CacheKey, Performance>,
    stats: RwLock<CacheStats>,
}

impl PerformanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, folds: usize, point: &Point) -> Option<Performance> {
        let key = CacheKey {
            folds,
            point: point.clone(),
        };

        let hit = self.entries.get(&key).map(|entry| entry.value().clone());

        let mut stats = self.stats.write();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Stores a result under its own fold count and point.
    pub fn store(&self, performance: Performance) {
        let key = CacheKey {
            folds: performance.folds,
            point: performance.point.clone(),
        };
        let replaced = self.entries.insert(key, performance).is_some();

        let mut stats = self.stats.write();
        if !replaced {
            stats.stores += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ht_types::ParameterValue;
    use std::sync::Arc;

    fn perf(x: i64, folds: usize, score: f64) -> Performance {
        Performance::new(
            Point::new(vec![ParameterValue::Int(x)]),
            folds,
            Statistics::new().with(Statistic::Accuracy, score),
        )
    }

    #[test]
    fn test_cache_basic_operations() {
        let cache = PerformanceCache::new();
        let point = Point::new(vec![ParameterValue::Int(1)]);

        assert!(cache.lookup(2, &point).is_none());

        cache.store(perf(1, 2, 0.75));
        let hit = cache.lookup(2, &point).unwrap();
        assert_eq!(hit.score(Statistic::Accuracy), 0.75);

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn fold_count_is_part_of_the_key() {
        let cache = PerformanceCache::new();
        cache.store(perf(1, 2, 0.5));
        let point = Point::new(vec![ParameterValue::Int(1)]);
        assert!(cache.lookup(2, &point).is_some());
        assert!(cache.lookup(10, &point).is_none());
    }

    #[test]
    fn keys_use_value_equality() {
        let cache = PerformanceCache::new();
        cache.store(perf(4, 10, 0.9));
        cache.store(perf(4, 10, 0.9));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_stats().stores, 1);

        let rebuilt = Point::new(vec![ParameterValue::Int(4)]);
        assert!(cache.lookup(10, &rebuilt).is_some());
    }

    #[test]
    fn concurrent_stores() {
        let cache = Arc::new(PerformanceCache::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.store(perf(t * 100 + i, 2, i as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = PerformanceCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get_stats(), CacheStats::default());
        assert_eq!(cache.get_stats().hit_rate(), 0.0);
    }

    #[test]
    fn missing_statistic_scores_nan() {
        let p = perf(1, 2, 0.3);
        assert!(p.score(Statistic::Kappa).is_nan());
        assert!(p.to_string().contains("ACC=0.300000"));
    }
}
