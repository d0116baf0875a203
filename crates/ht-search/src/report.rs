//! Search run tracking and the per-round diagnostics table.

use chrono::{DateTime, Utc};
use ht_types::{Point, Statistic, TuneResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::RoundEntry;

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Lifecycle state for a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Why the refinement loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Every point of the last round scored identically.
    UniformPerformance,
    /// The center reached the edge of the configured space.
    OnBorder,
    /// The neighborhood round kept the previous center.
    NoImprovement,
}

/// Aggregate status of a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStatus {
    pub id: SearchId,
    pub state: RunState,
    pub rounds_completed: usize,
    pub evaluations_completed: usize,
    pub evaluations_failed: usize,
    pub cache_hits: usize,
    #[serde(with = "ht_types::statistic::score_serde::option")]
    pub best_score: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SearchStatus {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Pending,
            rounds_completed: 0,
            evaluations_completed: 0,
            evaluations_failed: 0,
            cache_hits: 0,
            best_score: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Adds the counters of a finished round. Cache hits count as completed.
    pub fn record_round(&mut self, completed: usize, failed: usize, cached: usize) {
        self.rounds_completed += 1;
        self.record_evaluations(completed, failed, cached);
    }

    /// Adds task counters without counting a round, for rounds that aborted the search.
    pub fn record_evaluations(&mut self, completed: usize, failed: usize, cached: usize) {
        self.evaluations_completed += completed;
        self.evaluations_failed += failed;
        self.cache_hits += cached;
    }
}

impl Default for SearchStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// One evaluated round, ranked best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 0 for the initial space, then one per refinement iteration.
    pub iteration: usize,
    pub folds: usize,
    pub space: String,
    pub entries: Vec<RoundEntry>,
    pub best: Point,
    #[serde(with = "ht_types::statistic::score_serde")]
    pub best_score: f64,
    pub uniform: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RoundRecord {
    pub fn cached(&self) -> usize {
        self.entries.iter().filter(|e| e.cached).count()
    }

    /// Plain-text table of the round for one statistic.
    pub fn table(&self, statistic: Statistic) -> String {
        let mut out = format!("{} ({} folds):\n{}\n", statistic.readable(), self.folds, self.space);
        for entry in &self.entries {
            out.push_str(&format!(
                "{}\t{}\t{}\n",
                entry.performance.point,
                entry.performance.score(statistic),
                if entry.cached { "cached" } else { "" },
            ));
        }
        out
    }
}

/// Everything a search run recorded, for diagnostics and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub statistic: Statistic,
    pub rounds: Vec<RoundRecord>,
    pub termination: Option<Termination>,
    pub status: SearchStatus,
}

impl SearchReport {
    pub fn new(statistic: Statistic) -> Self {
        Self {
            statistic,
            rounds: Vec::new(),
            termination: None,
            status: SearchStatus::new(),
        }
    }

    pub fn id(&self) -> SearchId {
        self.status.id
    }

    pub fn push_round(&mut self, round: RoundRecord) {
        self.status.record_round(round.entries.len(), 0, round.cached());
        self.status.best_score = Some(round.best_score);
        self.rounds.push(round);
    }

    pub fn to_json(&self) -> TuneResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
