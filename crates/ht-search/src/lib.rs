//! # ht-search
//!
//! Grid-based hyperparameter search for HillTune.
//!
//! Provides parameter dimensions and grid spaces, setup generation through
//! named setters, a run-scoped performance cache, a bounded evaluation pool,
//! and the two-phase hill-climbing controller that ties them together.

mod cache;
mod config;
mod controller;
mod dimension;
mod report;
mod scheduler;
mod setup;
mod space;

#[cfg(test)]
mod test_support;

pub use cache::{CacheStats, Performance, PerformanceCache};
pub use config::SearchConfig;
pub use controller::{is_uniform, rank_entries, HillClimbSearch, TunedModel};
pub use dimension::{ParameterDimension, ValueMapping};
pub use report::{RoundRecord, RunState, SearchId, SearchReport, SearchStatus, Termination};
pub use scheduler::{EvaluationScheduler, RoundEntry, RoundResults};
pub use setup::{SetterFn, SetterRegistry, SetupGenerator};
pub use space::{AxisBounds, Cells, GridCell, ParameterSpace};
