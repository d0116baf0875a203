//! Labeled training data shared read-only across evaluation tasks.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{TuneError, TuneResult};

/// A single row: feature vector plus an optional label.
///
/// Nominal labels are stored as class indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub features: Vec<f64>,
    pub label: Option<f64>,
}

impl Instance {
    pub fn labeled(features: Vec<f64>, label: f64) -> Self {
        Self {
            features,
            label: Some(label),
        }
    }

    pub fn unlabeled(features: Vec<f64>) -> Self {
        Self {
            features,
            label: None,
        }
    }

    pub fn has_label(&self) -> bool {
        matches!(self.label, Some(l) if !l.is_nan())
    }
}

/// An ordered collection of instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    instances: Vec<Instance>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, instances: Vec<Instance>) -> Self {
        Self {
            name: name.into(),
            instances,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn push(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    /// Copy of the dataset without instances whose label is missing.
    pub fn without_missing_labels(&self) -> Self {
        Self {
            name: self.name.clone(),
            instances: self
                .instances
                .iter()
                .filter(|i| i.has_label())
                .cloned()
                .collect(),
        }
    }

    /// Copy restricted to the given row indices, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            instances: indices
                .iter()
                .filter_map(|&i| self.instances.get(i).cloned())
                .collect(),
        }
    }

    /// Seeded sample without replacement holding `percent` of the rows
    /// (rounded, at least one row). Row order of the original is kept.
    ///
    /// Unlike a bootstrap resample, no row is drawn twice, so a 100% sample
    /// is the whole dataset.
    pub fn resample(&self, percent: f64, seed: u64) -> TuneResult<Self> {
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(TuneError::Validation(format!(
                "Sample percentage must be in (0, 100], got {percent}"
            )));
        }
        if self.is_empty() {
            return Ok(self.clone());
        }

        let len = self.len();
        let amount = ((len as f64 * percent / 100.0).round() as usize).clamp(1, len);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut picked = index::sample(&mut rng, len, amount).into_vec();
        picked.sort_unstable();

        let mut sample = self.subset(&picked);
        sample.name = format!("{}-{}%", self.name, percent);
        Ok(sample)
    }
}
