//! Tunable axes: a property path plus an index range and an index→value rule.

use ht_types::{config_error, ConfigurationError, ParameterValue, SpaceError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Deterministic rule turning a grid index into a concrete value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueMapping {
    /// The index itself, as an integer.
    Identity,
    /// `offset + scale * index`.
    Linear { offset: f64, scale: f64 },
    /// `base ^ index`, for sweeping orders of magnitude.
    Power { base: f64 },
    /// The index selects an element of an explicit list.
    List { values: Vec<ParameterValue> },
}

/// One tunable axis of the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDimension {
    /// Property path of the setter this dimension drives (e.g. "filter.components").
    pub property: String,
    pub min: i64,
    pub max: i64,
    #[serde(default = "default_step")]
    pub step: i64,
    pub mapping: ValueMapping,
}

fn default_step() -> i64 {
    1
}

impl ParameterDimension {
    pub fn new(property: impl Into<String>, min: i64, max: i64, mapping: ValueMapping) -> Self {
        Self {
            property: property.into(),
            min,
            max,
            step: 1,
            mapping,
        }
    }

    /// Integer values `min..=max`.
    pub fn integer(property: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(property, min, max, ValueMapping::Identity)
    }

    /// Float values `offset + scale * i` for `i` in `min..=max`.
    pub fn linear(property: impl Into<String>, min: i64, max: i64, offset: f64, scale: f64) -> Self {
        Self::new(property, min, max, ValueMapping::Linear { offset, scale })
    }

    /// Float values `base ^ i` for `i` in `min..=max`.
    pub fn power(property: impl Into<String>, base: f64, min: i64, max: i64) -> Self {
        Self::new(property, min, max, ValueMapping::Power { base })
    }

    /// Every element of `values`, in order.
    pub fn list(property: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        let max = values.len() as i64 - 1;
        Self::new(property, 0, max, ValueMapping::List { values })
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.property.trim().is_empty() {
            return Err(config_error!(self.property, "property path is empty"));
        }
        if self.step < 1 {
            return Err(config_error!(self.property, "step must be positive, got {}", self.step));
        }
        if self.min > self.max {
            return Err(config_error!(
                self.property,
                "min {} is greater than max {}",
                self.min,
                self.max
            ));
        }
        if self.max.checked_sub(self.min).is_none() {
            return Err(config_error!(
                self.property,
                "index range [{}, {}] is too wide",
                self.min,
                self.max
            ));
        }
        match &self.mapping {
            ValueMapping::Identity => {}
            ValueMapping::Linear { offset, scale } => {
                if !offset.is_finite() || !scale.is_finite() {
                    return Err(config_error!(self.property, "linear mapping must be finite"));
                }
            }
            ValueMapping::Power { base } => {
                if !base.is_finite() || *base <= 0.0 {
                    return Err(config_error!(self.property, "power base must be positive, got {base}"));
                }
            }
            ValueMapping::List { values } => {
                if values.is_empty() {
                    return Err(config_error!(self.property, "value list is empty"));
                }
                if self.min < 0 || self.max >= values.len() as i64 {
                    return Err(config_error!(
                        self.property,
                        "index range [{}, {}] does not fit a list of {} values",
                        self.min,
                        self.max,
                        values.len()
                    ));
                }
            }
        }
        if !matches!(self.mapping, ValueMapping::Identity) {
            self.check_distinct()?;
        }
        Ok(())
    }

    /// Every grid position must resolve to its own value, otherwise a point
    /// cannot be located again from its values.
    fn check_distinct(&self) -> Result<(), ConfigurationError> {
        let values = self
            .values()
            .map_err(|e| config_error!(self.property, "{}", e))?;
        let mut seen = HashSet::with_capacity(values.len());
        for value in &values {
            if !seen.insert(value) {
                return Err(config_error!(
                    self.property,
                    "value {} is produced by more than one index",
                    value
                ));
            }
        }
        Ok(())
    }

    /// Number of grid positions: `min, min + step, ...` up to `max`.
    pub fn cardinality(&self) -> usize {
        if self.step < 1 {
            return 0;
        }
        match self.max.checked_sub(self.min) {
            Some(span) if span >= 0 => (span / self.step) as usize + 1,
            _ => 0,
        }
    }

    /// The index at a 0-based grid position.
    pub fn index_at(&self, position: usize) -> i64 {
        self.min + position as i64 * self.step
    }

    /// Maps an index to its value. Pure: the same index always yields the same value.
    pub fn resolve(&self, index: i64) -> Result<ParameterValue, SpaceError> {
        let out_of_range = || SpaceError::IndexOutOfRange {
            property: self.property.clone(),
            index,
            min: self.min,
            max: self.max,
        };
        if index < self.min || index > self.max {
            return Err(out_of_range());
        }

        let value = match &self.mapping {
            ValueMapping::Identity => ParameterValue::Int(index),
            ValueMapping::Linear { offset, scale } => ParameterValue::Float(offset + scale * index as f64),
            ValueMapping::Power { base } => ParameterValue::Float(base.powf(index as f64)),
            ValueMapping::List { values } => usize::try_from(index)
                .ok()
                .and_then(|i| values.get(i))
                .cloned()
                .ok_or_else(out_of_range)?,
        };
        Ok(value)
    }

    /// Resolves every grid position in order.
    pub fn values(&self) -> Result<Vec<ParameterValue>, SpaceError> {
        (0..self.cardinality())
            .map(|pos| self.resolve(self.index_at(pos)))
            .collect()
    }
}
