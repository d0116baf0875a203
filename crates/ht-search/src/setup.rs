//! Materializing points into configured estimators.
//!
//! Each tunable property of an estimator is exposed through a named setter in
//! a [`SetterRegistry`]. Dimensions are bound to setters when the
//! [`SetupGenerator`] is built, so an unknown property path is reported before
//! any evaluation runs.

use ht_types::{ConfigurationError, Estimator, ParameterValue, Point, TuneResult};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::dimension::ParameterDimension;
use crate::space::ParameterSpace;

/// Applies one resolved value to an estimator configuration.
pub type SetterFn<E> =
    Arc<dyn Fn(&mut E, &ParameterValue) -> Result<(), ConfigurationError> + Send + Sync>;

/// The named setters an estimator type supports.
pub struct SetterRegistry<E> {
    setters: BTreeMap<String, SetterFn<E>>,
}

impl<E> SetterRegistry<E> {
    pub fn new() -> Self {
        Self {
            setters: BTreeMap::new(),
        }
    }

    /// Registers a setter that receives the raw value.
    pub fn with<F>(mut self, path: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut E, &ParameterValue) -> Result<(), ConfigurationError> + Send + Sync + 'static,
    {
        self.setters.insert(path.into(), Arc::new(setter));
        self
    }

    /// Registers a float-valued property.
    pub fn float<F>(self, path: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut E, f64) + Send + Sync + 'static,
    {
        let path = path.into();
        let name = path.clone();
        self.with(path, move |target, value| {
            let v = value
                .as_f64()
                .ok_or_else(|| incompatible(&name, value, "a number"))?;
            setter(target, v);
            Ok(())
        })
    }

    /// Registers an integer-valued property. Floats are truncated.
    pub fn int<F>(self, path: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut E, i64) + Send + Sync + 'static,
    {
        let path = path.into();
        let name = path.clone();
        self.with(path, move |target, value| {
            let v = value
                .as_i64()
                .ok_or_else(|| incompatible(&name, value, "an integer"))?;
            setter(target, v);
            Ok(())
        })
    }

    /// Registers a boolean property. Numeric zero means `false`.
    pub fn boolean<F>(self, path: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut E, bool) + Send + Sync + 'static,
    {
        let path = path.into();
        let name = path.clone();
        self.with(path, move |target, value| {
            let v = value
                .as_bool()
                .ok_or_else(|| incompatible(&name, value, "a boolean"))?;
            setter(target, v);
            Ok(())
        })
    }

    /// Registers a text property (names, tags, nested specifications).
    pub fn text<F>(self, path: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut E, &str) -> Result<(), ConfigurationError> + Send + Sync + 'static,
    {
        let path = path.into();
        let name = path.clone();
        self.with(path, move |target, value| {
            let v = value
                .as_str()
                .ok_or_else(|| incompatible(&name, value, "text"))?;
            setter(target, v)
        })
    }

    fn resolve(&self, path: &str) -> Option<SetterFn<E>> {
        self.setters.get(path).cloned()
    }
}

impl<E> Default for SetterRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for SetterRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            setters: self.setters.clone(),
        }
    }
}

impl<E> fmt::Debug for SetterRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetterRegistry")
            .field("paths", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn incompatible(path: &str, value: &ParameterValue, expected: &str) -> ConfigurationError {
    ConfigurationError::IncompatibleValue {
        path: path.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

struct Binding<E> {
    property: String,
    setter: SetterFn<E>,
}

/// Turns points into ready-to-train copies of a template estimator.
pub struct SetupGenerator<E> {
    template: E,
    bindings: Vec<Binding<E>>,
    space: ParameterSpace,
}

impl<E: Estimator> SetupGenerator<E> {
    /// Binds every dimension to its setter and builds the root space.
    pub fn new(
        template: E,
        registry: &SetterRegistry<E>,
        dimensions: Vec<ParameterDimension>,
    ) -> TuneResult<Self> {
        let mut seen = HashSet::new();
        let mut bindings = Vec::with_capacity(dimensions.len());
        for dimension in &dimensions {
            if !seen.insert(dimension.property.as_str()) {
                return Err(ConfigurationError::DuplicateProperty {
                    path: dimension.property.clone(),
                }
                .into());
            }
            let setter = registry.resolve(&dimension.property).ok_or_else(|| {
                ConfigurationError::UnknownProperty {
                    path: dimension.property.clone(),
                }
            })?;
            bindings.push(Binding {
                property: dimension.property.clone(),
                setter,
            });
        }

        let space = ParameterSpace::new(dimensions)?;
        Ok(Self {
            template,
            bindings,
            space,
        })
    }

    pub fn template(&self) -> &E {
        &self.template
    }

    /// The root space spanned by all dimensions.
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> + '_ {
        self.bindings.iter().map(|b| b.property.as_str())
    }

    /// A copy of the template with every value of `point` applied.
    /// The template itself is never modified.
    pub fn instantiate(&self, point: &Point) -> Result<E, ConfigurationError> {
        if point.dimensions() != self.bindings.len() {
            return Err(ConfigurationError::PointMismatch {
                expected: self.bindings.len(),
                actual: point.dimensions(),
            });
        }

        let mut estimator = self.template.clone();
        for (binding, value) in self.bindings.iter().zip(point.values()) {
            (binding.setter)(&mut estimator, value)?;
        }
        Ok(estimator)
    }

    /// The point as a property → value mapping.
    pub fn named_values(&self, point: &Point) -> BTreeMap<String, ParameterValue> {
        self.bindings
            .iter()
            .zip(point.values())
            .map(|(b, v)| (b.property.clone(), v.clone()))
            .collect()
    }
}

impl<E: fmt::Debug> fmt::Debug for SetupGenerator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupGenerator")
            .field("template", &self.template)
            .field(
                "properties",
                &self.bindings.iter().map(|b| &b.property).collect::<Vec<_>>(),
            )
            .field("space", &self.space)
            .finish()
    }
}
