//! The discretized search space: cartesian product of parameter dimensions.

use ht_types::{ParameterValue, Point, SpaceError, TuneResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::dimension::ParameterDimension;

/// A dimension together with its resolved values, one per grid position.
#[derive(Debug)]
struct Axis {
    dimension: ParameterDimension,
    values: Vec<ParameterValue>,
}

/// Inclusive window of grid positions a space covers along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub lo: usize,
    pub hi: usize,
}

impl AxisBounds {
    pub fn len(&self) -> usize {
        self.hi - self.lo + 1
    }

    pub fn contains(&self, position: usize) -> bool {
        position >= self.lo && position <= self.hi
    }
}

/// A point together with its grid coordinates and enumeration ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub ordinal: usize,
    pub coordinates: Vec<usize>,
    pub point: Point,
}

/// A finite grid of points.
///
/// Coordinates are absolute 0-based positions along each dimension, so a
/// sub-space shares its parent's coordinate system.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    axes: Arc<[Axis]>,
    bounds: Vec<AxisBounds>,
}

impl ParameterSpace {
    /// Builds the full space spanned by `dimensions`, resolving every axis value up front.
    pub fn new(dimensions: Vec<ParameterDimension>) -> TuneResult<Self> {
        if dimensions.is_empty() {
            return Err(SpaceError::Empty.into());
        }

        let mut axes = Vec::with_capacity(dimensions.len());
        for dimension in dimensions {
            dimension.validate()?;
            let values = dimension.values()?;
            axes.push(Axis { dimension, values });
        }

        let bounds = axes
            .iter()
            .map(|axis| AxisBounds {
                lo: 0,
                hi: axis.values.len() - 1,
            })
            .collect();

        Ok(Self {
            axes: axes.into(),
            bounds,
        })
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &ParameterDimension> + '_ {
        self.axes.iter().map(|axis| &axis.dimension)
    }

    pub fn num_dimensions(&self) -> usize {
        self.axes.len()
    }

    pub fn bounds(&self) -> &[AxisBounds] {
        &self.bounds
    }

    /// Product of the per-dimension cardinalities.
    pub fn size(&self) -> usize {
        self.bounds
            .iter()
            .fold(1usize, |acc, b| acc.saturating_mul(b.len()))
    }

    /// All points in row-major order (last dimension varies fastest).
    /// Each call starts a fresh enumeration.
    pub fn enumerate(&self) -> impl Iterator<Item = Point> + '_ {
        self.cells().map(|cell| cell.point)
    }

    /// Like [`ParameterSpace::enumerate`], with coordinates and ordinals.
    pub fn cells(&self) -> Cells<'_> {
        Cells {
            space: self,
            next: Some(self.bounds.iter().map(|b| b.lo).collect()),
            ordinal: 0,
        }
    }

    /// The point at the given coordinates.
    pub fn point_at(&self, coordinates: &[usize]) -> Result<Point, SpaceError> {
        self.check_arity(coordinates.len())?;
        let mut values = Vec::with_capacity(coordinates.len());
        for (axis, &position) in self.axes.iter().zip(coordinates) {
            let value = axis
                .values
                .get(position)
                .ok_or_else(|| SpaceError::CoordinateOutOfRange {
                    property: axis.dimension.property.clone(),
                    position,
                    cardinality: axis.values.len(),
                })?;
            values.push(value.clone());
        }
        Ok(Point::new(values))
    }

    /// Inverse of resolution: the grid coordinates of `point`.
    pub fn coordinates_of(&self, point: &Point) -> Result<Vec<usize>, SpaceError> {
        self.check_arity(point.dimensions())?;
        self.axes
            .iter()
            .zip(point.values())
            .map(|(axis, value)| {
                axis.values
                    .iter()
                    .position(|v| v == value)
                    .ok_or_else(|| SpaceError::ValueNotInSpace {
                        property: axis.dimension.property.clone(),
                        value: value.to_string(),
                    })
            })
            .collect()
    }

    /// Whether the coordinates lie inside this space.
    pub fn contains(&self, coordinates: &[usize]) -> bool {
        coordinates.len() == self.bounds.len()
            && self
                .bounds
                .iter()
                .zip(coordinates)
                .all(|(b, &pos)| b.contains(pos))
    }

    /// True if any coordinate sits at its dimension's first or last position.
    pub fn is_on_border(&self, coordinates: &[usize]) -> Result<bool, SpaceError> {
        self.check_arity(coordinates.len())?;
        Ok(self
            .bounds
            .iter()
            .zip(coordinates)
            .any(|(b, &pos)| pos <= b.lo || pos >= b.hi))
    }

    /// The radius-1 neighborhood around `coordinates`.
    pub fn subspace(&self, coordinates: &[usize]) -> Result<ParameterSpace, SpaceError> {
        self.subspace_with_radius(coordinates, 1)
    }

    /// Neighborhood hyper-cube `[c - radius, c + radius]` in every dimension at
    /// once, clipped to this space's bounds.
    pub fn subspace_with_radius(
        &self,
        coordinates: &[usize],
        radius: usize,
    ) -> Result<ParameterSpace, SpaceError> {
        self.check_arity(coordinates.len())?;

        let mut bounds = Vec::with_capacity(self.bounds.len());
        for ((axis, parent), &center) in self.axes.iter().zip(&self.bounds).zip(coordinates) {
            if !parent.contains(center) {
                return Err(SpaceError::CoordinateOutOfRange {
                    property: axis.dimension.property.clone(),
                    position: center,
                    cardinality: axis.values.len(),
                });
            }
            bounds.push(AxisBounds {
                lo: center.saturating_sub(radius).max(parent.lo),
                hi: center.saturating_add(radius).min(parent.hi),
            });
        }

        Ok(Self {
            axes: Arc::clone(&self.axes),
            bounds,
        })
    }

    fn check_arity(&self, actual: usize) -> Result<(), SpaceError> {
        if actual != self.axes.len() {
            return Err(SpaceError::DimensionMismatch {
                expected: self.axes.len(),
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ParameterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Space (size {}):", self.size())?;
        for (axis, b) in self.axes.iter().zip(&self.bounds) {
            write!(
                f,
                " {} [{}..{}] = {}..{};",
                axis.dimension.property,
                axis.dimension.index_at(b.lo),
                axis.dimension.index_at(b.hi),
                axis.values[b.lo],
                axis.values[b.hi],
            )?;
        }
        Ok(())
    }
}

/// Row-major iterator over the cells of a space.
pub struct Cells<'a> {
    space: &'a ParameterSpace,
    next: Option<Vec<usize>>,
    ordinal: usize,
}

impl Iterator for Cells<'_> {
    type Item = GridCell;

    fn next(&mut self) -> Option<GridCell> {
        let coordinates = self.next.take()?;

        let values = self
            .space
            .axes
            .iter()
            .zip(&coordinates)
            .map(|(axis, &pos)| axis.values[pos].clone())
            .collect();

        // Odometer step: bump the last axis, carrying into earlier ones.
        let mut successor = coordinates.clone();
        let mut exhausted = true;
        for (pos, b) in successor.iter_mut().zip(&self.space.bounds).rev() {
            if *pos < b.hi {
                *pos += 1;
                exhausted = false;
                break;
            }
            *pos = b.lo;
        }
        if !exhausted {
            self.next = Some(successor);
        }

        let cell = GridCell {
            ordinal: self.ordinal,
            coordinates,
            point: Point::new(values),
        };
        self.ordinal += 1;
        Some(cell)
    }
}
