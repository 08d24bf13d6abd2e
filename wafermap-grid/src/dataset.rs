//! Dense, position-indexed labeled arrays.

use crate::config::MismatchPolicy;
use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeMap;
use wafermap_core::{Error, Result, WaferPosition};

/// Tolerance used to match a position onto an axis value.
const AXIS_TOLERANCE: f64 = 1e-6;

/// A labeled coordinate axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub name: String,
    pub values: Vec<f64>,
    pub units: Option<String>,
}

impl Axis {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            units: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the axis value matching `value`.
    #[must_use]
    pub fn index_of(&self, value: f64) -> Option<usize> {
        self.values
            .iter()
            .position(|v| (v - value).abs() < AXIS_TOLERANCE)
    }
}

/// Value fetched for one field at one position.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl FieldValue {
    /// True if the value holds no data (NaN scalar or all-NaN vector).
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Scalar(v) => v.is_nan(),
            Self::Vector(v) => v.iter().all(|x| x.is_nan()),
        }
    }
}

/// One field of a gridded dataset: dims `(y, x)` or `(y, x, extra)`.
#[derive(Debug, Clone)]
pub struct GridField {
    pub data: ArrayD<f64>,
    pub extra_axis: Option<Axis>,
    pub units: Option<String>,
}

impl GridField {
    /// Value at `(iy, ix)` for a scalar field.
    #[must_use]
    pub fn scalar_at(&self, iy: usize, ix: usize) -> Option<f64> {
        if self.extra_axis.is_some() {
            return None;
        }
        self.data.get(IxDyn(&[iy, ix])).copied()
    }

    /// Number of non-NaN entries.
    #[must_use]
    pub fn count_present(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Outcome of a scatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scatter {
    Written,
    /// Missing value for a field that was never allocated.
    Skipped,
    /// Position or value did not fit the grid.
    Dropped,
}

/// Collection of fields sharing the `y` and `x` axes.
#[derive(Debug, Clone)]
pub struct GriddedDataset {
    pub x: Axis,
    pub y: Axis,
    fields: BTreeMap<String, GridField>,
    dropped: usize,
}

impl GriddedDataset {
    /// Creates an empty dataset over the given position axes.
    #[must_use]
    pub fn new(x_values: Vec<f64>, y_values: Vec<f64>) -> Self {
        Self {
            x: Axis::new("x", x_values),
            y: Axis::new("y", y_values),
            fields: BTreeMap::new(),
            dropped: 0,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&GridField> {
        self.fields.get(name)
    }

    /// Fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &GridField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of values dropped because they did not fit the grid.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Value of a scalar field at a position.
    #[must_use]
    pub fn scalar(&self, name: &str, position: WaferPosition) -> Option<f64> {
        let iy = self.y.index_of(position.y)?;
        let ix = self.x.index_of(position.x)?;
        self.fields.get(name)?.scalar_at(iy, ix)
    }

    /// Scatters a value, allocating the field on first sight even when the
    /// value is missing.
    ///
    /// # Errors
    /// Returns [`Error::SchemaMismatch`] under [`MismatchPolicy::Error`].
    pub fn scatter(
        &mut self,
        name: &str,
        position: WaferPosition,
        value: &FieldValue,
        units: Option<&str>,
        policy: MismatchPolicy,
    ) -> Result<Scatter> {
        self.scatter_inner(name, position, value, units, policy, true)
    }

    /// Scatters a value, allocating the field only once a non-missing value
    /// is seen.
    ///
    /// # Errors
    /// See [`GriddedDataset::scatter`].
    pub fn scatter_present(
        &mut self,
        name: &str,
        position: WaferPosition,
        value: &FieldValue,
        units: Option<&str>,
        policy: MismatchPolicy,
    ) -> Result<Scatter> {
        self.scatter_inner(name, position, value, units, policy, false)
    }

    fn scatter_inner(
        &mut self,
        name: &str,
        position: WaferPosition,
        value: &FieldValue,
        units: Option<&str>,
        policy: MismatchPolicy,
        allocate_missing: bool,
    ) -> Result<Scatter> {
        let missing = value.is_missing();
        if !self.fields.contains_key(name) && missing && !allocate_missing {
            return Ok(Scatter::Skipped);
        }

        let (Some(iy), Some(ix)) = (self.y.index_of(position.y), self.x.index_of(position.x)) else {
            log::warn!("{name}: position {position} is not on the grid axes, value dropped");
            self.dropped += 1;
            return Ok(Scatter::Dropped);
        };

        let (ny, nx) = (self.y.len(), self.x.len());
        let field = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| allocate(name, ny, nx, value));

        if field.units.is_none() && !missing {
            field.units = units.map(str::to_string);
        }

        match (value, &field.extra_axis) {
            (FieldValue::Scalar(v), None) => {
                field.data[IxDyn(&[iy, ix])] = *v;
                Ok(Scatter::Written)
            }
            (FieldValue::Vector(values), Some(axis)) if values.len() == axis.len() => {
                for (k, v) in values.iter().enumerate() {
                    field.data[IxDyn(&[iy, ix, k])] = *v;
                }
                Ok(Scatter::Written)
            }
            (value, axis) => {
                let expected = axis.as_ref().map_or(1, Axis::len);
                let found = match value {
                    FieldValue::Scalar(_) => 1,
                    FieldValue::Vector(v) => v.len(),
                };
                match policy {
                    MismatchPolicy::Error => Err(Error::SchemaMismatch {
                        field: name.to_string(),
                        expected,
                        found,
                    }),
                    MismatchPolicy::Warn => {
                        log::warn!(
                            "{name}: value at {position} has {found} entries, axis has {expected}; dropped"
                        );
                        self.dropped += 1;
                        Ok(Scatter::Dropped)
                    }
                }
            }
        }
    }
}

/// New NaN-filled field; a vector's first value becomes the extra axis.
fn allocate(name: &str, ny: usize, nx: usize, value: &FieldValue) -> GridField {
    match value {
        FieldValue::Scalar(_) => GridField {
            data: ArrayD::from_elem(IxDyn(&[ny, nx]), f64::NAN),
            extra_axis: None,
            units: None,
        },
        FieldValue::Vector(values) => GridField {
            data: ArrayD::from_elem(IxDyn(&[ny, nx, values.len()]), f64::NAN),
            extra_axis: Some(Axis::new(name, values.clone())),
            units: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> GriddedDataset {
        GriddedDataset::new(vec![-5.0, 0.0, 5.0], vec![-5.0, 0.0])
    }

    #[test]
    fn test_scalar_scatter() {
        let mut ds = dataset();
        let pos = WaferPosition::new(5.0, -5.0);
        let out = ds
            .scatter("Fe", pos, &FieldValue::Scalar(42.0), Some("at.%"), MismatchPolicy::Warn)
            .unwrap();
        assert_eq!(out, Scatter::Written);

        let field = ds.field("Fe").unwrap();
        assert_eq!(field.data.shape(), &[2, 3]);
        assert_eq!(field.count_present(), 1);
        assert_eq!(field.units.as_deref(), Some("at.%"));
        assert_eq!(ds.scalar("Fe", pos), Some(42.0));
        assert!(ds.scalar("Fe", WaferPosition::new(0.0, 0.0)).unwrap().is_nan());
    }

    #[test]
    fn test_vector_axis_fixed_by_first_value() {
        let mut ds = dataset();
        let first = FieldValue::Vector(vec![1.0, 2.0, 3.0]);
        ds.scatter("counts", WaferPosition::new(0.0, 0.0), &first, None, MismatchPolicy::Warn)
            .unwrap();

        let field = ds.field("counts").unwrap();
        assert_eq!(field.data.shape(), &[2, 3, 3]);
        let axis = field.extra_axis.as_ref().unwrap();
        assert_eq!(axis.name, "counts");
        assert_eq!(axis.values, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_length_mismatch_warns_and_drops() {
        let mut ds = dataset();
        ds.scatter(
            "counts",
            WaferPosition::new(0.0, 0.0),
            &FieldValue::Vector(vec![1.0, 2.0]),
            None,
            MismatchPolicy::Warn,
        )
        .unwrap();
        let out = ds
            .scatter(
                "counts",
                WaferPosition::new(5.0, 0.0),
                &FieldValue::Vector(vec![1.0, 2.0, 3.0]),
                None,
                MismatchPolicy::Warn,
            )
            .unwrap();
        assert_eq!(out, Scatter::Dropped);
        assert_eq!(ds.dropped(), 1);
        assert_eq!(ds.field("counts").unwrap().count_present(), 2);
    }

    #[test]
    fn test_length_mismatch_error_policy() {
        let mut ds = dataset();
        let pos = WaferPosition::new(0.0, 0.0);
        ds.scatter("q", pos, &FieldValue::Vector(vec![1.0]), None, MismatchPolicy::Error)
            .unwrap();
        let err = ds
            .scatter("q", pos, &FieldValue::Scalar(1.0), None, MismatchPolicy::Error)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaMismatch {
                expected: 1,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_scatter_present_defers_allocation() {
        let mut ds = dataset();
        let out = ds
            .scatter_present(
                "Co",
                WaferPosition::new(0.0, 0.0),
                &FieldValue::Scalar(f64::NAN),
                Some("at.%"),
                MismatchPolicy::Warn,
            )
            .unwrap();
        assert_eq!(out, Scatter::Skipped);
        assert!(ds.field("Co").is_none());

        ds.scatter_present(
            "Co",
            WaferPosition::new(-5.0, 0.0),
            &FieldValue::Scalar(10.0),
            Some("at.%"),
            MismatchPolicy::Warn,
        )
        .unwrap();
        ds.scatter_present(
            "Co",
            WaferPosition::new(5.0, 0.0),
            &FieldValue::Scalar(f64::NAN),
            Some("wt.%"),
            MismatchPolicy::Warn,
        )
        .unwrap();
        let field = ds.field("Co").unwrap();
        assert_eq!(field.count_present(), 1);
        assert_eq!(field.units.as_deref(), Some("at.%"));
    }

    #[test]
    fn test_first_present_unit_wins() {
        let mut ds = dataset();
        let a = WaferPosition::new(-5.0, -5.0);
        let b = WaferPosition::new(0.0, -5.0);
        ds.scatter("Hc", a, &FieldValue::Scalar(f64::NAN), Some("mT"), MismatchPolicy::Warn)
            .unwrap();
        ds.scatter("Hc", b, &FieldValue::Scalar(1.0), Some("T"), MismatchPolicy::Warn)
            .unwrap();
        ds.scatter("Hc", a, &FieldValue::Scalar(2.0), Some("mT"), MismatchPolicy::Warn)
            .unwrap();
        assert_eq!(ds.field("Hc").unwrap().units.as_deref(), Some("T"));
    }

    #[test]
    fn test_off_axis_position_is_dropped() {
        let mut ds = dataset();
        let out = ds
            .scatter(
                "Fe",
                WaferPosition::new(10.0, 0.0),
                &FieldValue::Scalar(1.0),
                None,
                MismatchPolicy::Error,
            )
            .unwrap();
        assert_eq!(out, Scatter::Dropped);
        assert!(ds.is_empty());
    }
}
