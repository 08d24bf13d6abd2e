//! Hierarchical store abstraction.
//!
//! Stores are trees of groups and datasets addressed by absolute,
//! slash-separated paths (`/entry/edx/scan_1,1/instrument/x_pos`). Both
//! groups and datasets carry string attributes such as `units` or
//! `HT_type`.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value held by a dataset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataValue {
    Float(f64),
    Int(i64),
    Text(String),
    FloatArray(Vec<f64>),
    IntArray(Vec<i64>),
}

impl DataValue {
    /// Best-effort numeric coercion: text that parses as a float becomes
    /// [`DataValue::Float`], anything else stays [`DataValue::Text`].
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(value) => Self::Float(value),
            Err(_) => Self::Text(text.to_string()),
        }
    }

    /// Scalar numeric value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Numeric values as a vector; scalars become a single element.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::Float(v) => Some(vec![*v]),
            Self::Int(v) => Some(vec![*v as f64]),
            Self::FloatArray(v) => Some(v.clone()),
            Self::IntArray(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for one-dimensional values.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::FloatArray(_) | Self::IntArray(_))
    }

    /// Short name of the value kind, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::FloatArray(_) => "float array",
            Self::IntArray(_) => "int array",
        }
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<f64>> for DataValue {
    fn from(value: Vec<f64>) -> Self {
        Self::FloatArray(value)
    }
}

impl From<Vec<i64>> for DataValue {
    fn from(value: Vec<i64>) -> Self {
        Self::IntArray(value)
    }
}

/// Name of the unit attribute.
pub const UNITS_ATTR: &str = "units";
/// Name of the category attribute.
pub const HT_TYPE_ATTR: &str = "HT_type";
/// Name of the group class attribute.
pub const NX_CLASS_ATTR: &str = "NX_class";

/// Tree-structured container of groups, datasets and string attributes.
///
/// Implementations are not required to be safe for concurrent writers.
pub trait HierarchicalStore {
    /// True if a group or dataset exists at `path`.
    fn contains(&self, path: &str) -> bool;

    /// True if `path` exists and is a group.
    fn is_group(&self, path: &str) -> bool;

    /// Creates a group and any missing parents. Existing groups are kept.
    ///
    /// # Errors
    /// Fails if a dataset already occupies `path` or one of its parents.
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Sorted names of the direct members of a group.
    ///
    /// # Errors
    /// Returns [`Error::Lookup`] if `path` is not a group.
    fn members(&self, path: &str) -> Result<Vec<String>>;

    /// Writes a dataset, replacing any existing dataset at `path`.
    /// The parent group must exist.
    ///
    /// # Errors
    /// Returns [`Error::Lookup`] if the parent group is absent.
    fn write(&mut self, path: &str, value: DataValue) -> Result<()>;

    /// Reads a dataset.
    ///
    /// # Errors
    /// Returns [`Error::Lookup`] if no dataset exists at `path`.
    fn read(&self, path: &str) -> Result<DataValue>;

    /// Sets a string attribute on a group or dataset.
    ///
    /// # Errors
    /// Returns [`Error::Lookup`] if `path` does not exist.
    fn set_attr(&mut self, path: &str, name: &str, value: &str) -> Result<()>;

    /// Reads a string attribute; `Ok(None)` if the object lacks it.
    ///
    /// # Errors
    /// Returns [`Error::Lookup`] if `path` does not exist.
    fn attr(&self, path: &str, name: &str) -> Result<Option<String>>;

    /// Moves a group or dataset to a new path inside the same store.
    ///
    /// # Errors
    /// Fails if `from` is absent or `to` already exists.
    fn move_node(&mut self, from: &str, to: &str) -> Result<()>;

    /// Removes a group (recursively) or dataset.
    ///
    /// # Errors
    /// Returns [`Error::Lookup`] if `path` does not exist.
    fn remove(&mut self, path: &str) -> Result<()>;

    /// Reads a numeric scalar dataset.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if the dataset is not a numeric scalar.
    fn read_f64(&self, path: &str) -> Result<f64> {
        self.read(path)?.as_f64().ok_or_else(|| Error::TypeMismatch {
            path: path.to_string(),
            expected: "numeric scalar",
        })
    }

    /// Writes a dataset and, when given, its `units` attribute.
    ///
    /// # Errors
    /// See [`HierarchicalStore::write`].
    fn write_with_units(&mut self, path: &str, value: DataValue, units: Option<&str>) -> Result<()> {
        self.write(path, value)?;
        if let Some(units) = units {
            self.set_attr(path, UNITS_ATTR, units)?;
        }
        Ok(())
    }

    /// Reads the `units` attribute of an object.
    ///
    /// # Errors
    /// See [`HierarchicalStore::attr`].
    fn units(&self, path: &str) -> Result<Option<String>> {
        self.attr(path, UNITS_ATTR)
    }
}

/// Joins a child name onto a group path.
#[must_use]
pub fn join(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{parent}/{name}")
}

/// Splits a path into its parent group and final component.
#[must_use]
pub fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("/", trimmed),
    }
}

/// Non-empty components of a path.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_is_best_effort() {
        assert_eq!(DataValue::from_text("0.42"), DataValue::Float(0.42));
        assert_eq!(DataValue::from_text(" 12 "), DataValue::Float(12.0));
        assert_eq!(
            DataValue::from_text("Fe"),
            DataValue::Text("Fe".to_string())
        );
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(DataValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(DataValue::from("x").as_f64(), None);
        assert_eq!(
            DataValue::IntArray(vec![1, 2]).to_f64_vec(),
            Some(vec![1.0, 2.0])
        );
        assert!(DataValue::FloatArray(vec![]).is_array());
        assert!(!DataValue::Float(1.0).is_array());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join("/entry/", "edx"), "/entry/edx");
        assert_eq!(join("/", "entry"), "/entry");
        assert_eq!(split_parent("/entry/edx/scan_1,1"), ("/entry/edx", "scan_1,1"));
        assert_eq!(split_parent("/entry"), ("/", "entry"));
        let parts: Vec<_> = components("/entry//edx/").collect();
        assert_eq!(parts, ["entry", "edx"]);
    }
}
