//! Scan identity and wafer geometry.
//!
//! Instruments name their exports after the discrete scan cell, e.g.
//! `Sample 3 (4,7).spx`. The cell indices map onto physical wafer
//! coordinates through a fixed affine transform.

use crate::{Error, Result};
use std::fmt;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Discrete scan cell, 1-based on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanIndex {
    pub x: u32,
    pub y: u32,
}

impl ScanIndex {
    /// Creates a scan index, rejecting zero indices.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if either index is zero.
    pub fn new(x: u32, y: u32) -> Result<Self> {
        if x == 0 || y == 0 {
            return Err(Error::InvalidFormat(format!(
                "scan indices are 1-based, got ({x},{y})"
            )));
        }
        Ok(Self { x, y })
    }

    /// Parses the scan index embedded in a file name as `(<x>,<y>).<ext>`.
    ///
    /// Only the file name component of `path` is considered.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the pattern is absent or the
    /// indices are not positive integers.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidFormat(format!("no file name in {}", path.display())))?;
        Self::from_file_name(name)
    }

    /// Parses the scan index from a bare file name.
    ///
    /// # Errors
    /// See [`ScanIndex::from_path`].
    pub fn from_file_name(name: &str) -> Result<Self> {
        let invalid = || Error::InvalidFormat(format!("no `(<x>,<y>).<ext>` scan index in {name:?}"));

        let (stem, _ext) = name.rsplit_once('.').ok_or_else(invalid)?;
        let open = stem.rfind('(').ok_or_else(invalid)?;
        let inner = stem[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
        let (x, y) = inner.split_once(',').ok_or_else(invalid)?;

        let x: u32 = x.trim().parse().map_err(|_| invalid())?;
        let y: u32 = y.trim().parse().map_err(|_| invalid())?;
        Self::new(x, y)
    }

    /// Builds a file name following the embedding convention.
    #[must_use]
    pub fn file_name(&self, prefix: &str, extension: &str) -> String {
        format!("{prefix}({},{}).{extension}", self.x, self.y)
    }

    /// Name of the scan group in the store, `scan_<x>,<y>`.
    #[must_use]
    pub fn group_name(&self) -> String {
        format!("scan_{},{}", self.x, self.y)
    }
}

impl fmt::Display for ScanIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Physical position on the wafer in millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WaferPosition {
    pub x: f64,
    pub y: f64,
}

impl WaferPosition {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rounds both coordinates to one decimal.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            x: round_1(self.x),
            y: round_1(self.y),
        }
    }

    /// Manhattan distance to the wafer center.
    #[must_use]
    pub fn manhattan(self) -> f64 {
        self.x.abs() + self.y.abs()
    }

    /// Position-named group key, `(x.x,y.y)`.
    #[must_use]
    pub fn key(self) -> String {
        format!("({:.1},{:.1})", self.x, self.y)
    }

    /// Total order on (x, y), used for sorting discovered positions.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

impl fmt::Display for WaferPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}) mm", self.x, self.y)
    }
}

// `+ 0.0` folds negative zero so `(-0.0, x)` and `(0.0, x)` share a key.
fn round_1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0 + 0.0
}

/// Affine transform from scan indices to wafer millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometryConfig {
    /// Step between adjacent cells along x (mm).
    pub step_x: f64,
    /// Step between adjacent cells along y (mm).
    pub step_y: f64,
    /// Position of cell index 1 along x (mm).
    pub start_x: f64,
    /// Position of cell index 1 along y (mm).
    pub start_y: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            step_x: 5.0,
            step_y: 5.0,
            start_x: -40.0,
            start_y: -40.0,
        }
    }
}

impl GeometryConfig {
    /// Creates a geometry with the default 5 mm grid centered on the wafer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the step sizes.
    pub fn with_step(mut self, step_x: f64, step_y: f64) -> Self {
        self.step_x = step_x;
        self.step_y = step_y;
        self
    }

    /// Sets the origin offsets.
    pub fn with_start(mut self, start_x: f64, start_y: f64) -> Self {
        self.start_x = start_x;
        self.start_y = start_y;
        self
    }

    /// Maps a scan index to its wafer position: `(idx - 1) * step + start`.
    #[must_use]
    pub fn position(&self, scan: ScanIndex) -> WaferPosition {
        WaferPosition {
            x: (f64::from(scan.x) - 1.0) * self.step_x + self.start_x,
            y: (f64::from(scan.y) - 1.0) * self.step_y + self.start_y,
        }
    }
}
