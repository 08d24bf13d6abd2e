//! Grid assembly configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default Manhattan cutoff (mm) beyond which positions lie on the wafer edge.
pub const DEFAULT_EDGE_CUTOFF: f64 = 60.0;

/// How the edge cutoff itself is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EdgePolicy {
    /// `|x| + |y| >= cutoff` is excluded.
    #[default]
    Inclusive,
    /// `|x| + |y| > cutoff` is excluded.
    Exclusive,
}

/// What to do when a vector value does not fit its field's axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MismatchPolicy {
    /// Log a warning and leave the position unfilled.
    #[default]
    Warn,
    /// Abort with `SchemaMismatch`.
    Error,
}

/// Configuration for grid assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridConfig {
    /// Skip positions on the wafer edge.
    pub exclude_edges: bool,
    /// Manhattan distance (mm) of the edge.
    pub edge_cutoff: f64,
    pub edge_policy: EdgePolicy,
    pub mismatch_policy: MismatchPolicy,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::composition()
    }
}

impl GridConfig {
    /// Preset of the dataset-wide composition grid (`>=` cutoff).
    #[must_use]
    pub fn composition() -> Self {
        Self {
            exclude_edges: true,
            edge_cutoff: DEFAULT_EDGE_CUTOFF,
            edge_policy: EdgePolicy::Inclusive,
            mismatch_policy: MismatchPolicy::Warn,
        }
    }

    /// Preset of the per-category measurement grids (`>` cutoff).
    #[must_use]
    pub fn measurement() -> Self {
        Self {
            edge_policy: EdgePolicy::Exclusive,
            ..Self::composition()
        }
    }

    /// Sets whether edge positions are skipped.
    #[must_use]
    pub fn with_exclude_edges(mut self, exclude: bool) -> Self {
        self.exclude_edges = exclude;
        self
    }

    /// Sets the edge cutoff distance.
    #[must_use]
    pub fn with_edge_cutoff(mut self, cutoff: f64) -> Self {
        self.edge_cutoff = cutoff;
        self
    }

    /// Sets the edge comparator.
    #[must_use]
    pub fn with_edge_policy(mut self, policy: EdgePolicy) -> Self {
        self.edge_policy = policy;
        self
    }

    /// Sets the axis mismatch policy.
    #[must_use]
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    /// True if a position at `(x, y)` is skipped.
    #[must_use]
    pub fn excludes(&self, x: f64, y: f64) -> bool {
        if !self.exclude_edges {
            return false;
        }
        let distance = x.abs() + y.abs();
        match self.edge_policy {
            EdgePolicy::Inclusive => distance >= self.edge_cutoff,
            EdgePolicy::Exclusive => distance > self.edge_cutoff,
        }
    }
}
