//! wafermap-grid: Query path for wafermap stores.
//!
//! Discovers the positions recorded for a category, assembles dense
//! `(y, x[, extra])` grids from the per-position results and measurements,
//! and re-projects a store onto the fixed canonical grid.
//!

pub mod assemble;
pub mod compact;
pub mod composition;
pub mod config;
pub mod dataset;
pub mod discovery;

pub use assemble::{
    collect_fields, measurement_grid, measurement_tree, position_measurement, position_results,
    FieldEntry,
};
pub use compact::{compact, CanonicalGrid, CompactSummary};
pub use composition::{composition_at, full_dataset};
pub use config::{EdgePolicy, GridConfig, MismatchPolicy};
pub use dataset::{Axis, FieldValue, GridField, GriddedDataset, Scatter};
pub use discovery::{
    category_root, list_positions, position_units, units_of, PositionIndex, PositionUnits,
};
