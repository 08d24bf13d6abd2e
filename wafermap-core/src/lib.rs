//! wafermap-core: Core data model for high-throughput wafer characterization.
//!
//! This crate provides scan geometry, the unit table, the normalized
//! instrument tree, the `value ± uncertainty` parser and the hierarchical
//! store abstraction shared by the ingest and query paths.
//!

pub mod category;
pub mod error;
pub mod geometry;
pub mod measured;
pub mod memory;
pub mod store;
pub mod tree;
pub mod units;

pub use category::Category;
pub use error::{Error, Result};
pub use geometry::{GeometryConfig, ScanIndex, WaferPosition};
pub use measured::Measured;
pub use memory::MemoryStore;
pub use store::{DataValue, HierarchicalStore};
pub use tree::{NormalizedTree, TreeNode};
pub use units::units_for;
