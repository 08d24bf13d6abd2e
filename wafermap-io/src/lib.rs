//! wafermap-io: File-level entry points for wafermap.
//!
//! This crate provides batch ingest of spectrum files into any store and,
//! with the `hdf5` feature, an HDF5 implementation of the hierarchical
//! store together with scoped file-level ingest, query and compaction.
//!

pub mod batch;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;

pub use batch::{collect_spx_files, ingest_batch, BatchReport, FailurePolicy};
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use crate::hdf5::{compact_file, ingest_files, with_store, Hdf5Store, OpenMode};
