//! wafermap-ingest: Instrument export ingestion for wafermap.
//!
//! This crate normalizes vendor XML into [`wafermap_core::NormalizedTree`]s
//! and writes one position-addressed scan subtree per exported file.
//!

mod error;

pub mod edx;
pub mod normalize;
pub mod record;
pub mod spx;

pub use edx::{ingest_spx, write_spectrum, IngestConfig, IngestedScan, Placement};
pub use error::{Error, Result};
pub use normalize::{normalize, NormalizeConfig};
pub use record::{begin_scan, write_record, Field, ScanPaths, ScanRecord};
pub use spx::SpxDocument;
