//! Ingest error types.

use thiserror::Error;

/// Result type for ingest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Ingest error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed XML.
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Well-formed XML that does not have the expected document shape.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The scan group already exists in the store.
    #[error("scan already ingested at {0}")]
    AlreadyIngested(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] wafermap_core::Error),
}
