//! Error types for wafermap-core.

use thiserror::Error;

/// Result type alias for wafermap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for wafermap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input (file name, document, stored value) does not have the expected shape.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A required field is absent.
    #[error("missing field `{field}` in `{group}`")]
    MissingField { group: String, field: String },

    /// A vector value does not fit the axis allocated for its field.
    #[error("axis length mismatch for `{field}`: axis has {expected} entries, value has {found}")]
    SchemaMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    /// Requested category, position or path is absent from the store.
    #[error("not found: {0}")]
    Lookup(String),

    /// A dataset holds a different kind of value than requested.
    #[error("type mismatch at `{path}`: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    /// Error raised by a store backend.
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Shorthand for a [`Error::MissingField`].
    pub fn missing(group: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            group: group.into(),
            field: field.into(),
        }
    }
}
