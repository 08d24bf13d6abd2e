//! Parser for `value ± uncertainty` text produced by refinement software.
//!
//! Grammar, after trimming whitespace and byte-string wrappers (`b'...'`):
//!
//! ```text
//! measured := "UNDEF" | float [ "+-" float ]
//! ```

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Marker written by the refinement for parameters it could not fit.
pub const UNDEFINED_MARKER: &str = "UNDEF";

/// A refined quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Measured {
    Value { value: f64, uncertainty: Option<f64> },
    Undefined,
}

impl Measured {
    /// Parses a `value ± uncertainty` string.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the text matches neither form.
    pub fn parse(text: &str) -> Result<Self> {
        let body = strip_wrappers(text);
        if body.contains(UNDEFINED_MARKER) {
            return Ok(Self::Undefined);
        }

        let invalid = || Error::InvalidFormat(format!("not a `value +- uncertainty` string: {text:?}"));
        match body.split_once("+-") {
            Some((value, uncertainty)) => Ok(Self::Value {
                value: value.trim().parse().map_err(|_| invalid())?,
                uncertainty: Some(uncertainty.trim().parse().map_err(|_| invalid())?),
            }),
            None => Ok(Self::Value {
                value: body.parse().map_err(|_| invalid())?,
                uncertainty: None,
            }),
        }
    }

    /// Central value, NaN when undefined.
    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            Self::Value { value, .. } => *value,
            Self::Undefined => f64::NAN,
        }
    }
}

fn strip_wrappers(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(inner) = body.strip_prefix("b'") {
        body = inner;
    }
    body.trim_matches('\'').trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_value_with_uncertainty() {
        let m = Measured::parse("3.5231+-0.0004").unwrap();
        assert_eq!(
            m,
            Measured::Value {
                value: 3.5231,
                uncertainty: Some(0.0004)
            }
        );
    }

    #[test]
    fn test_byte_string_wrappers() {
        let m = Measured::parse("b'0.618+-0.02'").unwrap();
        assert_relative_eq!(m.value(), 0.618);
        let m = Measured::parse("  b'4.05 +- 0.01'  ").unwrap();
        assert_relative_eq!(m.value(), 4.05);
    }

    #[test]
    fn test_plain_value() {
        assert_relative_eq!(Measured::parse("2.87").unwrap().value(), 2.87);
    }

    #[test]
    fn test_undefined() {
        assert_eq!(Measured::parse("b'UNDEF'").unwrap(), Measured::Undefined);
        assert!(Measured::parse("UNDEF").unwrap().value().is_nan());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Measured::parse("n/a").is_err());
        assert!(Measured::parse("1.0+-x").is_err());
    }
}
