//! Measurement categories.

use crate::Error;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One of the measurement modalities recorded on a wafer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Category {
    /// Energy-dispersive X-ray spectroscopy.
    Edx,
    /// Magneto-optic Kerr effect.
    Moke,
    /// X-ray diffraction.
    Xrd,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Edx, Category::Moke, Category::Xrd];

    /// Value of the `HT_type` attribute identifying the category root.
    #[must_use]
    pub fn ht_type(self) -> &'static str {
        match self {
            Self::Edx => "edx",
            Self::Moke => "moke",
            Self::Xrd => "xrd",
        }
    }

    /// Default root group of the category in an ingested store.
    #[must_use]
    pub fn root_path(self) -> String {
        format!("/entry/{}", self.ht_type())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ht_type().to_uppercase())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "edx" => Ok(Self::Edx),
            "moke" => Ok(Self::Moke),
            "xrd" => Ok(Self::Xrd),
            _ => Err(Error::InvalidFormat(format!(
                "unknown category {s:?}, expected one of edx, moke, xrd"
            ))),
        }
    }
}
