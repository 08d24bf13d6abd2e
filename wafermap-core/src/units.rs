//! Physical units of spectrum header and result fields.

/// Returns the unit of a known field, or `None` when the field carries no
/// unit attribute.
#[must_use]
pub fn units_for(field: &str) -> Option<&'static str> {
    match field {
        "PrimaryEnergy" | "CalibAbs" | "CalibLin" => Some("keV"),
        "WorkingDistance" | "DetectorThickness" | "SiDeadLayerThickness" => Some("mm"),
        "DetectorTemperature" => Some("°C"),
        "AtomPercent" => Some("at.%"),
        "MassPercent" => Some("mass.%"),
        _ => None,
    }
}

/// Unit of wafer positions.
pub const POSITION_UNITS: &str = "mm";
/// Unit of raw spectrum channel counts.
pub const COUNTS_UNITS: &str = "cps";
/// Unit of the derived energy axis.
pub const ENERGY_UNITS: &str = "keV";
/// Unit of the MOKE coercive field in the canonical store.
pub const COERCIVITY_UNITS: &str = "Tesla (T)";
/// Unit of EDX composition in the canonical store.
pub const COMPOSITION_UNITS: &str = "at.%";
