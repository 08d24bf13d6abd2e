//! Canonical re-gridding of a store.
//!
//! The compacted store holds one group per canonical coordinate, named
//! `(x,y)`, with a narrow set of scalar fields per category:
//!
//! | category | fields                                            |
//! |----------|---------------------------------------------------|
//! | EDX      | `<symbol>` atomic percent                         |
//! | MOKE     | `coercivity_m0`                                   |
//! | XRD      | `<phase>_{A,B,C,phase_fraction}`, integrated pattern |
//!
//! Every field carries `units` and `HT_type`. Coordinates a category did
//! not measure get NaN fields modelled on the reference scan at `(0,0)`.

use crate::composition::{element_symbol, result_value};
use crate::discovery::{category_root, PositionIndex, REFERENCE_POSITION};
use std::collections::BTreeMap;
use wafermap_core::store::{join, HT_TYPE_ATTR};
use wafermap_core::units::{COERCIVITY_UNITS, COMPOSITION_UNITS, POSITION_UNITS};
use wafermap_core::{Category, DataValue, HierarchicalStore, Result, WaferPosition};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `HT_type` of the coordinate datasets.
pub const POSITION_HT_TYPE: &str = "position";

/// MOKE result kept in the canonical store.
pub const COERCIVITY_FIELD: &str = "coercivity_m0";

/// XRD phase quantities kept in the canonical store.
pub const PHASE_KEYS: [&str; 4] = ["A", "B", "C", "phase_fraction"];

/// Integrated detector pattern copied for XRD: source path, target name, units.
const INTEGRATED_PATTERN: [(&str, &str, &str); 2] = [
    ("CdTe_integrate/intensity", "CdTe_integrate_intensity", "arbitrary unit (a.u.)"),
    ("CdTe_integrate/q", "CdTe_integrate_q", "Angstrom^-1 (A^-1)"),
];

/// Fixed regular coordinate set, identical on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanonicalGrid {
    pub start: f64,
    /// Inclusive upper bound.
    pub stop: f64,
    pub step: f64,
}

impl Default for CanonicalGrid {
    fn default() -> Self {
        Self {
            start: -40.0,
            stop: 40.0,
            step: 5.0,
        }
    }
}

impl CanonicalGrid {
    #[must_use]
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    /// Axis values from `start` to `stop` inclusive.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn axis(&self) -> Vec<f64> {
        if self.step <= 0.0 || self.stop < self.start {
            return Vec::new();
        }
        let n = ((self.stop - self.start) / self.step + 1e-9).floor() as usize + 1;
        (0..n).map(|i| self.start + i as f64 * self.step).collect()
    }

    /// Every coordinate, x outer and y inner.
    #[must_use]
    pub fn coordinates(&self) -> Vec<WaferPosition> {
        let axis = self.axis();
        axis.iter()
            .flat_map(|&x| axis.iter().map(move |&y| WaferPosition::new(x, y).rounded()))
            .collect()
    }
}

/// Counts of what [`compact`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompactSummary {
    pub coordinates: usize,
    /// Coordinates filled from a measured scan, per category.
    pub measured: BTreeMap<Category, usize>,
    /// Coordinates filled with NaN, per category.
    pub filled: BTreeMap<Category, usize>,
}

struct Source<'a> {
    index: &'a PositionIndex,
    reference: Option<&'a str>,
}

fn write_field<T: HierarchicalStore>(
    target: &mut T,
    node: &str,
    name: &str,
    value: DataValue,
    units: Option<&str>,
    ht_type: &str,
) -> Result<()> {
    let path = join(node, name);
    target.write_with_units(&path, value, units)?;
    target.set_attr(&path, HT_TYPE_ATTR, ht_type)
}

/// Writes `x_pos`/`y_pos`, taken from the first category that measured
/// the coordinate.
fn write_coordinates<S: HierarchicalStore, T: HierarchicalStore>(
    source: &S,
    target: &mut T,
    node: &str,
    position: WaferPosition,
    indexes: &[PositionIndex],
) -> Result<()> {
    let instrument = indexes
        .iter()
        .find_map(|index| index.locate(position))
        .map(|group| join(group, "instrument"));

    for (name, fallback) in [("x_pos", position.x), ("y_pos", position.y)] {
        let (value, units) = match &instrument {
            Some(instrument) => {
                let path = join(instrument, name);
                (source.read(&path)?, source.units(&path)?)
            }
            None => (DataValue::Float(fallback), None),
        };
        let units = units.unwrap_or_else(|| POSITION_UNITS.to_string());
        write_field(target, node, name, value, Some(&units), POSITION_HT_TYPE)?;
    }
    Ok(())
}

fn write_edx<S: HierarchicalStore, T: HierarchicalStore>(
    source: &S,
    target: &mut T,
    node: &str,
    group: &str,
    reference: Option<&str>,
) -> Result<()> {
    let results = join(group, "results");
    for name in source.members(&results)? {
        let Some(symbol) = element_symbol(&name) else {
            continue;
        };
        let atom_percent = join(&join(&results, &name), "AtomPercent");
        if source.contains(&atom_percent) {
            let value = result_value(&source.read(&atom_percent)?, &atom_percent);
            let units = source.units(&atom_percent)?;
            write_field(target, node, symbol, value.into(), units.as_deref(), "edx")?;
            continue;
        }
        // Keep the field if the reference scan knows its units.
        let Some(reference) = reference else { continue };
        let reference_path = join(&join(&join(reference, "results"), &name), "AtomPercent");
        if source.contains(&reference_path) {
            let units = source.units(&reference_path)?;
            write_field(target, node, symbol, f64::NAN.into(), units.as_deref(), "edx")?;
        }
    }
    Ok(())
}

fn fill_edx<S: HierarchicalStore, T: HierarchicalStore>(
    source: &S,
    target: &mut T,
    node: &str,
    reference: &str,
) -> Result<()> {
    let results = join(reference, "results");
    for name in source.members(&results)? {
        if let Some(symbol) = element_symbol(&name) {
            let path = join(&join(&results, &name), "AtomPercent");
            let units = if source.contains(&path) {
                source.units(&path)?
            } else {
                None
            };
            let units = units.unwrap_or_else(|| COMPOSITION_UNITS.to_string());
            write_field(target, node, symbol, f64::NAN.into(), Some(&units), "edx")?;
        }
    }
    Ok(())
}

fn write_moke<S: HierarchicalStore, T: HierarchicalStore>(
    source: &S,
    target: &mut T,
    node: &str,
    group: &str,
    missing: bool,
) -> Result<()> {
    let coercivity = join(&join(group, "results"), COERCIVITY_FIELD);
    if !source.is_group(&coercivity) {
        return Ok(());
    }
    let value = if missing {
        f64::NAN
    } else {
        let mean = join(&coercivity, "mean");
        if !source.contains(&mean) || source.is_group(&mean) {
            log::debug!("{coercivity}: no mean, skipped");
            return Ok(());
        }
        result_value(&source.read(&mean)?, &mean)
    };
    write_field(target, node, COERCIVITY_FIELD, value.into(), Some(COERCIVITY_UNITS), "moke")
}

fn write_xrd<S: HierarchicalStore, T: HierarchicalStore>(
    source: &S,
    target: &mut T,
    node: &str,
    group: &str,
    missing: bool,
) -> Result<()> {
    let phases = join(group, "results/phases");
    if source.is_group(&phases) {
        for phase in source.members(&phases)? {
            for key in PHASE_KEYS {
                let path = join(&join(&phases, &phase), key);
                if !source.contains(&path) {
                    continue;
                }
                let value = if missing {
                    f64::NAN
                } else {
                    result_value(&source.read(&path)?, &path)
                };
                let units = source.units(&path)?;
                write_field(target, node, &format!("{phase}_{key}"), value.into(), units.as_deref(), "xrd")?;
            }
        }
    }
    if missing {
        return Ok(());
    }

    let measurement = join(group, "measurement");
    for (relative, name, units) in INTEGRATED_PATTERN {
        let path = join(&measurement, relative);
        if source.contains(&path) && !source.is_group(&path) {
            write_field(target, node, name, source.read(&path)?, Some(units), "xrd")?;
        }
    }
    Ok(())
}

/// Re-projects `source` onto `grid`, writing one `(x,y)` group per
/// coordinate into `target`.
///
/// Categories absent from `source` are skipped. A category without a
/// reference scan at `(0,0)` only writes the coordinates it measured.
///
/// # Errors
/// Propagates store errors; missing optional fields are not errors.
pub fn compact<S: HierarchicalStore, T: HierarchicalStore>(
    source: &S,
    target: &mut T,
    grid: &CanonicalGrid,
) -> Result<CompactSummary> {
    let mut indexes = Vec::new();
    for category in Category::ALL {
        if category_root(source, category).is_ok() {
            indexes.push(PositionIndex::build(source, category)?);
        }
    }
    let sources: Vec<Source<'_>> = indexes
        .iter()
        .map(|index| {
            let reference = index.locate(REFERENCE_POSITION);
            if reference.is_none() {
                log::warn!(
                    "{}: no reference scan at {}, unmeasured coordinates are left empty",
                    index.category(),
                    REFERENCE_POSITION.key()
                );
            }
            Source { index, reference }
        })
        .collect();

    let mut summary = CompactSummary::default();
    for position in grid.coordinates() {
        let node = join("/", &position.key());
        target.create_group(&node)?;
        write_coordinates(source, target, &node, position, &indexes)?;
        summary.coordinates += 1;

        for src in &sources {
            let (group, missing) = match (src.index.locate(position), src.reference) {
                (Some(group), _) => (group, false),
                (None, Some(reference)) => (reference, true),
                (None, None) => continue,
            };
            let category = src.index.category();
            match (category, missing) {
                (Category::Edx, false) => write_edx(source, target, &node, group, src.reference)?,
                (Category::Edx, true) => fill_edx(source, target, &node, group)?,
                (Category::Moke, _) => write_moke(source, target, &node, group, missing)?,
                (Category::Xrd, _) => write_xrd(source, target, &node, group, missing)?,
            }
            let counter = if missing {
                &mut summary.filled
            } else {
                &mut summary.measured
            };
            *counter.entry(category).or_default() += 1;
        }
    }

    log::info!(
        "compacted {} coordinates ({} categories)",
        summary.coordinates,
        sources.len()
    );
    Ok(summary)
}
