//! Position and unit discovery.
//!
//! Scan groups are found under the category root regardless of their
//! name; each one is located by the `instrument/x_pos` and
//! `instrument/y_pos` it holds, rounded to one decimal.

use std::collections::HashMap;
use wafermap_core::store::{join, HT_TYPE_ATTR};
use wafermap_core::{Category, Error, HierarchicalStore, Result, WaferPosition};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Members of a category root that do not hold position data.
pub const NON_DATA_GROUPS: [&str; 2] = ["scan_parameters", "alignment_scans"];

/// Reference position whose units describe the whole category.
pub const REFERENCE_POSITION: WaferPosition = WaferPosition { x: 0.0, y: 0.0 };

const ENTRY: &str = "/entry";

/// Finds the root group of a category by its `HT_type` attribute.
///
/// Groups under `/entry` are searched first, then top-level groups.
///
/// # Errors
/// Returns [`Error::Lookup`] if no group carries the category tag.
pub fn category_root<S: HierarchicalStore>(store: &S, category: Category) -> Result<String> {
    for parent in [ENTRY, "/"] {
        if !store.is_group(parent) {
            continue;
        }
        for name in store.members(parent)? {
            let path = join(parent, &name);
            if !store.is_group(&path) {
                continue;
            }
            if let Some(tag) = store.attr(&path, HT_TYPE_ATTR)? {
                if tag.eq_ignore_ascii_case(category.ht_type()) {
                    return Ok(path);
                }
            }
        }
    }
    Err(Error::Lookup(format!("data type {category} not found in store")))
}

/// Sorted mapping from rounded wafer positions to scan groups.
#[derive(Debug, Clone)]
pub struct PositionIndex {
    category: Category,
    root: String,
    entries: Vec<(WaferPosition, String)>,
    /// Position key to slot in `entries`.
    slots: HashMap<String, usize>,
}

/// Lookup key of a rounded position; `-0.0` and `0.0` share a key.
fn slot_key(position: WaferPosition) -> String {
    WaferPosition::new(position.x + 0.0, position.y + 0.0).key()
}

impl PositionIndex {
    /// Scans every scan group of a category.
    ///
    /// When two groups share a rounded position the later one (in member
    /// order) is kept.
    ///
    /// # Errors
    /// Returns [`Error::Lookup`] if the category is absent or a scan group
    /// lacks its position datasets.
    pub fn build<S: HierarchicalStore>(store: &S, category: Category) -> Result<Self> {
        let root = category_root(store, category)?;
        let mut entries: Vec<(WaferPosition, String)> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for name in store.members(&root)? {
            if NON_DATA_GROUPS.contains(&name.as_str()) {
                continue;
            }
            let group = join(&root, &name);
            if !store.is_group(&group) {
                continue;
            }
            let instrument = join(&group, "instrument");
            let position = WaferPosition::new(
                store.read_f64(&join(&instrument, "x_pos"))?,
                store.read_f64(&join(&instrument, "y_pos"))?,
            )
            .rounded();

            if let Some(&slot) = slots.get(&slot_key(position)) {
                log::debug!("{group} shares position {position} with {}", entries[slot].1);
                entries[slot].1 = group;
            } else {
                slots.insert(slot_key(position), entries.len());
                entries.push((position, group));
            }
        }
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (slot, (position, _)) in entries.iter().enumerate() {
            slots.insert(slot_key(*position), slot);
        }

        log::debug!("{category}: {} positions under {root}", entries.len());
        Ok(Self {
            category,
            root,
            entries,
            slots,
        })
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Path of the category root group.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Distinct positions, ascending by x then y.
    pub fn positions(&self) -> impl Iterator<Item = WaferPosition> + '_ {
        self.entries.iter().map(|(p, _)| *p)
    }

    /// Positions with their scan group paths.
    pub fn iter(&self) -> impl Iterator<Item = (WaferPosition, &str)> {
        self.entries.iter().map(|(p, g)| (*p, g.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scan group recorded at `position` (rounded to one decimal).
    #[must_use]
    pub fn locate(&self, position: WaferPosition) -> Option<&str> {
        self.slots
            .get(&slot_key(position.rounded()))
            .map(|&slot| self.entries[slot].1.as_str())
    }

    /// Sorted distinct x values.
    #[must_use]
    pub fn x_values(&self) -> Vec<f64> {
        distinct_sorted(self.entries.iter().map(|(p, _)| p.x))
    }

    /// Sorted distinct y values.
    #[must_use]
    pub fn y_values(&self) -> Vec<f64> {
        distinct_sorted(self.entries.iter().map(|(p, _)| p.y))
    }
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

/// Sorted distinct positions recorded for a category.
///
/// # Errors
/// See [`PositionIndex::build`].
pub fn list_positions<S: HierarchicalStore>(store: &S, category: Category) -> Result<Vec<WaferPosition>> {
    Ok(PositionIndex::build(store, category)?.positions().collect())
}

/// Units of the position axes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PositionUnits {
    pub x: String,
    pub y: String,
}

/// Reads the position units of a category from the scan at the reference
/// position `(0.0, 0.0)`.
///
/// # Errors
/// Returns [`Error::Lookup`] if the reference position is absent and
/// [`Error::MissingField`] if it carries no `units` attribute.
pub fn position_units<S: HierarchicalStore>(store: &S, index: &PositionIndex) -> Result<PositionUnits> {
    let scan = index.locate(REFERENCE_POSITION).ok_or_else(|| {
        Error::Lookup(format!(
            "reference position {} for {}",
            REFERENCE_POSITION.key(),
            index.category()
        ))
    })?;
    let instrument = join(scan, "instrument");
    let read = |field: &str| -> Result<String> {
        let path = join(&instrument, field);
        store
            .units(&path)?
            .ok_or_else(|| Error::missing(path.clone(), "units"))
    };
    Ok(PositionUnits {
        x: read("x_pos")?,
        y: read("y_pos")?,
    })
}

/// Convenience wrapper building the index first.
///
/// # Errors
/// See [`position_units`].
pub fn units_of<S: HierarchicalStore>(store: &S, category: Category) -> Result<PositionUnits> {
    let index = PositionIndex::build(store, category)?;
    position_units(store, &index)
}
