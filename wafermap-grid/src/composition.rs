//! Dataset-wide composition grid.
//!
//! Combines EDX composition, MOKE scalar results and XRD refinement
//! results onto the EDX position axes. Fields are allocated on their
//! first non-missing value, except MOKE results which are always kept.

use crate::assemble::attach_position_units;
use crate::config::GridConfig;
use crate::dataset::{FieldValue, GriddedDataset};
use crate::discovery::{category_root, PositionIndex};
use wafermap_core::store::join;
use wafermap_core::{Category, DataValue, HierarchicalStore, Measured, Result, WaferPosition};

/// Prefix of EDX result groups holding one element.
pub const ELEMENT_PREFIX: &str = "Element";

/// Refined XRD quantities and their grid labels.
const PHASE_FIELDS: [(&str, &str); 4] = [
    ("phase_fraction", "Phase Fraction"),
    ("A", "Lattice Parameter A"),
    ("B", "Lattice Parameter B"),
    ("C", "Lattice Parameter C"),
];

/// Numeric value of a stored result; text goes through the
/// `value ± uncertainty` parser and unparseable text is NaN.
pub(crate) fn result_value(value: &DataValue, path: &str) -> f64 {
    if let Some(v) = value.as_f64() {
        return v;
    }
    match value.as_text().map(Measured::parse) {
        Some(Ok(measured)) => measured.value(),
        Some(Err(err)) => {
            log::warn!("{path}: {err}");
            f64::NAN
        }
        None => {
            log::warn!("{path}: expected a scalar, found {}", value.kind());
            f64::NAN
        }
    }
}

/// Reads a result dataset if it exists, with its units.
fn read_optional<S: HierarchicalStore>(store: &S, path: &str) -> Result<Option<(f64, Option<String>)>> {
    if !store.contains(path) || store.is_group(path) {
        return Ok(None);
    }
    let value = result_value(&store.read(path)?, path);
    Ok(Some((value, store.units(path)?)))
}

/// Element symbol of an EDX result group, e.g. `Fe` for `Element Fe`.
#[must_use]
pub fn element_symbol(group: &str) -> Option<&str> {
    if !group.contains(ELEMENT_PREFIX) {
        return None;
    }
    group.split(' ').next_back().filter(|s| !s.is_empty())
}

fn scatter_edx<S: HierarchicalStore>(
    store: &S,
    dataset: &mut GriddedDataset,
    index: &PositionIndex,
    config: &GridConfig,
) -> Result<()> {
    for (position, group) in index.iter() {
        if config.excludes(position.x, position.y) {
            continue;
        }
        let results = join(group, "results");
        for name in store.members(&results)? {
            let Some(symbol) = element_symbol(&name) else {
                continue;
            };
            let (value, units) =
                read_optional(store, &join(&join(&results, &name), "AtomPercent"))?.unwrap_or((f64::NAN, None));
            dataset.scatter_present(
                &format!("{symbol} Composition"),
                position,
                &FieldValue::Scalar(value),
                units.as_deref(),
                config.mismatch_policy,
            )?;
        }
    }
    Ok(())
}

fn scatter_moke<S: HierarchicalStore>(
    store: &S,
    dataset: &mut GriddedDataset,
    index: &PositionIndex,
    config: &GridConfig,
) -> Result<()> {
    for (position, group) in index.iter() {
        if config.excludes(position.x, position.y) {
            continue;
        }
        let results = join(group, "results");
        for name in store.members(&results)? {
            let path = join(&results, &name);
            let found = if store.is_group(&path) {
                read_optional(store, &join(&path, "mean"))?
            } else {
                read_optional(store, &path)?
            };
            let Some((value, units)) = found else {
                continue;
            };
            dataset.scatter(
                &name,
                position,
                &FieldValue::Scalar(value),
                units.as_deref(),
                config.mismatch_policy,
            )?;
        }
    }
    Ok(())
}

fn scatter_xrd<S: HierarchicalStore>(
    store: &S,
    dataset: &mut GriddedDataset,
    index: &PositionIndex,
    config: &GridConfig,
) -> Result<()> {
    for (position, group) in index.iter() {
        if config.excludes(position.x, position.y) {
            continue;
        }
        let phases = join(group, "results/phases");
        if !store.is_group(&phases) {
            continue;
        }
        for phase in store.members(&phases)? {
            let base = join(&phases, &phase);
            for (key, label) in PHASE_FIELDS {
                let (value, units) = read_optional(store, &join(&base, key))?.unwrap_or((f64::NAN, None));
                dataset.scatter_present(
                    &format!("{phase} {label}"),
                    position,
                    &FieldValue::Scalar(value),
                    units.as_deref(),
                    config.mismatch_policy,
                )?;
            }
        }
    }
    Ok(())
}

/// Builds the composition grid: one field per element, MOKE result and
/// XRD phase quantity, on the EDX `(y, x)` axes.
///
/// MOKE and XRD are optional; positions they hold outside the EDX axes
/// are dropped with a warning.
///
/// # Errors
/// Returns [`wafermap_core::Error::Lookup`] if the store holds no EDX data.
pub fn full_dataset<S: HierarchicalStore>(store: &S, config: &GridConfig) -> Result<GriddedDataset> {
    let edx = PositionIndex::build(store, Category::Edx)?;
    let mut dataset = GriddedDataset::new(edx.x_values(), edx.y_values());
    scatter_edx(store, &mut dataset, &edx, config)?;

    for category in [Category::Moke, Category::Xrd] {
        if category_root(store, category).is_err() {
            log::info!("no {category} data, skipped in full dataset");
            continue;
        }
        let index = PositionIndex::build(store, category)?;
        match category {
            Category::Moke => scatter_moke(store, &mut dataset, &index, config)?,
            _ => scatter_xrd(store, &mut dataset, &index, config)?,
        }
    }

    attach_position_units(store, &edx, &mut dataset)?;
    log::info!(
        "full dataset: {} fields over {} EDX positions",
        dataset.len(),
        edx.len()
    );
    Ok(dataset)
}

/// Composition of one element at one position, NaN when absent.
#[must_use]
pub fn composition_at(dataset: &GriddedDataset, symbol: &str, position: WaferPosition) -> f64 {
    dataset
        .scalar(&format!("{symbol} Composition"), position)
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use wafermap_core::store::HT_TYPE_ATTR;
    use wafermap_core::MemoryStore;

    fn scan(store: &mut MemoryStore, category: &str, x: f64, y: f64) -> String {
        let root = format!("/entry/{category}");
        if !store.contains(&root) {
            store.create_group(&root).unwrap();
            store.set_attr(&root, HT_TYPE_ATTR, category).unwrap();
        }
        let base = format!("{root}/({x:.1},{y:.1})");
        store.create_group(&format!("{base}/instrument")).unwrap();
        store.create_group(&format!("{base}/results")).unwrap();
        store
            .write_with_units(&format!("{base}/instrument/x_pos"), x.into(), Some("mm"))
            .unwrap();
        store
            .write_with_units(&format!("{base}/instrument/y_pos"), y.into(), Some("mm"))
            .unwrap();
        format!("{base}/results")
    }

    fn element(store: &mut MemoryStore, results: &str, symbol: &str, atom_percent: Option<f64>) {
        let group = format!("{results}/Element {symbol}");
        store.create_group(&group).unwrap();
        store.write(&format!("{group}/Net"), 1200.0.into()).unwrap();
        if let Some(v) = atom_percent {
            store
                .write_with_units(&format!("{group}/AtomPercent"), v.into(), Some("at.%"))
                .unwrap();
        }
    }

    fn edx_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (x, y, fe) in [(0.0, 0.0, 60.0), (5.0, 0.0, 55.0), (30.0, 30.0, 10.0)] {
            let results = scan(&mut store, "edx", x, y);
            element(&mut store, &results, "Fe", Some(fe));
            element(&mut store, &results, "O", None);
        }
        store
    }

    #[test]
    fn test_element_symbol() {
        assert_eq!(element_symbol("Element Fe"), Some("Fe"));
        assert_eq!(element_symbol("TRTResult"), None);
    }

    #[test]
    fn test_result_value_parses_text() {
        assert_relative_eq!(result_value(&DataValue::from("8.391+-0.002"), "A"), 8.391);
        assert!(result_value(&DataValue::from("b'UNDEF'"), "A").is_nan());
        assert!(result_value(&DataValue::from("n/a"), "A").is_nan());
        assert_relative_eq!(result_value(&DataValue::Int(3), "A"), 3.0);
    }

    #[test]
    fn test_edx_composition() {
        let store = edx_store();
        let ds = full_dataset(&store, &GridConfig::composition()).unwrap();

        // O never carries AtomPercent, so it is never allocated
        assert!(ds.field("O Composition").is_none());
        let fe = ds.field("Fe Composition").unwrap();
        assert_eq!(fe.units.as_deref(), Some("at.%"));
        assert_relative_eq!(composition_at(&ds, "Fe", WaferPosition::new(5.0, 0.0)), 55.0);
        // |30| + |30| = 60 is excluded by the composition preset
        assert!(composition_at(&ds, "Fe", WaferPosition::new(30.0, 30.0)).is_nan());
        assert_eq!(ds.x.units.as_deref(), Some("mm"));
    }

    #[test]
    fn test_edge_included_with_exclusive_policy() {
        let store = edx_store();
        let config = GridConfig::composition().with_edge_policy(crate::config::EdgePolicy::Exclusive);
        let ds = full_dataset(&store, &config).unwrap();
        assert_relative_eq!(composition_at(&ds, "Fe", WaferPosition::new(30.0, 30.0)), 10.0);
    }

    #[test]
    fn test_moke_and_xrd_results() {
        let mut store = edx_store();

        let moke = scan(&mut store, "moke", 0.0, 0.0);
        store.create_group(&format!("{moke}/coercivity_m0")).unwrap();
        store
            .write_with_units(&format!("{moke}/coercivity_m0/mean"), 0.012.into(), Some("T"))
            .unwrap();
        store.write(&format!("{moke}/max_kerr_rotation"), 0.4.into()).unwrap();
        let stray = scan(&mut store, "moke", -40.0, 0.0);
        store.write(&format!("{stray}/max_kerr_rotation"), 0.1.into()).unwrap();

        let xrd = scan(&mut store, "xrd", 5.0, 0.0);
        store.create_group(&format!("{xrd}/phases/Fe3O4")).unwrap();
        store
            .write_with_units(&format!("{xrd}/phases/Fe3O4/A"), "8.39+-0.01".into(), Some("Å"))
            .unwrap();
        store.write(&format!("{xrd}/phases/Fe3O4/B"), "UNDEF".into()).unwrap();

        let ds = full_dataset(&store, &GridConfig::composition()).unwrap();
        let origin = WaferPosition::new(0.0, 0.0);
        assert_relative_eq!(ds.scalar("coercivity_m0", origin).unwrap(), 0.012);
        assert_eq!(ds.field("coercivity_m0").unwrap().units.as_deref(), Some("T"));
        assert_relative_eq!(ds.scalar("max_kerr_rotation", origin).unwrap(), 0.4);
        assert_eq!(ds.dropped(), 1);

        let a = ds.field("Fe3O4 Lattice Parameter A").unwrap();
        assert_eq!(a.units.as_deref(), Some("Å"));
        assert_relative_eq!(
            ds.scalar("Fe3O4 Lattice Parameter A", WaferPosition::new(5.0, 0.0)).unwrap(),
            8.39
        );
        assert!(ds.field("Fe3O4 Lattice Parameter B").is_none());
        assert!(ds.field("Fe3O4 Phase Fraction").is_none());
    }

    #[test]
    fn test_requires_edx() {
        let mut store = MemoryStore::new();
        scan(&mut store, "moke", 0.0, 0.0);
        assert!(matches!(
            full_dataset(&store, &GridConfig::composition()),
            Err(wafermap_core::Error::Lookup(_))
        ));
    }
}
