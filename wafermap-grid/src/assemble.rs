//! Per-position fetches and measurement grid assembly.

use crate::config::GridConfig;
use crate::dataset::{FieldValue, GriddedDataset};
use crate::discovery::{category_root, position_units, PositionIndex};
use std::collections::BTreeMap;
use wafermap_core::store::join;
use wafermap_core::{Category, DataValue, Error, HierarchicalStore, Result, WaferPosition};

/// A dataset read from a scan subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    /// Path relative to the walked group, e.g. `CdTe_integrate/q`.
    pub name: String,
    pub value: DataValue,
    pub units: Option<String>,
}

impl FieldEntry {
    /// Numeric view of the value; text is not gridded.
    #[must_use]
    pub fn field_value(&self) -> Option<FieldValue> {
        if self.value.is_array() {
            self.value.to_f64_vec().map(FieldValue::Vector)
        } else {
            self.value.as_f64().map(FieldValue::Scalar)
        }
    }
}

/// Every dataset below `group`, depth first, named by relative path.
///
/// # Errors
/// Propagates store errors.
pub fn collect_fields<S: HierarchicalStore>(store: &S, group: &str) -> Result<Vec<FieldEntry>> {
    let mut out = Vec::new();
    walk(store, group, "", &mut out)?;
    Ok(out)
}

fn walk<S: HierarchicalStore>(
    store: &S,
    group: &str,
    prefix: &str,
    out: &mut Vec<FieldEntry>,
) -> Result<()> {
    for name in store.members(group)? {
        let path = join(group, &name);
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if store.is_group(&path) {
            walk(store, &path, &relative, out)?;
        } else {
            out.push(FieldEntry {
                value: store.read(&path)?,
                units: store.units(&path)?,
                name: relative,
            });
        }
    }
    Ok(())
}

fn scan_group<'a>(index: &'a PositionIndex, position: WaferPosition) -> Result<&'a str> {
    index.locate(position).ok_or_else(|| {
        Error::Lookup(format!(
            "no {} scan at position {}",
            index.category(),
            position.key()
        ))
    })
}

/// Datasets under `measurement/` of the scan at `position`.
///
/// # Errors
/// Returns [`Error::Lookup`] if no scan was recorded at `position`.
pub fn position_measurement<S: HierarchicalStore>(
    store: &S,
    index: &PositionIndex,
    position: WaferPosition,
) -> Result<Vec<FieldEntry>> {
    let group = scan_group(index, position)?;
    collect_fields(store, &join(group, "measurement"))
}

/// Datasets under `results/` of the scan at `position`.
///
/// # Errors
/// Returns [`Error::Lookup`] if no scan was recorded at `position`.
pub fn position_results<S: HierarchicalStore>(
    store: &S,
    index: &PositionIndex,
    position: WaferPosition,
) -> Result<Vec<FieldEntry>> {
    let group = scan_group(index, position)?;
    collect_fields(store, &join(group, "results"))
}

/// Attaches the position units of the reference scan to the grid axes.
///
/// A store without the reference scan keeps unitless axes.
pub(crate) fn attach_position_units<S: HierarchicalStore>(
    store: &S,
    index: &PositionIndex,
    dataset: &mut GriddedDataset,
) -> Result<()> {
    match position_units(store, index) {
        Ok(units) => {
            dataset.x.units = Some(units.x);
            dataset.y.units = Some(units.y);
            Ok(())
        }
        Err(err @ (Error::Lookup(_) | Error::MissingField { .. })) => {
            log::warn!("{}: position axes left without units: {err}", index.category());
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Dense grid of every measurement dataset of a category.
///
/// Vector fields get an extra axis named after the field whose
/// coordinates are the first scattered value.
///
/// # Errors
/// Returns [`Error::Lookup`] if the category is absent, or
/// [`Error::SchemaMismatch`] under `MismatchPolicy::Error`.
pub fn measurement_grid<S: HierarchicalStore>(
    store: &S,
    category: Category,
    config: &GridConfig,
) -> Result<GriddedDataset> {
    let index = PositionIndex::build(store, category)?;
    let mut dataset = GriddedDataset::new(index.x_values(), index.y_values());
    let mut skipped = 0usize;

    for (position, group) in index.iter() {
        if config.excludes(position.x, position.y) {
            skipped += 1;
            continue;
        }
        for entry in collect_fields(store, &join(group, "measurement"))? {
            let Some(value) = entry.field_value() else {
                log::debug!("{group}: {} is not numeric, skipped", entry.name);
                continue;
            };
            dataset.scatter(
                &entry.name,
                position,
                &value,
                entry.units.as_deref(),
                config.mismatch_policy,
            )?;
        }
    }

    attach_position_units(store, &index, &mut dataset)?;
    log::info!(
        "{category}: {} measurement fields over {}x{} positions ({skipped} edge positions skipped)",
        dataset.len(),
        dataset.y.len(),
        dataset.x.len()
    );
    Ok(dataset)
}

/// Measurement grids of every category present in the store.
///
/// # Errors
/// See [`measurement_grid`]; absent categories are skipped.
pub fn measurement_tree<S: HierarchicalStore>(
    store: &S,
    config: &GridConfig,
) -> Result<BTreeMap<Category, GriddedDataset>> {
    let mut tree = BTreeMap::new();
    for category in Category::ALL {
        if let Err(err) = category_root(store, category) {
            log::debug!("{err}");
            continue;
        }
        tree.insert(category, measurement_grid(store, category, config)?);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MismatchPolicy;
    use wafermap_core::store::HT_TYPE_ATTR;
    use wafermap_core::MemoryStore;

    fn add_scan(store: &mut MemoryStore, x: f64, y: f64, energy: Vec<f64>, counts: Vec<i64>) {
        let base = format!("/entry/edx/({x:.1},{y:.1})");
        store.create_group(&format!("{base}/instrument")).unwrap();
        store.create_group(&format!("{base}/results")).unwrap();
        store.create_group(&format!("{base}/measurement")).unwrap();
        store
            .write_with_units(&format!("{base}/instrument/x_pos"), DataValue::Float(x), Some("mm"))
            .unwrap();
        store
            .write_with_units(&format!("{base}/instrument/y_pos"), DataValue::Float(y), Some("mm"))
            .unwrap();
        store
            .write_with_units(&format!("{base}/measurement/energy"), energy.into(), Some("keV"))
            .unwrap();
        store
            .write_with_units(&format!("{base}/measurement/counts"), counts.into(), Some("cps"))
            .unwrap();
        store
            .write(&format!("{base}/measurement/comment"), "ok".into())
            .unwrap();
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.create_group("/entry/edx").unwrap();
        store.set_attr("/entry/edx", HT_TYPE_ATTR, "edx").unwrap();
        add_scan(&mut store, 0.0, 0.0, vec![0.1, 0.2, 0.3], vec![5, 6, 7]);
        add_scan(&mut store, 5.0, 0.0, vec![0.1, 0.2, 0.3], vec![1, 2, 3]);
        add_scan(&mut store, 35.0, 30.0, vec![0.1, 0.2, 0.3], vec![9, 9, 9]);
        store
    }

    #[test]
    fn test_collect_fields_recursive() {
        let mut store = store();
        store
            .create_group("/entry/edx/(0.0,0.0)/measurement/CdTe_integrate")
            .unwrap();
        store
            .write(
                "/entry/edx/(0.0,0.0)/measurement/CdTe_integrate/q",
                vec![1.0, 2.0].into(),
            )
            .unwrap();
        let names: Vec<_> = collect_fields(&store, "/entry/edx/(0.0,0.0)/measurement")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["CdTe_integrate/q", "comment", "counts", "energy"]);
    }

    #[test]
    fn test_measurement_grid_extra_axis() {
        let store = store();
        let grid = measurement_grid(&store, Category::Edx, &GridConfig::measurement()).unwrap();

        assert_eq!(grid.x.values, [0.0, 5.0, 35.0]);
        assert_eq!(grid.y.values, [0.0, 30.0]);
        assert_eq!(grid.x.units.as_deref(), Some("mm"));
        assert!(grid.field("comment").is_none());

        let counts = grid.field("counts").unwrap();
        assert_eq!(counts.data.shape(), &[2, 3, 3]);
        assert_eq!(counts.extra_axis.as_ref().unwrap().values, [5.0, 6.0, 7.0]);
        assert_eq!(counts.units.as_deref(), Some("cps"));
        // (35, 30) lies beyond the cutoff
        assert_eq!(counts.count_present(), 6);
    }

    #[test]
    fn test_measurement_grid_keep_edges() {
        let store = store();
        let config = GridConfig::measurement().with_exclude_edges(false);
        let grid = measurement_grid(&store, Category::Edx, &config).unwrap();
        assert_eq!(grid.field("energy").unwrap().count_present(), 9);
    }

    #[test]
    fn test_mismatched_axis_raises_under_error_policy() {
        let mut store = store();
        store
            .write("/entry/edx/(5.0,0.0)/measurement/energy", vec![0.1, 0.2].into())
            .unwrap();
        let config = GridConfig::measurement().with_mismatch_policy(MismatchPolicy::Error);
        assert!(matches!(
            measurement_grid(&store, Category::Edx, &config),
            Err(Error::SchemaMismatch { .. })
        ));

        let grid = measurement_grid(&store, Category::Edx, &GridConfig::measurement()).unwrap();
        assert_eq!(grid.dropped(), 1);
    }

    #[test]
    fn test_position_fetch() {
        let store = store();
        let index = PositionIndex::build(&store, Category::Edx).unwrap();
        let entries = position_measurement(&store, &index, WaferPosition::new(5.0, 0.0)).unwrap();
        let counts = entries.iter().find(|e| e.name == "counts").unwrap();
        assert_eq!(counts.value, DataValue::IntArray(vec![1, 2, 3]));

        assert!(position_results(&store, &index, WaferPosition::new(5.0, 0.0))
            .unwrap()
            .is_empty());
        assert!(matches!(
            position_measurement(&store, &index, WaferPosition::new(-5.0, 0.0)),
            Err(Error::Lookup(_))
        ));
    }

    #[test]
    fn test_measurement_tree_skips_absent_categories() {
        let store = store();
        let tree = measurement_tree(&store, &GridConfig::measurement()).unwrap();
        assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [Category::Edx]);
    }
}
