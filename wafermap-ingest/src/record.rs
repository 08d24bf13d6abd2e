//! Scan subtree layout shared by all instruments.
//!
//! ```text
//! /entry/<category>/scan_<x>,<y>/
//!     instrument/ {x_pos, y_pos}  [units=mm]
//!     results/...                 [units attr per field]
//!     measurement/...
//! ```

use crate::{Error, Result};
use std::collections::BTreeMap;
use wafermap_core::store::{join, split_parent, HT_TYPE_ATTR, NX_CLASS_ATTR};
use wafermap_core::units::POSITION_UNITS;
use wafermap_core::{Category, DataValue, HierarchicalStore, ScanIndex, WaferPosition};

/// Paths of a freshly created scan subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPaths {
    pub scan: String,
    pub instrument: String,
    pub results: String,
    pub measurement: String,
}

/// Creates the scan group of `scan` under the category root, writes the
/// wafer position and the three standard subgroups.
///
/// The category root is created with its `HT_type` attribute on first use.
///
/// # Errors
/// Returns [`Error::AlreadyIngested`] if the scan group exists, or any
/// store error.
pub fn begin_scan<S: HierarchicalStore>(
    store: &mut S,
    category: Category,
    scan: ScanIndex,
    position: WaferPosition,
) -> Result<ScanPaths> {
    let root = category.root_path();
    store.create_group(&root)?;
    if store.attr(&root, HT_TYPE_ATTR)?.is_none() {
        store.set_attr(&root, HT_TYPE_ATTR, category.ht_type())?;
    }

    let scan_path = join(&root, &scan.group_name());
    if store.contains(&scan_path) {
        return Err(Error::AlreadyIngested(scan_path));
    }

    let paths = ScanPaths {
        instrument: join(&scan_path, "instrument"),
        results: join(&scan_path, "results"),
        measurement: join(&scan_path, "measurement"),
        scan: scan_path,
    };

    store.create_group(&paths.instrument)?;
    store.set_attr(&paths.instrument, NX_CLASS_ATTR, "HTinstrument")?;
    store.write_with_units(
        &join(&paths.instrument, "x_pos"),
        DataValue::Float(position.x),
        Some(POSITION_UNITS),
    )?;
    store.write_with_units(
        &join(&paths.instrument, "y_pos"),
        DataValue::Float(position.y),
        Some(POSITION_UNITS),
    )?;

    store.create_group(&paths.results)?;
    store.set_attr(&paths.results, NX_CLASS_ATTR, "HTresult")?;
    store.create_group(&paths.measurement)?;
    store.set_attr(&paths.measurement, NX_CLASS_ATTR, "HTdata")?;

    Ok(paths)
}

/// A value with an optional unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub value: DataValue,
    pub units: Option<String>,
}

impl Field {
    pub fn new(value: impl Into<DataValue>) -> Self {
        Self {
            value: value.into(),
            units: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

/// Output of an instrument reader: result and measurement fields keyed by
/// slash-separated paths relative to `results/` and `measurement/`.
///
/// This is the contract MOKE and XRD readers fulfil, e.g.
/// `coercivity_m0/mean` or `phases/Fe3O4/A`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRecord {
    pub results: BTreeMap<String, Field>,
    pub measurement: BTreeMap<String, Field>,
}

impl ScanRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a result field.
    pub fn result(mut self, path: impl Into<String>, field: Field) -> Self {
        self.results.insert(path.into(), field);
        self
    }

    /// Adds a measurement field.
    pub fn measurement(mut self, path: impl Into<String>, field: Field) -> Self {
        self.measurement.insert(path.into(), field);
        self
    }
}

/// Writes a complete scan subtree from an instrument record.
///
/// # Errors
/// See [`begin_scan`].
pub fn write_record<S: HierarchicalStore>(
    store: &mut S,
    category: Category,
    scan: ScanIndex,
    position: WaferPosition,
    record: &ScanRecord,
) -> Result<ScanPaths> {
    let paths = begin_scan(store, category, scan, position)?;
    write_fields(store, &paths.results, &record.results)?;
    write_fields(store, &paths.measurement, &record.measurement)?;
    log::debug!(
        "wrote {category} scan {scan} with {} result and {} measurement fields",
        record.results.len(),
        record.measurement.len()
    );
    Ok(paths)
}

fn write_fields<S: HierarchicalStore>(
    store: &mut S,
    base: &str,
    fields: &BTreeMap<String, Field>,
) -> Result<()> {
    for (relative, field) in fields {
        let path = join(base, relative.trim_start_matches('/'));
        let (parent, _) = split_parent(&path);
        store.create_group(parent)?;
        store.write_with_units(&path, field.value.clone(), field.units.as_deref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wafermap_core::MemoryStore;

    #[test]
    fn test_begin_scan_layout() {
        let mut store = MemoryStore::new();
        let scan = ScanIndex::new(2, 3).unwrap();
        let paths = begin_scan(&mut store, Category::Edx, scan, WaferPosition::new(-35.0, -30.0)).unwrap();

        assert_eq!(paths.scan, "/entry/edx/scan_2,3");
        assert_eq!(
            store.attr("/entry/edx", HT_TYPE_ATTR).unwrap().as_deref(),
            Some("edx")
        );
        assert!((store.read_f64("/entry/edx/scan_2,3/instrument/y_pos").unwrap() + 30.0).abs() < 1e-12);
        assert_eq!(
            store.units("/entry/edx/scan_2,3/instrument/x_pos").unwrap().as_deref(),
            Some("mm")
        );
        assert_eq!(
            store.attr(&paths.results, NX_CLASS_ATTR).unwrap().as_deref(),
            Some("HTresult")
        );
    }

    #[test]
    fn test_scan_is_written_once() {
        let mut store = MemoryStore::new();
        let scan = ScanIndex::new(1, 1).unwrap();
        let pos = WaferPosition::new(-40.0, -40.0);
        begin_scan(&mut store, Category::Moke, scan, pos).unwrap();
        let err = begin_scan(&mut store, Category::Moke, scan, pos).unwrap_err();
        assert!(matches!(err, Error::AlreadyIngested(_)));
    }

    #[test]
    fn test_write_record_nested_paths() {
        let mut store = MemoryStore::new();
        let record = ScanRecord::new()
            .result("coercivity_m0/mean", Field::new(0.012).with_units("T"))
            .result("phases/Fe3O4/A", Field::new("8.39+-0.01").with_units("Å"))
            .measurement("magnetization", Field::new(vec![0.1, 0.2, 0.3]));
        let scan = ScanIndex::new(9, 9).unwrap();
        write_record(&mut store, Category::Moke, scan, WaferPosition::new(0.0, 0.0), &record).unwrap();

        let base = "/entry/moke/scan_9,9";
        assert_eq!(
            store.units(&format!("{base}/results/coercivity_m0/mean")).unwrap().as_deref(),
            Some("T")
        );
        assert!(store.is_group(&format!("{base}/results/phases/Fe3O4")));
        assert_eq!(
            store.read(&format!("{base}/measurement/magnetization")).unwrap(),
            DataValue::FloatArray(vec![0.1, 0.2, 0.3])
        );
    }
}
