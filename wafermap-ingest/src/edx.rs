//! EDX ingestion: normalized spectrum tree → scan subtree.
//!
//! Every non-empty mapping of the tree is first classified into a
//! [`Placement`], then its leaf fields are written into the chosen group.
//! Classification never touches the store.

use crate::normalize::{NormalizeConfig, ELEMENT_TYPE};
use crate::record::{begin_scan, ScanPaths};
use crate::spx::SpxDocument;
use crate::Result;
use std::path::Path;
use wafermap_core::store::join;
use wafermap_core::units::{COUNTS_UNITS, ENERGY_UNITS};
use wafermap_core::{
    units_for, Category, DataValue, Error as CoreError, GeometryConfig, HierarchicalStore,
    NormalizedTree, ScanIndex, WaferPosition,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const RESULT_MARKER: &str = "Result";
const RESULT_CONTAINER: &str = "TRTResult";
const EXTENDED_RESULT_MARKER: &str = "ExtResults";
const VENDOR_PREFIX: &str = "TRT";
const SPECTRUM_HEADER: &str = "TRTSpectrumHeader";

/// Fields stored as fractions by the instrument and converted to percent.
const PERCENT_FIELDS: [&str; 2] = ["AtomPercent", "MassPercent"];

/// Destination of one mapping of the normalized tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement<'a> {
    /// New group `results/<key>`.
    NewResult,
    /// Merge into `results/Result <atom>`, dropping the redundant `Atom` field.
    ExtendedResult { atom: &'a str },
    /// Rename `results/Result <element>` to `results/<name>`.
    ElementRename { element: &'a str, name: String },
    /// Plain group under `instrument/`.
    InstrumentField { name: String },
}

impl Placement<'_> {
    /// Leaf of the mapping that only served to locate the target group.
    #[must_use]
    pub fn locator_field(&self) -> Option<&'static str> {
        match self {
            Self::ExtendedResult { .. } => Some("Atom"),
            Self::ElementRename { .. } => Some("Element"),
            Self::NewResult | Self::InstrumentField { .. } => None,
        }
    }
}

/// Classifies a mapping by its key prefix.
///
/// # Errors
/// Returns [`CoreError::MissingField`] if an extended result lacks `Atom`
/// or an element lacks `Element`.
pub fn classify<'a>(key: &str, value: &'a NormalizedTree) -> Result<Placement<'a>> {
    if key.starts_with(RESULT_MARKER) || key == RESULT_CONTAINER {
        return Ok(Placement::NewResult);
    }
    if key.starts_with(EXTENDED_RESULT_MARKER) {
        let atom = value
            .leaf("Atom")
            .ok_or_else(|| CoreError::missing(key, "Atom"))?;
        return Ok(Placement::ExtendedResult { atom: atom.trim() });
    }
    if let Some(name) = key.strip_prefix(ELEMENT_TYPE) {
        let element = value
            .leaf("Element")
            .ok_or_else(|| CoreError::missing(key, "Element"))?;
        return Ok(Placement::ElementRename {
            element: element.trim(),
            name: format!("Element {}", name.trim_start()),
        });
    }
    Ok(Placement::InstrumentField {
        name: key.strip_prefix(VENDOR_PREFIX).unwrap_or(key).to_string(),
    })
}

/// Best-effort numeric coercion; percent fields are scaled from fractions.
#[must_use]
pub fn coerce_field(field: &str, text: &str) -> DataValue {
    match DataValue::from_text(text) {
        DataValue::Float(v) if PERCENT_FIELDS.contains(&field) => DataValue::Float(v * 100.0),
        other => other,
    }
}

/// Energy of each channel, `(i + 1) * CalibLin + CalibAbs`.
///
/// Only the first half of the channel range is covered: the axis has
/// `channel_count / 2` entries.
///
/// # Errors
/// Returns [`CoreError::MissingField`] if the spectrum header or either
/// calibration field is absent, [`CoreError::InvalidFormat`] if a
/// calibration value is not numeric.
#[allow(clippy::cast_precision_loss)]
pub fn energy_axis(tree: &NormalizedTree, channel_count: usize) -> Result<Vec<f64>> {
    let header = tree
        .find_branch(SPECTRUM_HEADER)
        .ok_or_else(|| CoreError::missing("/", SPECTRUM_HEADER))?;
    let calib = |field: &str| -> Result<f64> {
        let text = header
            .leaf(field)
            .ok_or_else(|| CoreError::missing(SPECTRUM_HEADER, field))?;
        text.trim().parse::<f64>().map_err(|_| {
            CoreError::InvalidFormat(format!("{SPECTRUM_HEADER}/{field} is not numeric: {text:?}"))
                .into()
        })
    };
    let zero = calib("CalibAbs")?;
    let step = calib("CalibLin")?;

    Ok((0..channel_count / 2)
        .map(|i| (i + 1) as f64 * step + zero)
        .collect())
}

/// Writes the results and instrument groups of a scan from its tree.
///
/// # Errors
/// Returns an error if classification fails or a referenced result group
/// is absent. Groups written before the failure are kept.
pub fn write_tree<S: HierarchicalStore>(
    store: &mut S,
    paths: &ScanPaths,
    tree: &NormalizedTree,
) -> Result<()> {
    for (key, value) in tree.branches() {
        // containers of nested groups only get no group of their own
        if !value.has_leaf_fields() {
            continue;
        }
        let placement = classify(key, value)?;
        let group = apply_placement(store, paths, key, &placement)?;
        let skip = placement.locator_field();

        for (field, text) in value.leaves() {
            if Some(field) == skip {
                continue;
            }
            store.write_with_units(
                &join(&group, field),
                coerce_field(field, text),
                units_for(field),
            )?;
        }
    }
    Ok(())
}

fn apply_placement<S: HierarchicalStore>(
    store: &mut S,
    paths: &ScanPaths,
    key: &str,
    placement: &Placement<'_>,
) -> Result<String> {
    match placement {
        Placement::NewResult => {
            let group = join(&paths.results, key);
            store.create_group(&group)?;
            Ok(group)
        }
        Placement::ExtendedResult { atom } => {
            let group = join(&paths.results, &format!("{RESULT_MARKER} {atom}"));
            if !store.is_group(&group) {
                return Err(CoreError::Lookup(format!("result group {group} for {key}")).into());
            }
            remove_if_present(store, &join(&group, "Atom"))?;
            Ok(group)
        }
        Placement::ElementRename { element, name } => {
            let from = join(&paths.results, &format!("{RESULT_MARKER} {element}"));
            let to = join(&paths.results, name);
            store.move_node(&from, &to)?;
            remove_if_present(store, &join(&to, "Atom"))?;
            Ok(to)
        }
        Placement::InstrumentField { name } => {
            let group = join(&paths.instrument, name);
            store.create_group(&group)?;
            Ok(group)
        }
    }
}

fn remove_if_present<S: HierarchicalStore>(store: &mut S, path: &str) -> Result<()> {
    if store.contains(path) {
        store.remove(path)?;
    }
    Ok(())
}

/// Writes one parsed spectrum as a complete EDX scan subtree.
///
/// The energy axis is computed before anything is written, so missing
/// calibration leaves the store untouched.
///
/// # Errors
/// See [`energy_axis`] and [`write_tree`].
pub fn write_spectrum<S: HierarchicalStore>(
    store: &mut S,
    scan: ScanIndex,
    position: WaferPosition,
    document: &SpxDocument,
) -> Result<ScanPaths> {
    let energy = energy_axis(&document.tree, document.channels.len())?;

    let paths = begin_scan(store, Category::Edx, scan, position)?;
    write_tree(store, &paths, &document.tree)?;

    store.write_with_units(
        &join(&paths.measurement, "counts"),
        DataValue::IntArray(document.channels.clone()),
        Some(COUNTS_UNITS),
    )?;
    store.write_with_units(
        &join(&paths.measurement, "energy"),
        DataValue::FloatArray(energy),
        Some(ENERGY_UNITS),
    )?;
    Ok(paths)
}

/// Settings of an EDX ingest run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IngestConfig {
    pub geometry: GeometryConfig,
    pub normalize: NormalizeConfig,
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometry(mut self, geometry: GeometryConfig) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_normalize(mut self, normalize: NormalizeConfig) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Summary of one ingested file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IngestedScan {
    pub scan: ScanIndex,
    pub position: WaferPosition,
    pub group: String,
    pub channels: usize,
}

/// Reads an `.spx` file and appends its scan to the store.
///
/// # Errors
/// Returns [`CoreError::InvalidFormat`] (wrapped) if the file name has no
/// scan index, and any parse or store error.
pub fn ingest_spx<S, P>(store: &mut S, path: P, config: &IngestConfig) -> Result<IngestedScan>
where
    S: HierarchicalStore,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let scan = ScanIndex::from_path(path)?;
    let position = config.geometry.position(scan);
    let document = SpxDocument::read(path, &config.normalize)?;

    let paths = write_spectrum(store, scan, position, &document)?;
    log::info!(
        "ingested {} as scan {scan} at {position}",
        path.display()
    );

    Ok(IngestedScan {
        scan,
        position,
        group: paths.scan,
        channels: document.channels.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use approx::assert_relative_eq;
    use wafermap_core::{MemoryStore, TreeNode};

    fn branch(entries: &[(&str, &str)]) -> NormalizedTree {
        let mut tree = NormalizedTree::new();
        for (k, v) in entries {
            tree.insert(*k, TreeNode::Leaf(Some((*v).to_string())));
        }
        tree
    }

    #[test]
    fn test_classify_prefixes() {
        let empty = NormalizedTree::new();
        assert_eq!(classify("Result 26", &empty).unwrap(), Placement::NewResult);
        assert_eq!(classify("TRTResult", &empty).unwrap(), Placement::NewResult);

        let ext = branch(&[("Atom", "26")]);
        assert_eq!(
            classify("ExtResults 26", &ext).unwrap(),
            Placement::ExtendedResult { atom: "26" }
        );

        let element = branch(&[("Element", "26")]);
        assert_eq!(
            classify("TRTPSEElement Fe", &element).unwrap(),
            Placement::ElementRename {
                element: "26",
                name: "Element Fe".to_string()
            }
        );

        assert_eq!(
            classify("TRTSpectrumHeader", &empty).unwrap(),
            Placement::InstrumentField {
                name: "SpectrumHeader".to_string()
            }
        );
        assert_eq!(
            classify("Detector", &empty).unwrap(),
            Placement::InstrumentField {
                name: "Detector".to_string()
            }
        );
    }

    #[test]
    fn test_classify_requires_locator() {
        let empty = NormalizedTree::new();
        assert!(classify("ExtResults 26", &empty).is_err());
        assert!(classify("TRTPSEElement Fe", &empty).is_err());
    }

    #[test]
    fn test_coerce_field() {
        assert_eq!(coerce_field("AtomPercent", "0.42"), DataValue::Float(42.0));
        assert_eq!(coerce_field("MassPercent", "0.5"), DataValue::Float(50.0));
        assert_eq!(coerce_field("CalibLin", "0.5"), DataValue::Float(0.5));
        assert_eq!(
            coerce_field("AtomPercent", "n/a"),
            DataValue::Text("n/a".to_string())
        );
    }

    #[test]
    fn test_energy_axis_is_half_length() {
        let mut tree = NormalizedTree::new();
        tree.insert(
            "TRTSpectrumHeader",
            TreeNode::Branch(branch(&[("CalibAbs", "0.0"), ("CalibLin", "2.0")])),
        );
        let energy = energy_axis(&tree, 6).unwrap();
        assert_eq!(energy.len(), 3);
        assert_relative_eq!(energy[0], 2.0);
        assert_relative_eq!(energy[1], 4.0);
        assert_relative_eq!(energy[2], 6.0);
    }

    #[test]
    fn test_energy_axis_requires_calibration() {
        let mut tree = NormalizedTree::new();
        tree.insert(
            "TRTSpectrumHeader",
            TreeNode::Branch(branch(&[("CalibAbs", "0.0")])),
        );
        assert!(matches!(
            energy_axis(&tree, 6),
            Err(Error::Core(CoreError::MissingField { .. }))
        ));
        assert!(energy_axis(&NormalizedTree::new(), 6).is_err());
    }

    #[test]
    fn test_missing_calibration_writes_nothing() {
        let mut store = MemoryStore::new();
        let document = SpxDocument {
            tree: NormalizedTree::new(),
            channels: vec![1, 2],
        };
        let scan = ScanIndex::new(1, 1).unwrap();
        assert!(write_spectrum(&mut store, scan, WaferPosition::new(0.0, 0.0), &document).is_err());
        assert!(!store.contains("/entry"));
    }

    #[test]
    fn test_write_tree_reshapes_results() {
        let mut result = branch(&[("Atom", "26"), ("AtomPercent", "0.42")]);
        result.insert("Empty", TreeNode::Leaf(None));
        let ext = branch(&[("Atom", "26"), ("Line", "K")]);
        let element = branch(&[("Element", "26"), ("XLine", "Ka")]);

        let mut results = NormalizedTree::new();
        results.insert("Result 26", TreeNode::Branch(result));
        results.insert("ExtResults 26", TreeNode::Branch(ext));

        let mut spectrum = NormalizedTree::new();
        spectrum.insert("TRTResult", TreeNode::Branch(results));
        spectrum.insert("TRTPSEElement Fe", TreeNode::Branch(element));
        spectrum.insert("TRTDetectorHeader", TreeNode::Branch(branch(&[("DetectorTemperature", "-20")])));

        let mut tree = NormalizedTree::new();
        tree.insert("TRTSpectrum", TreeNode::Branch(spectrum));

        let mut store = MemoryStore::new();
        let paths = begin_scan(
            &mut store,
            Category::Edx,
            ScanIndex::new(1, 1).unwrap(),
            WaferPosition::new(-40.0, -40.0),
        )
        .unwrap();
        write_tree(&mut store, &paths, &tree).unwrap();

        let fe = format!("{}/Element Fe", paths.results);
        assert!(!store.contains(&format!("{}/Result 26", paths.results)));
        assert_relative_eq!(store.read_f64(&format!("{fe}/AtomPercent")).unwrap(), 42.0);
        assert_eq!(
            store.units(&format!("{fe}/AtomPercent")).unwrap().as_deref(),
            Some("at.%")
        );
        assert_eq!(
            store.read(&format!("{fe}/Line")).unwrap(),
            DataValue::Text("K".to_string())
        );
        assert!(!store.contains(&format!("{fe}/Atom")));
        assert!(!store.contains(&format!("{fe}/Element")));
        assert!(!store.contains(&format!("{fe}/Empty")));
        assert!(store.contains(&format!("{fe}/XLine")));
        assert!(!store.contains(&format!("{}/TRTResult", paths.results)));
        assert!(!store.contains(&format!("{}/Spectrum", paths.instrument)));
        assert_eq!(
            store
                .units(&format!("{}/DetectorHeader/DetectorTemperature", paths.instrument))
                .unwrap()
                .as_deref(),
            Some("°C")
        );
    }

    #[test]
    fn test_extended_result_needs_result_group() {
        let mut results = NormalizedTree::new();
        results.insert("ExtResults 29", TreeNode::Branch(branch(&[("Atom", "29")])));
        let mut tree = NormalizedTree::new();
        tree.insert("TRTResult", TreeNode::Branch(results));

        let mut store = MemoryStore::new();
        let paths = begin_scan(
            &mut store,
            Category::Edx,
            ScanIndex::new(1, 1).unwrap(),
            WaferPosition::new(-40.0, -40.0),
        )
        .unwrap();
        let err = write_tree(&mut store, &paths, &tree).unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::Lookup(_))));
    }
}
