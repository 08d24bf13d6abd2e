use approx::assert_relative_eq;
use std::path::PathBuf;
use tempfile::TempDir;
use wafermap_core::{Category, HierarchicalStore, MemoryStore, WaferPosition};
use wafermap_grid::{
    compact, composition_at, full_dataset, list_positions, measurement_grid, units_of, CanonicalGrid,
    GridConfig,
};
use wafermap_ingest::{ingest_spx, IngestConfig};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../wafermap-ingest/tests/fixtures/spectrum.spx")
}

/// Ingests the fixture spectrum at (0, 0), (5, -10) and (30, 30).
fn ingested_store() -> MemoryStore {
    let dir = TempDir::new().unwrap();
    let mut store = MemoryStore::new();
    for name in ["Wafer (9,9).spx", "Wafer (10,7).spx", "Wafer (15,15).spx"] {
        let path = dir.path().join(name);
        std::fs::copy(fixture(), &path).unwrap();
        ingest_spx(&mut store, &path, &IngestConfig::default()).unwrap();
    }
    store
}

#[test]
fn test_ingested_position_is_listed() {
    let store = ingested_store();
    let positions = list_positions(&store, Category::Edx).unwrap();
    assert!(positions.contains(&WaferPosition::new(5.0, -10.0)));
    assert_eq!(positions.len(), 3);

    let units = units_of(&store, Category::Edx).unwrap();
    assert_eq!(units.x, "mm");
    assert_eq!(units.y, "mm");
}

#[test]
fn test_full_dataset_from_ingested_scans() {
    let store = ingested_store();
    let ds = full_dataset(&store, &GridConfig::composition()).unwrap();

    assert_eq!(ds.x.values, [0.0, 5.0, 30.0]);
    assert_eq!(ds.y.values, [-10.0, 0.0, 30.0]);
    assert_relative_eq!(
        composition_at(&ds, "Fe", WaferPosition::new(5.0, -10.0)),
        60.12,
        epsilon = 1e-9
    );
    assert_relative_eq!(
        composition_at(&ds, "Co", WaferPosition::new(0.0, 0.0)),
        39.88,
        epsilon = 1e-9
    );
    assert!(composition_at(&ds, "Fe", WaferPosition::new(30.0, 30.0)).is_nan());
    assert_eq!(ds.field("Fe Composition").unwrap().units.as_deref(), Some("at.%"));
}

#[test]
fn test_measurement_grid_from_ingested_scans() {
    let store = ingested_store();
    let grid = measurement_grid(&store, Category::Edx, &GridConfig::measurement()).unwrap();

    let counts = grid.field("counts").unwrap();
    assert_eq!(counts.data.shape(), &[3, 3, 8]);
    assert_eq!(counts.units.as_deref(), Some("cps"));
    // (30, 30) sits exactly on the cutoff and is kept by the measurement preset
    assert_eq!(counts.count_present(), 3 * 8);

    let energy = grid.field("energy").unwrap();
    let axis = energy.extra_axis.as_ref().unwrap();
    assert_eq!(axis.name, "energy");
    assert_eq!(axis.len(), 4);
    assert_relative_eq!(axis.values[0], -0.46, epsilon = 1e-12);
}

#[test]
fn test_compact_ingested_store() {
    let store = ingested_store();
    let mut target = MemoryStore::new();
    let summary = compact(&store, &mut target, &CanonicalGrid::default()).unwrap();

    assert_eq!(summary.coordinates, 17 * 17);
    assert_eq!(summary.measured[&Category::Edx], 3);
    assert_eq!(summary.filled[&Category::Edx], 17 * 17 - 3);

    assert_relative_eq!(
        target.read_f64("/(5.0,-10.0)/Fe").unwrap(),
        60.12,
        epsilon = 1e-9
    );
    assert!(target.read_f64("/(40.0,40.0)/Co").unwrap().is_nan());
    assert_eq!(target.units("/(40.0,40.0)/Co").unwrap().as_deref(), Some("at.%"));
    assert_relative_eq!(target.read_f64("/(-40.0,35.0)/y_pos").unwrap(), 35.0);
}
