/// End-to-end tests for the import pipeline against the in-memory store.
///
/// These tests verify:
/// 1. CSV -> filter -> simulate -> geo format -> replace, in input order
/// 2. Unknown stations produce no readings and leave carried state alone
/// 3. Bounds and coordinate invariants over a larger generated input
/// 4. Re-running the import replaces rather than accumulates
/// 5. Failure phases for a missing input and an unreachable datastore
///
/// No database or network access is needed.
///
/// Run with: cargo test --test import_pipeline

use aquamapper_service::config::{ImportSettings, SimulationParams, StateScope};
use aquamapper_service::db::{MemoryStore, ReadingStore};
use aquamapper_service::import::{ImportPhase, ImportRun, run_import};
use aquamapper_service::model::ImportError;
use aquamapper_service::stations::StationRegistry;

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const AMEERPET: &str = "HYD_AMEERPET_1744_7845";
const UPPAL: &str = "HYD_UPPAL_1739_7856";

fn registry() -> StationRegistry {
    StationRegistry::from_toml_str(include_str!("../stations.toml"))
        .expect("shipped stations.toml should parse")
}

fn write_csv(rows: &[(&str, &str, &str)]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "sensor_id,latitude,longitude,rainfall_mm,timestamp").unwrap();
    for (station, rain, timestamp) in rows {
        // Row coordinates deliberately disagree with the registry.
        writeln!(file, "{},0.0,0.0,{},{}", station, rain, timestamp).unwrap();
    }
    file.flush().unwrap();
    file
}

fn settings(input: &Path, scope: StateScope) -> ImportSettings {
    ImportSettings {
        input: input.to_path_buf(),
        state_scope: scope,
        seed: Some(2024),
        ..ImportSettings::default()
    }
}

fn quiet() -> SimulationParams {
    SimulationParams::default().without_noise()
}

// ---------------------------------------------------------------------------
// 1. Pipeline output
// ---------------------------------------------------------------------------

#[test]
fn test_example_rows_produce_expected_levels_and_coordinates() {
    let csv = write_csv(&[
        (AMEERPET, "0", "2024-01-01T00:00:00Z"),
        (AMEERPET, "12", "2024-01-01T01:00:00Z"),
    ]);
    let mut store = MemoryStore::new();
    let mut run = ImportRun::new();

    let summary = run_import(
        &mut run,
        &settings(csv.path(), StateScope::Shared),
        &quiet(),
        &registry(),
        || Ok(&mut store),
    )
    .expect("import should succeed");

    assert_eq!(summary.rows_read, 2);
    assert_eq!(summary.rows_accepted, 2);
    assert_eq!(summary.load.attempted, 2);
    assert_eq!(summary.load.failed(), 0);

    let docs = store.documents();
    assert_eq!(docs.len(), 2);
    assert!((docs[0].water_level_m - 4.995).abs() <= 0.005 + 1e-9);
    assert!((docs[1].water_level_m - 6.19).abs() < 1e-9);
    for doc in docs {
        assert_eq!(doc.location.coordinates(), [78.4599, 17.4396]);
        assert_eq!(doc.station_id, AMEERPET);
    }
    assert!(docs[0].timestamp < docs[1].timestamp);
}

#[test]
fn test_invalid_rainfall_row_is_imported_as_zero() {
    let csv = write_csv(&[(UPPAL, "abc", "2024-01-01T00:00:00Z")]);
    let mut store = MemoryStore::new();

    run_import(
        &mut ImportRun::new(),
        &settings(csv.path(), StateScope::PerStation),
        &quiet(),
        &registry(),
        || Ok(&mut store),
    )
    .unwrap();

    let doc = &store.documents()[0];
    assert_eq!(doc.rainfall_mm, 0.0);
    assert_eq!(doc.ph_level, 7.5);
}

#[test]
fn test_run_walks_every_phase_in_order() {
    let csv = write_csv(&[(AMEERPET, "1", "2024-01-01T00:00:00Z")]);
    let mut run = ImportRun::new();

    run_import(
        &mut run,
        &settings(csv.path(), StateScope::PerStation),
        &SimulationParams::default(),
        &registry(),
        || Ok(MemoryStore::new()),
    )
    .unwrap();

    use ImportPhase::*;
    assert_eq!(
        run.history(),
        &[Idle, Connecting, Reading, Simulating, Clearing, Inserting, Done]
    );
}

// ---------------------------------------------------------------------------
// 2. Unknown stations
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_station_is_skipped_and_does_not_advance_shared_state() {
    let csv = write_csv(&[
        (AMEERPET, "0", "2024-01-01T00:00:00Z"),
        ("UNKNOWN_STATION", "100", "2024-01-01T01:00:00Z"),
        (AMEERPET, "0", "2024-01-01T02:00:00Z"),
    ]);
    let mut store = MemoryStore::new();

    let summary = run_import(
        &mut ImportRun::new(),
        &settings(csv.path(), StateScope::Shared),
        &quiet(),
        &registry(),
        || Ok(&mut store),
    )
    .unwrap();

    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.rows_accepted, 2);
    assert_eq!(summary.rows_skipped, 1);

    let docs = store.documents();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.station_id == AMEERPET));
    // 5.0 - 0.005 - 0.005: the skipped 100 mm row never touched the level.
    assert!((docs[1].water_level_m - 4.99).abs() < 1e-9);
}

#[test]
fn test_per_station_scope_keeps_interleaved_stations_apart() {
    let csv = write_csv(&[
        (AMEERPET, "30", "2024-01-01T00:00:00Z"),
        (UPPAL, "0", "2024-01-01T00:00:00Z"),
        (AMEERPET, "0", "2024-01-01T01:00:00Z"),
        (UPPAL, "0", "2024-01-01T01:00:00Z"),
    ]);
    let mut store = MemoryStore::new();

    run_import(
        &mut ImportRun::new(),
        &settings(csv.path(), StateScope::PerStation),
        &quiet(),
        &registry(),
        || Ok(&mut store),
    )
    .unwrap();

    let uppal: Vec<f64> = store
        .documents()
        .iter()
        .filter(|d| d.station_id == UPPAL)
        .map(|d| d.water_level_m)
        .collect();
    // Uppal declines from 5.0 regardless of Ameerpet's 30 mm of rain.
    assert_eq!(uppal.len(), 2);
    assert!((uppal[1] - 4.99).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// 3. Invariants over a generated input
// ---------------------------------------------------------------------------

#[test]
fn test_bounds_and_coordinates_hold_for_every_reading() {
    let stations = registry();
    let ids = stations.all_station_ids();
    let rains = ["0", "0.4", "3", "7.5", "45", "120", "", "n/a", "-2"];

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sensor_id,latitude,longitude,rainfall_mm,timestamp").unwrap();
    for i in 0..1_000 {
        let station = if i % 7 == 0 { "OUTSIDE_DEPLOYMENT" } else { ids[i % ids.len()] };
        writeln!(
            file,
            "{},17.4,78.4,{},2024-02-{:02}T{:02}:00:00Z",
            station,
            rains[i % rains.len()],
            1 + (i / 24) % 28,
            i % 24
        )
        .unwrap();
    }
    file.flush().unwrap();

    let mut store = MemoryStore::new();
    let summary = run_import(
        &mut ImportRun::new(),
        &settings(file.path(), StateScope::Shared),
        &SimulationParams::default(),
        &stations,
        || Ok(&mut store),
    )
    .unwrap();

    assert_eq!(summary.load.failed(), 0);
    assert_eq!(store.documents().len(), summary.rows_accepted);
    for doc in store.documents() {
        assert!((1.0..=10.0).contains(&doc.water_level_m));
        assert!((6.5..=8.5).contains(&doc.ph_level));
        assert!(doc.rainfall_mm >= 0.0);
        let (lon, lat) = stations.lookup(&doc.station_id).unwrap();
        assert_eq!(doc.location.coordinates(), [lon, lat]);
    }
}

#[test]
fn test_same_seed_gives_identical_documents() {
    let csv = write_csv(&[
        (AMEERPET, "4", "2024-01-01T00:00:00Z"),
        (UPPAL, "9", "2024-01-01T00:00:00Z"),
        (AMEERPET, "0", "2024-01-01T01:00:00Z"),
    ]);
    let run_once = || {
        let mut store = MemoryStore::new();
        run_import(
            &mut ImportRun::new(),
            &settings(csv.path(), StateScope::Shared),
            &SimulationParams::default(),
            &registry(),
            || Ok(&mut store),
        )
        .unwrap();
        store.documents().to_vec()
    };
    assert_eq!(run_once(), run_once());
}

// ---------------------------------------------------------------------------
// 4. Replace semantics
// ---------------------------------------------------------------------------

#[test]
fn test_rerun_replaces_instead_of_accumulating() {
    let csv = write_csv(&[
        (AMEERPET, "1", "2024-01-01T00:00:00Z"),
        (UPPAL, "2", "2024-01-01T00:00:00Z"),
        ("UNKNOWN_STATION", "3", "2024-01-01T00:00:00Z"),
    ]);
    let mut store = MemoryStore::new();

    for _ in 0..3 {
        let summary = run_import(
            &mut ImportRun::new(),
            &settings(csv.path(), StateScope::PerStation),
            &SimulationParams::default(),
            &registry(),
            || Ok(&mut store),
        )
        .unwrap();
        assert_eq!(summary.rows_accepted, 2);
        assert_eq!(store.count().unwrap(), 2);
    }
}

#[test]
fn test_huge_rainfall_is_persisted_not_rejected() {
    let csv = write_csv(&[(AMEERPET, "1e307", "2024-01-01T00:00:00Z")]);
    let mut store = MemoryStore::new();

    let summary = run_import(
        &mut ImportRun::new(),
        &settings(csv.path(), StateScope::PerStation),
        &quiet(),
        &registry(),
        || Ok(&mut store),
    )
    .unwrap();

    assert_eq!(summary.load.failed(), 0, "failures: {:?}", summary.load.failures);
    let doc = &store.documents()[0];
    assert_eq!(doc.rainfall_mm, 1e307);
    assert_eq!(doc.water_level_m, 10.0);
    assert_eq!(doc.ph_level, 6.5);
}

#[test]
fn test_bad_timestamp_fails_one_document_not_the_batch() {
    let csv = write_csv(&[
        (AMEERPET, "0", "2024-01-01T00:00:00Z"),
        (AMEERPET, "0", "not a date"),
        (AMEERPET, "0", "2024-01-01T02:00:00Z"),
    ]);
    let mut store = MemoryStore::new();

    let summary = run_import(
        &mut ImportRun::new(),
        &settings(csv.path(), StateScope::Shared),
        &quiet(),
        &registry(),
        || Ok(&mut store),
    )
    .unwrap();

    assert_eq!(summary.load.attempted, 3);
    assert_eq!(summary.load.failed(), 1);
    assert_eq!(summary.load.failures[0].index, 1);
    assert_eq!(store.count().unwrap(), 2);
    // The failed row still advanced the carried level: 5.0 - 3 * 0.005.
    assert!((store.documents()[1].water_level_m - 4.985).abs() <= 0.005 + 1e-9);
}

// ---------------------------------------------------------------------------
// 5. Fatal failures
// ---------------------------------------------------------------------------

#[test]
fn test_missing_input_fails_from_reading_with_source_not_found() {
    let mut run = ImportRun::new();
    let mut store = MemoryStore::new();

    let err = run_import(
        &mut run,
        &settings(Path::new("/nonexistent/hyderabad_sensor_data.csv"), StateScope::Shared),
        &SimulationParams::default(),
        &registry(),
        || Ok(&mut store),
    )
    .unwrap_err();

    assert!(err.is_source_not_found(), "got {:?}", err);
    use ImportPhase::*;
    assert_eq!(run.history(), &[Idle, Connecting, Reading, Failed]);
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_unreachable_datastore_fails_from_connecting() {
    let csv = write_csv(&[(AMEERPET, "1", "2024-01-01T00:00:00Z")]);
    let mut run = ImportRun::new();

    let err = run_import(
        &mut run,
        &settings(csv.path(), StateScope::Shared),
        &SimulationParams::default(),
        &registry(),
        || -> Result<MemoryStore, ImportError> {
            Err(ImportError::DatastoreUnreachable {
                reason: "connection refused".to_string(),
            })
        },
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::DatastoreUnreachable { .. }));
    use ImportPhase::*;
    assert_eq!(run.history(), &[Idle, Connecting, Failed]);
}
