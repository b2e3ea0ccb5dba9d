//! Integration tests for labtools_runtime.
//!
//! All tests use temporary directories for isolation.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use chrono::{NaiveDate, NaiveDateTime};

use labtools_runtime::records::{Count, CountedDilution, CountingSeries, Dilution};
use labtools_runtime::{
    CellCountInitializer, CellCountRecord, InitializerRegistry, Project, RecordKind,
    RuntimeConfig, RuntimeError, SharedProject,
};
use labtools_store::{ErrorKind, Resource, ResourceReference};

/// Create a temp directory for a test and a config rooted in it.
fn temp_config(name: &str) -> RuntimeConfig {
    let dir = std::env::temp_dir()
        .join("labtools_runtime_tests")
        .join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    RuntimeConfig {
        projects_dir: dir.join("Projects"),
        ..RuntimeConfig::default()
    }
}

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid timestamp")
}

fn initialized(config: &RuntimeConfig, name: &str) -> Project<CellCountRecord> {
    let mut project = Project::open_or_create(config, name).expect("open or create");
    let mut registry = InitializerRegistry::<CellCountRecord>::new();
    registry.register(Box::new(CellCountInitializer));
    registry.initialize_all(&mut project).expect("initialize");
    project
}

fn cell_count_key(project: &Project<CellCountRecord>) -> String {
    project
        .origin_path(CellCountInitializer::ORIGIN_STEM)
        .to_str()
        .expect("utf-8 path")
        .to_string()
}

// ─────────────────────────────────────────────────────────────
// Test 1: project_round_trip_restores_records_and_links
// ─────────────────────────────────────────────────────────────

#[test]
fn project_round_trip_restores_records_and_links() {
    let config = temp_config("project_round_trip");
    let key;
    let series_reference: ResourceReference;
    {
        let mut project = initialized(&config, "culture");
        key = cell_count_key(&project);
        let origin = project.handler_mut().origin_mut(&key).expect("cell-count origin");

        let count = origin
            .add(Count::from_chamber(150, 4, 0.1, at(1, 9)).expect("count").into())
            .expect("add count");
        let dilution = origin
            .add(Dilution::new(0.1, 0.9, at(1, 8)).expect("dilution").into())
            .expect("add dilution");
        let counted = CountedDilution::new(
            Some(origin.reference_to(&count).expect("ref")),
            Some(origin.reference_to(&dilution).expect("ref")),
        );
        let counted = origin.add(counted.into()).expect("add counted");
        let mut series = CountingSeries::new();
        series.add(origin.reference_to(&counted).expect("ref"));
        let series = origin.add(series.into()).expect("add series");
        series_reference = origin.reference_to(&series).expect("ref");

        project.write().expect("write project");
    }

    let mut project = initialized(&config, "culture");
    assert_eq!(project.manifest(), &[PathBuf::from(&key)]);
    assert!(project.unclaimed_origins().is_empty());
    assert_eq!(project.load_origins().expect("load"), 1);

    let handler = project.handler();
    let series = handler
        .dereference_as(&series_reference, RecordKind::CountingSeries)
        .expect("dereference")
        .and_then(CellCountRecord::as_counting_series)
        .expect("series present");
    let events = series.events(handler);
    assert_eq!(events.len(), 1);

    let mut counted = events[0].cloned().expect("counted dilution present");
    let density = counted.count(handler).expect("count").expect("present").density();
    assert!((density - 0.375).abs() < 1e-12);
    let total = counted
        .dilution(handler)
        .expect("dilution")
        .expect("present")
        .total_volume();
    assert!((total - 1.0).abs() < 1e-12);
}

// ─────────────────────────────────────────────────────────────
// Test 2: create_refuses_existing_project
// ─────────────────────────────────────────────────────────────

#[test]
fn create_refuses_existing_project() {
    let config = temp_config("create_existing");
    initialized(&config, "taken").write().expect("write");

    assert!(matches!(
        Project::<CellCountRecord>::create(&config, "taken"),
        Err(RuntimeError::ProjectExists(_))
    ));
    assert!(Project::<CellCountRecord>::open(&config, "taken").is_ok());
}

// ─────────────────────────────────────────────────────────────
// Test 3: manifest_lists_every_registered_origin
// ─────────────────────────────────────────────────────────────

#[test]
fn manifest_lists_every_registered_origin() {
    let config = temp_config("manifest");
    let mut project = initialized(&config, "multi");
    let extra = CellCountInitializer::origin(project.origin_path("Archive"));
    project.handler_mut().register(extra).expect("register");
    project.write().expect("write");

    let recorded = project.read_manifest().expect("manifest");
    assert_eq!(recorded.len(), 2);
    assert!(recorded.contains(&project.origin_path("Archive")));
    assert!(recorded.contains(&project.origin_path("CellCount")));

    // Reopened with only the cell counter, the archive is unclaimed.
    let reopened = initialized(&config, "multi");
    assert_eq!(
        reopened.unclaimed_origins(),
        vec![project.origin_path("Archive").as_path()]
    );
}

// ─────────────────────────────────────────────────────────────
// Test 4: corrupted_origin_is_reported
// ─────────────────────────────────────────────────────────────

#[test]
fn corrupted_origin_is_reported() {
    let config = temp_config("corrupted_origin");
    {
        let mut project = initialized(&config, "broken");
        let key = cell_count_key(&project);
        let origin = project.handler_mut().origin_mut(&key).expect("origin");
        origin
            .add(Count::from_density(10.0, at(2, 9)).expect("count").into())
            .expect("add");
        project.write().expect("write");
    }

    let path = {
        let project = initialized(&config, "broken");
        project.origin_path(CellCountInitializer::ORIGIN_STEM)
    };
    let mut data = fs::read(&path).expect("read origin");
    data[0] = 0xEE;
    fs::write(&path, &data).expect("corrupt");

    let mut project = initialized(&config, "broken");
    match project.load_origins() {
        Err(RuntimeError::Store(err)) => assert_eq!(err.kind(), ErrorKind::InvalidEncoding),
        other => panic!("expected an encoding error, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────
// Test 5: truncated_manifest_is_invalid
// ─────────────────────────────────────────────────────────────

#[test]
fn truncated_manifest_is_invalid() {
    let config = temp_config("truncated_manifest");
    let project = initialized(&config, "short");
    project.write().expect("write");

    let data = fs::read(project.file()).expect("read manifest");
    fs::write(project.file(), &data[..data.len() - 1]).expect("truncate");

    match Project::<CellCountRecord>::open(&config, "short") {
        Err(RuntimeError::Store(err)) => assert_eq!(err.kind(), ErrorKind::InvalidEncoding),
        other => panic!("expected an encoding error, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────
// Test 6: shared_project_accepts_concurrent_adds
// ─────────────────────────────────────────────────────────────

#[test]
fn shared_project_accepts_concurrent_adds() {
    let config = temp_config("shared_project");
    let project = initialized(&config, "busy");
    let key = cell_count_key(&project);
    let shared = Arc::new(SharedProject::new(project));

    let workers: Vec<_> = (0..4u32)
        .map(|worker| {
            let shared = Arc::clone(&shared);
            let key = key.clone();
            thread::spawn(move || {
                for i in 0..25u32 {
                    let count = Count::from_density(f64::from(worker * 100 + i), at(3, 12))
                        .expect("count");
                    shared.with(|project| {
                        project
                            .handler_mut()
                            .origin_mut(&key)
                            .expect("origin")
                            .add(count.into())
                            .expect("add");
                    });
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    shared.write().expect("write");
    let project = shared.with(|project| {
        let origin = project.handler().origin(&key).expect("origin");
        let mut ids: Vec<i64> = origin
            .iter()
            .filter_map(|r| r.id().map(|id| id.id()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 100);
        project.name().to_string()
    });
    assert_eq!(project, "busy");
}

// ─────────────────────────────────────────────────────────────
// Test 7: config_file_drives_layout
// ─────────────────────────────────────────────────────────────

#[test]
fn config_file_drives_layout() {
    let base = temp_config("config_layout");
    let config_path = base.projects_dir.with_file_name("labtools.json");
    let custom = RuntimeConfig {
        origin_extension: "origin".to_string(),
        project_extension: "project".to_string(),
        ..base
    };
    custom.save(&config_path).expect("save config");

    let loaded = RuntimeConfig::load_or_default(&config_path).expect("load config");
    let project = initialized(&loaded, "custom");
    project.write().expect("write");

    assert!(loaded.projects_dir.join("custom").join("custom.project").is_file());
    assert!(loaded.projects_dir.join("custom").join("CellCount.origin").is_file());
}

// ─────────────────────────────────────────────────────────────
// Test 8: oversized_manifest_count_is_invalid
// ─────────────────────────────────────────────────────────────

#[test]
fn oversized_manifest_count_is_invalid() {
    let config = temp_config("oversized_manifest");
    let project = initialized(&config, "huge");
    fs::create_dir_all(project.folder()).expect("create folder");
    fs::write(project.file(), i32::MAX.to_be_bytes()).expect("write manifest");

    for result in [
        Project::<CellCountRecord>::open(&config, "huge"),
        Project::<CellCountRecord>::open_or_create(&config, "huge"),
    ] {
        match result {
            Err(RuntimeError::Store(err)) => assert_eq!(err.kind(), ErrorKind::InvalidEncoding),
            other => panic!("expected an encoding error, got {other:?}"),
        }
    }
}
