//! Integration tests for the storage layer without the HTTP surface

use chrono::{DateTime, Duration, Local, TimeZone};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use feedback_ledger::config::StoragePaths;
use feedback_ledger::csv_store::CsvStore;
use feedback_ledger::environment::Environment;
use feedback_ledger::json_store::JsonStore;
use feedback_ledger::record::{FIELD_COUNT, FeedbackPayload, HEADERS};
use feedback_ledger::store::{BackendKind, Clock, FeedbackStore, StorageBackend};

/// Clock that advances one minute per reading
struct SteppingClock(Mutex<DateTime<Local>>);

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Local> {
        let mut current = self.0.lock().unwrap();
        let now = *current;
        *current = now + Duration::minutes(1);
        now
    }
}

fn stepping_clock() -> Arc<dyn Clock> {
    Arc::new(SteppingClock(Mutex::new(
        Local.with_ymd_and_hms(2024, 12, 31, 23, 58, 0).unwrap(),
    )))
}

fn payload(value: Value) -> FeedbackPayload {
    FeedbackPayload::from_json(value).unwrap()
}

#[test]
fn every_backend_keeps_submissions_in_order() {
    let dir = tempdir().unwrap();
    let paths = StoragePaths::in_dir(dir.path());
    let store = FeedbackStore::for_environment(&Environment::local(), &paths).with_clock(stepping_clock());

    for name in ["Asha", "Ravi", "Mira"] {
        assert!(store.save(&payload(json!({ "name": name }))).success);
    }

    let backends: Vec<Box<dyn StorageBackend>> = vec![
        Box::new(feedback_ledger::excel_store::ExcelStore::new(&paths.excel)),
        Box::new(JsonStore::new(&paths.json)),
        Box::new(CsvStore::new(&paths.csv)),
    ];
    for backend in backends {
        let records = backend.load().unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Asha", "Ravi", "Mira"], "{}", backend.kind());

        // The clock crosses midnight between the second and third save
        assert_eq!(records[0].submission_date, "31/12/2024");
        assert_eq!(records[0].submission_time, "11:58:00 pm");
        assert_eq!(records[2].submission_date, "1/1/2025");
        assert_eq!(records[2].submission_time, "12:00:00 am");
    }
}

#[test]
fn missing_fields_are_stored_as_empty_strings() {
    let dir = tempdir().unwrap();
    let paths = StoragePaths::in_dir(dir.path());
    let store = FeedbackStore::for_environment(&Environment::local(), &paths).with_clock(stepping_clock());

    store.save(&payload(json!({ "unknown_field": "ignored" })));

    let entries: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    let entry = entries[0].as_object().unwrap();
    for key in ["likedMost", "planningToBuy", "interestedIn", "experienceRating", "name", "whatsapp"] {
        assert_eq!(entry[key], "", "{}", key);
    }
    assert!(!entry.contains_key("unknown_field"));

    let csv = std::fs::read_to_string(&paths.csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], HEADERS.join(","));
    assert_eq!(lines[1].split(',').count(), FIELD_COUNT);
}

#[test]
fn awkward_text_survives_the_csv_file() {
    let dir = tempdir().unwrap();
    let store = FeedbackStore::with_backends(None, vec![Box::new(CsvStore::new(dir.path().join("f.csv")))])
        .with_clock(stepping_clock());

    let name = "Asha \"Ash\" K, Jr.\nSecond line";
    store.save(&payload(json!({ "name": name, "liked_most": ["A, B", "C"] })));

    let view = store.load_all();
    assert_eq!(view.source, BackendKind::Csv.name());
    assert_eq!(view.data[0].name, name);
    assert_eq!(view.data[0].liked_most, "A, B; C");
}

#[test]
fn hosted_store_reads_json_before_csv() {
    let dir = tempdir().unwrap();
    let paths = StoragePaths::in_dir(dir.path());
    let store = FeedbackStore::for_environment(&Environment::hosted("railway"), &paths).with_clock(stepping_clock());

    store.save(&payload(json!({ "jewel_types": ["Rings", "Bangles"] })));

    let view = store.load_all();
    assert_eq!(view.source, "json");
    assert_eq!(view.data[0].interested_in, "Rings, Bangles");
    assert!(!paths.excel.exists());
}
