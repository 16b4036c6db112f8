use std::io::Write;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use highlights_core::ledger::{LedgerEntry, LedgerError, SqliteLedger};

fn setup_ledger() -> (TempDir, SqliteLedger) {
    let dir = tempfile::tempdir().unwrap();
    let ledger = SqliteLedger::builder()
        .path(dir.path().join("data/ledger.sqlite"))
        .create_if_missing(true)
        .build()
        .unwrap();
    ledger.initialize().unwrap();
    (dir, ledger)
}

fn entry(event_id: &str, hours_ago: i64) -> LedgerEntry {
    let base = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
    LedgerEntry {
        event_id: event_id.to_string(),
        sport: "Soccer".into(),
        league_id: "4328".into(),
        event_date: NaiveDate::from_ymd_opt(2024, 5, 19),
        home_team: "Arsenal".into(),
        away_team: "Chelsea".into(),
        home_score: Some(2),
        away_score: Some(1),
        final_score: Some("2-1".into()),
        output_path: format!("/var/lib/highlights/videos/{event_id}_final.mp4"),
        video_url: Some("https://www.youtube.com/watch?v=abc".into()),
        search_query: Some("Chelsea vs Arsenal highlights 2024-05-19".into()),
        sha256: None,
        processed_at: base - Duration::hours(hours_ago),
    }
}

#[test]
fn missing_ledger_reports_nothing_processed() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = SqliteLedger::new(dir.path().join("absent.sqlite")).unwrap();
    assert!(!ledger.has_processed("4328-1").unwrap());
    assert!(ledger.processed_ids().unwrap().is_empty());
    assert_eq!(ledger.count().unwrap(), 0);
    assert!(ledger.fetch("4328-1").unwrap().is_none());
    assert!(!ledger.exists());
}

#[test]
fn record_then_fetch_round_trips() {
    let (_dir, ledger) = setup_ledger();
    let original = entry("4328-1", 0);
    ledger.record(&original).unwrap();

    assert!(ledger.has_processed("4328-1").unwrap());
    let fetched = ledger.fetch("4328-1").unwrap().unwrap();
    assert_eq!(fetched, original);
    assert_eq!(ledger.integrity_check().unwrap(), "ok");
}

#[test]
fn duplicate_record_is_rejected() {
    let (_dir, ledger) = setup_ledger();
    ledger.record(&entry("4328-1", 0)).unwrap();
    let err = ledger.record(&entry("4328-1", 1)).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyRecorded { ref event_id } if event_id == "4328-1"));
    assert_eq!(ledger.count().unwrap(), 1);
}

#[test]
fn list_returns_most_recent_first() {
    let (_dir, ledger) = setup_ledger();
    ledger.record(&entry("4328-1", 48)).unwrap();
    ledger.record(&entry("4328-2", 0)).unwrap();
    ledger.record(&entry("4328-3", 24)).unwrap();

    let ids: Vec<String> = ledger
        .list(2)
        .unwrap()
        .into_iter()
        .map(|e| e.event_id)
        .collect();
    assert_eq!(ids, vec!["4328-2", "4328-3"]);
    assert_eq!(ledger.processed_ids().unwrap().len(), 3);
}

#[test]
fn recorded_outputs_lists_final_paths() {
    let (_dir, ledger) = setup_ledger();
    assert!(ledger.recorded_outputs().unwrap().is_empty());
    ledger.record(&entry("4328-12_3", 0)).unwrap();
    let outputs = ledger.recorded_outputs().unwrap();
    assert!(outputs.contains(&PathBuf::from(
        "/var/lib/highlights/videos/4328-12_3_final.mp4"
    )));
}

fn write_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn legacy_import_keeps_only_identifiers_with_details() {
    let (dir, ledger) = setup_ledger();
    ledger.record(&entry("4328-1", 0)).unwrap();

    let ids = write_file(&dir, "processed_events.txt", "4328-1\n4328-2\n\n4387-3\n4328-2\n");
    let details = write_file(
        &dir,
        "processed_details.json",
        &[
            serde_json::json!({"event_id": "4328-1", "home_team": "Arsenal"}).to_string(),
            serde_json::json!({
                "event_id": "4328-2",
                "sport": "Soccer",
                "league_id": 4328,
                "date": "2024-05-18",
                "home_team": "Everton",
                "away_team": "Fulham",
                "home_score": 0,
                "away_score": "0",
                "processed_date": "2024-05-19T08:00:00",
                "output_file": "/videos/4328-2_final.mp4"
            })
            .to_string(),
            serde_json::json!({"event_id": "4480-9"}).to_string(),
        ]
        .join("\n"),
    );

    let report = ledger.import_legacy(&ids, &details).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.already_present, 1);
    assert_eq!(report.missing_details, vec!["4387-3".to_string()]);
    assert_eq!(report.missing_ids, vec!["4480-9".to_string()]);

    let imported = ledger.fetch("4328-2").unwrap().unwrap();
    assert_eq!(imported.final_score.as_deref(), Some("0-0"));
    assert_eq!(imported.event_date, NaiveDate::from_ymd_opt(2024, 5, 18));
    assert!(!ledger.has_processed("4387-3").unwrap());
}

#[test]
fn legacy_import_accepts_json_array() {
    let (dir, ledger) = setup_ledger();
    let ids = write_file(&dir, "ids.txt", "4391-7\n");
    let details = write_file(
        &dir,
        "details.json",
        r#"[{"event_id": "4391-7", "sport": "American Football", "league_id": "4391"}]"#,
    );
    let report = ledger.import_legacy(&ids, &details).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(ledger.fetch("4391-7").unwrap().unwrap().league_id, "4391");
}
