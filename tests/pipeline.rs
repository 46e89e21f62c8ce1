// Import -> match -> report, end to end against a scratch ledger

use charter_recon::{
    db::{self, RecordFilter},
    load_file, MatchConfig, Matcher, Reporter, RunSummary, SourceKind,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const STATEMENT: &str = "\
Date,Description,Withdrawal,Deposit,Balance
2024-02-01,POS FAS GAS PLUS #221,105.00,,9895.00
2024-02-02,PREAUTHORIZED DEBIT TELUS MOBILITY,85.12,,9809.88
2024-02-05,SQUARE INC DEPOSIT,,1250.00,11059.88
2024-02-05,SQUARE INC DEPOSIT,,1250.00,12309.88
2024-02-07,HEFFNER AUTO FC,1890.00,,10419.88
2024-02-12,CHEQUE 1043,400.00,,10019.88
2024-02-14,SERVICE CHARGE,15.00,,10004.88
";

const LEDGER: &str = "\
Date,Description,Amount,Reference
2024-02-02,Fas Gas fuel,-105.00,
2024-02-01,Telus mobility,-85.12,
2024-02-06,Square payout,1250.00,
2024-02-06,Square payout (second terminal),1250.00,
2024-02-09,Heffner Auto Finance lease,-1890.01,
2024-02-20,Charter refund 019233,-312.50,019233
";

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn importing_the_same_file_twice_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let statement = write(dir.path(), "bank_feb.csv", STATEMENT);
    let conn = db::open_database(&dir.path().join("recon.db")).unwrap();

    let loaded = load_file(&statement, None, None).unwrap();
    assert_eq!(loaded.records.len(), 7);
    assert!(loaded.rejects.is_empty());

    let first = db::insert_records(&conn, &loaded.records, "test").unwrap();
    let count_after_first = db::verify_count(&conn).unwrap();

    let again = load_file(&statement, None, None).unwrap();
    let second = db::insert_records(&conn, &again.records, "test").unwrap();

    // Both same-day Square deposits are real and both land
    assert_eq!(first.inserted, 7);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped_duplicates, 7);
    assert_eq!(db::verify_count(&conn).unwrap(), count_after_first);
    assert_eq!(first.inserted as i64, count_after_first);
}

#[test]
fn matched_pairs_respect_window_and_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let statement = write(dir.path(), "bank_feb.csv", STATEMENT);
    let ledger = write(dir.path(), "ledger.csv", LEDGER);

    let a = load_file(&statement, Some(SourceKind::Bank), None).unwrap().records;
    let mut b_load = load_file(&ledger, Some(SourceKind::Generic), None).unwrap();
    b_load.relabel("ledger");
    let b = b_load.records;

    let config = MatchConfig::default();
    let outcome = Matcher::new(config.clone()).unwrap().match_records(&a, &b);

    for pair in &outcome.pairs {
        assert!(pair.date_diff_days.abs() <= config.date_window_days);
        assert!(pair.amount_diff_cents <= config.amount_tolerance_cents);
        assert!((pair.a.date - pair.b.date).num_days().abs() <= config.date_window_days);
        assert!((pair.a.amount_cents - pair.b.amount_cents).abs() <= config.amount_tolerance_cents);
    }

    // Both Square deposits pair up one-to-one
    let square_pairs = outcome
        .pairs
        .iter()
        .filter(|p| p.a.description.contains("SQUARE"))
        .count();
    assert_eq!(square_pairs, 2);

    // Heffner within 1 cent, Fas Gas and Telus within a day
    assert_eq!(outcome.pairs.len(), 5);

    // Every A record exactly once across pairs + unmatched
    let mut seen = HashSet::new();
    for i in outcome.pairs.iter().map(|p| p.a_index).chain(outcome.unmatched_a.iter().map(|u| u.index)) {
        assert!(seen.insert(i), "A index {} appears twice", i);
    }
    assert_eq!(seen.len(), a.len());

    let unmatched: Vec<&str> = outcome
        .unmatched_a
        .iter()
        .map(|u| u.record.description.as_str())
        .collect();
    assert_eq!(unmatched, vec!["CHEQUE 1043", "SERVICE CHARGE"]);
    assert_eq!(outcome.unmatched_b.len(), 1);
    assert_eq!(outcome.unmatched_b[0].record.reference.as_deref(), Some("019233"));
}

#[test]
fn unmatched_report_lists_each_record_once() {
    let dir = tempfile::tempdir().unwrap();
    let statement = write(dir.path(), "bank_feb.csv", STATEMENT);
    let ledger = write(dir.path(), "ledger.csv", LEDGER);
    let out = dir.path().join("report");

    let a = load_file(&statement, None, None).unwrap().records;
    let b = load_file(&ledger, Some(SourceKind::Generic), None).unwrap().records;

    let config = MatchConfig::default();
    let outcome = Matcher::new(config.clone()).unwrap().match_records(&a, &b);
    let summary = RunSummary::from_outcome("bank", "ledger", &outcome);

    Reporter::default().write_all(&out, &summary, &config, &outcome).unwrap();

    let mut reader = csv::Reader::from_path(out.join("unmatched_a.csv")).unwrap();
    let headers = reader.headers().unwrap().clone();
    let line_col = headers.iter().position(|h| h == "line_number").unwrap();

    let lines: Vec<String> = reader
        .records()
        .map(|r| r.unwrap()[line_col].to_string())
        .collect();
    let unique: HashSet<&String> = lines.iter().collect();

    assert_eq!(lines.len(), outcome.unmatched_a.len());
    assert_eq!(unique.len(), lines.len());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
    assert_eq!(json["summary"]["unmatched_a"], 2);
}

#[test]
fn stored_run_round_trips_through_the_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = write(dir.path(), "ledger.csv", LEDGER);
    let statement = write(dir.path(), "bank_feb.csv", STATEMENT);
    let conn = db::open_database(&dir.path().join("recon.db")).unwrap();

    let mut ledger_rows = load_file(&ledger, Some(SourceKind::Generic), None).unwrap();
    ledger_rows.relabel("ledger");
    db::insert_records(&conn, &ledger_rows.records, "test").unwrap();

    let b: Vec<_> = db::get_records(
        &conn,
        &RecordFilter {
            source: Some("ledger"),
            ..Default::default()
        },
    )
    .unwrap()
    .into_iter()
    .map(|s| s.record)
    .collect();
    assert_eq!(b.len(), 6);

    let a = load_file(&statement, None, None).unwrap().records;
    let config = MatchConfig::default();
    let outcome = Matcher::new(config.clone()).unwrap().match_records(&a, &b);
    let summary = RunSummary::from_outcome("bank", "ledger", &outcome);
    db::save_run(&conn, &summary, &config, &outcome).unwrap();

    let detail = db::get_run(&conn, &summary.run_id).unwrap();
    assert_eq!(detail.summary.matched, outcome.pairs.len());
    assert_eq!(detail.outcome.unmatched_a.len(), outcome.unmatched_a.len());
    assert_eq!(detail.outcome.unmatched_b.len(), outcome.unmatched_b.len());
}
