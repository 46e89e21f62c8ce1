// charter-recon binary, driven through assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const STATEMENT: &str = "\
Date,Description,Withdrawal,Deposit,Balance
2024-02-01,POS FAS GAS PLUS #221,105.00,,9895.00
2024-02-05,SQUARE INC DEPOSIT,,1250.00,11145.00
2024-02-14,SERVICE CHARGE,15.00,,11130.00
";

const LEDGER: &str = "\
Date,Description,Amount
2024-02-02,Fas Gas fuel,-105.00
2024-02-06,Square payout,1250.00
";

fn recon(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("charter-recon").unwrap();
    cmd.current_dir(dir)
        .env_remove("RECON_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(dir.join("recon.db"));
    cmd
}

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bank_feb.csv"), STATEMENT).unwrap();
    fs::write(dir.path().join("ledger.csv"), LEDGER).unwrap();
    dir
}

#[test]
fn identical_rows_in_one_statement_are_all_imported() {
    let dir = setup();
    fs::write(
        dir.path().join("bank_twice.csv"),
        "Date,Description,Withdrawal,Deposit,Balance\n\
         2024-02-05,SQUARE INC DEPOSIT,,1250.00,11250.00\n\
         2024-02-05,SQUARE INC DEPOSIT,,1250.00,12500.00\n",
    )
    .unwrap();

    recon(dir.path())
        .args(["import", "--file", "bank_twice.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 records (0 duplicates skipped)"));

    recon(dir.path())
        .args(["import", "--file", "bank_twice.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 0 records (2 duplicates skipped)"));
}

#[test]
fn import_is_idempotent() {
    let dir = setup();

    recon(dir.path())
        .args(["import", "--file", "bank_feb.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 3 records (0 duplicates skipped)"));

    recon(dir.path())
        .args(["import", "--file", "bank_feb.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 0 records (3 duplicates skipped)"));
}

#[test]
fn dry_run_import_writes_nothing() {
    let dir = setup();

    recon(dir.path())
        .args(["import", "--file", "bank_feb.csv", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 would be imported"));

    recon(dir.path())
        .arg("sources")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ledger is empty"));
}

#[test]
fn match_writes_reports_and_stores_run() {
    let dir = setup();

    recon(dir.path())
        .args([
            "match", "--a", "bank_feb.csv", "--b", "ledger.csv", "--b-source", "generic", "--out", "out",
            "--write",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 matched"))
        .stdout(predicate::str::contains("Saved run"));

    for name in ["matched.csv", "unmatched_a.csv", "unmatched_b.csv", "report.json", "summary.md"] {
        assert!(dir.path().join("out").join(name).exists(), "missing {}", name);
    }

    recon(dir.path())
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("bank / generic"));
}

#[test]
fn match_requires_a_second_source() {
    let dir = setup();

    recon(dir.path())
        .args(["match", "--a", "bank_feb.csv"])
        .assert()
        .failure();
}

#[test]
fn balance_reports_balanced_statement() {
    let dir = setup();

    recon(dir.path())
        .args([
            "balance", "--file", "bank_feb.csv", "--opening", "10000.00", "--closing", "11130.00", "--from",
            "2024-02-01", "--to", "2024-02-29",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("✅"));
}

#[test]
fn unbalanced_statement_exits_nonzero() {
    let dir = setup();

    recon(dir.path())
        .args([
            "balance", "--file", "bank_feb.csv", "--opening", "10000.00", "--closing", "11000.00", "--from",
            "2024-02-01", "--to", "2024-02-29",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("⚠️"));
}

#[test]
fn balance_thresholds_come_from_config() {
    let dir = setup();
    fs::write(
        dir.path().join("loose.toml"),
        "[balance]\ntolerance_cents = 20000\nmajor_threshold_cents = 50000\n",
    )
    .unwrap();

    recon(dir.path())
        .args([
            "--config", "loose.toml", "balance", "--file", "bank_feb.csv", "--opening", "10000.00", "--closing",
            "11000.00", "--from", "2024-02-01", "--to", "2024-02-29",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("✅"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = setup();
    fs::write(dir.path().join("bad.toml"), "[matching]\nmin_score = 3.0\n").unwrap();

    recon(dir.path())
        .args(["--config", "bad.toml", "runs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_score"));
}

#[test]
fn unknown_source_format_fails() {
    let dir = setup();

    recon(dir.path())
        .args(["import", "--file", "bank_feb.csv", "--source", "chase"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown source format"));
}
