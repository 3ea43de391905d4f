mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn payledger() -> Command {
    let mut cmd = Command::new(cargo_bin!("payledger"));
    cmd.env_remove("RUST_LOG")
        .env_remove("LEDGER_DB_PATH")
        .env_remove("DUPLICATE_POLICY");
    cmd
}

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = payledger();
    cmd.arg("tests/fixtures/transfers.csv")
        .arg("--accounts")
        .arg("tests/fixtures/accounts.csv");

    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("account_number,balance\n"))
        .stdout(predicate::str::contains("ACC1001,450\n"))
        .stdout(predicate::str::contains("ACC1002,300\n"))
        .stdout(predicate::str::contains("ACC1003,500\n"));

    Ok(())
}

#[test]
fn test_cli_async_single_worker_matches_sync() {
    let mut cmd = payledger();
    cmd.arg("tests/fixtures/transfers.csv")
        .arg("--accounts")
        .arg("tests/fixtures/accounts.csv")
        .arg("--mode")
        .arg("async")
        .arg("--workers")
        .arg("1");

    cmd.assert().success().stdout(
        "account_number,balance\nACC1001,450\nACC1002,300\nACC1003,500\n",
    );
}

#[test]
fn test_cli_writes_ledger_report() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("ledger.csv");

    let mut cmd = payledger();
    cmd.arg("tests/fixtures/transfers.csv")
        .arg("--accounts")
        .arg("tests/fixtures/accounts.csv")
        .arg("--ledger-out")
        .arg(&report);
    cmd.assert().success();

    let text = std::fs::read_to_string(&report).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "id,from_account,to_account,amount,status,request_id,created_at"
    );
    // r1 completed (replayed once), r2 failed, r4 failed, r5 and the generated id completed.
    assert_eq!(lines.len(), 6);
    assert_eq!(lines.iter().filter(|l| l.contains(",r1,")).count(), 1);
    assert!(lines.iter().any(|l| l.contains("ACC1003,ACC1002,300,failed,r2,")));
    assert!(lines.iter().any(|l| l.contains("ACC1001,ACC1001,100,failed,r4,")));
    assert!(!text.contains(",r3,"));
}

#[test]
fn test_cli_skips_malformed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let accounts = dir.path().join("accounts.csv");
    let transfers = dir.path().join("transfers.csv");
    common::write_accounts_csv(&accounts, &[("A", 100), ("B", 0)]).unwrap();
    std::fs::write(
        &transfers,
        "request_id,from,to,amount\nx1,A,B,lots\nx2,A,B,40\nx3,A,B,-5\n",
    )
    .unwrap();

    let mut cmd = payledger();
    cmd.arg(&transfers).arg("--accounts").arg(&accounts);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("skipping unreadable transfer row"))
        .stdout(predicate::str::contains("A,60\n"))
        .stdout(predicate::str::contains("B,40\n"));
}

#[test]
fn test_cli_reject_policy_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let accounts = dir.path().join("accounts.csv");
    let transfers = dir.path().join("transfers.csv");
    common::write_accounts_csv(&accounts, &[("A", 100), ("B", 0)]).unwrap();
    common::write_transfers_csv(&transfers, &[("d1", "A", "B", 10), ("d1", "A", "B", 10)])
        .unwrap();

    let mut cmd = payledger();
    cmd.env("DUPLICATE_POLICY", "reject")
        .arg(&transfers)
        .arg("--accounts")
        .arg(&accounts);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("duplicate"))
        .stdout(predicate::str::contains("B,10\n"));
}

#[test]
fn test_cli_rejects_zero_workers() {
    let mut cmd = payledger();
    cmd.arg("tests/fixtures/transfers.csv").arg("--workers").arg("0");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("worker count must be at least 1"));
}

#[test]
fn test_cli_help_marks_duplicate_default_provisional() {
    let mut cmd = payledger();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--duplicate-policy"))
        .stdout(predicate::str::contains("provisional"));
}
