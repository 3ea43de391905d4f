mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let transfers = dir.path().join("transfers.csv");
    common::write_transfers_csv(&transfers, &[("f1", "A", "B", 1)]).unwrap();

    let mut cmd = Command::new(cargo_bin!("payledger"));
    cmd.env_remove("RUST_LOG")
        .arg(&transfers)
        .arg("--db-path")
        .arg(dir.path().join("some_db"));

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "Persistent storage requested via --db-path",
        ))
        .stdout("account_number,balance\n");
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let transfers = dir.path().join("transfers.csv");
    common::write_transfers_csv(&transfers, &[("f1", "A", "B", 1)]).unwrap();

    let mut cmd = Command::new(cargo_bin!("payledger"));
    cmd.env_remove("RUST_LOG")
        .arg(&transfers)
        .arg("--db-path")
        .arg(dir.path().join("test_db"));

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Persistent storage requested").not());
}
