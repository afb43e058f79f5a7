use assert_cmd::cargo_bin;
use std::process::Command;

mod common;

#[test]
fn test_large_batch_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("large_test.csv");
    common::generate_csv(&output_path, 5_000).expect("Failed to generate CSV");

    let output = Command::new(cargo_bin!("paygate"))
        .arg(&output_path)
        .arg("--concurrency")
        .arg("64")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "Binary failed to process batch");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 5_001);
    assert!(stdout.lines().skip(1).all(|line| line.contains(",succeeded,")));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_large_batch_streaming_db() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("large_test.csv");
    common::generate_csv(&output_path, 2_000).expect("Failed to generate CSV");

    let status = Command::new(cargo_bin!("paygate"))
        .arg(&output_path)
        .arg("--db-path")
        .arg(dir.path().join("test_db"))
        .env("RUST_LOG", "warn")
        .status()
        .expect("Failed to execute command");
    assert!(status.success(), "Binary failed to process batch with RocksDB");
}
