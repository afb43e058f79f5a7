use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;

#[test]
fn test_boundary_amounts() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("boundary_test.csv");
    let mut wtr = csv::Writer::from_path(&output_path).unwrap();
    wtr.write_record(common::HEADER).unwrap();

    // Exactly the UPI limit, and one paisa over it
    wtr.write_record(["r-1", "UPI", "100000.00", "INR", "a@okbank", "b@ybl", "k-1"])
        .unwrap();
    wtr.write_record(["r-2", "UPI", "100000.01", "INR", "a@okbank", "b@ybl", "k-2"])
        .unwrap();
    // Smallest positive INR amount
    wtr.write_record(["r-3", "UPI", "0.01", "INR", "a@okbank", "b@ybl", "k-3"])
        .unwrap();
    // Exactly the transfer minimum
    wtr.write_record([
        "r-4",
        "BANK_TRANSFER",
        "1.00",
        "EUR",
        "DE89370400440532013000",
        "FR1420041010050500013M02606",
        "k-4",
    ])
    .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",r-1,UPI,succeeded,2,"))
        .stdout(predicate::str::contains(
            ",r-2,UPI,failed,0,validation failed: amount exceeds UPI limit",
        ))
        .stdout(predicate::str::contains(",r-3,UPI,succeeded,2,"))
        .stdout(predicate::str::contains(",r-4,BANK_TRANSFER,succeeded,2,"));
}

#[test]
fn test_extreme_decimal_precision() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("precision_test.csv");
    let mut wtr = csv::Writer::from_path(&output_path).unwrap();
    wtr.write_record(common::HEADER).unwrap();

    // Sub-cent amounts cannot settle on a card rail
    wtr.write_record(["r-1", "CARD", "0.0001", "USD", "tok_visa", "merchant-1", "k-1"])
        .unwrap();
    // Trailing zeros beyond two places are fine
    wtr.write_record(["r-2", "CARD", "5.2500", "USD", "tok_visa", "merchant-1", "k-2"])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            ",r-1,CARD,failed,0,validation failed: card amounts carry at most two decimal places",
        ))
        .stdout(predicate::str::contains(",r-2,CARD,succeeded,2,"));
}
