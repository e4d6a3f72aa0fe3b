use std::{error::Error, fs, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmider")?;

    cmd.arg("not_real.mzML")
        .arg("tests/data/identifications.tsv")
        .arg("-o")
        .arg("-");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("An IO error occurred"));
    Ok(())
}

#[test]
fn test_identifications_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmider")?;

    cmd.arg("tests/data/labeling_test.mzML")
        .arg("not_real.tsv")
        .arg("-o")
        .arg("-");
    cmd.assert().failure().stderr(predicate::str::contains(
        "Failed to read the identification table",
    ));
    Ok(())
}

#[test]
fn test_malformed_time_range() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmider")?;

    cmd.arg("not_real.mzML")
        .arg("not_real.tsv")
        .args(["-o", "-", "-r", "a-z"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "Failed to parse time range start invalid float literal",
    ));
    Ok(())
}

#[test]
fn test_invalid_parameters() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzmider")?;

    cmd.arg("tests/data/labeling_test.mzML")
        .arg("tests/data/identifications.tsv")
        .args(["-o", "-", "-f", "1.5"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
    Ok(())
}

#[test]
fn test_run() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("labeling_test.mid.tsv");

    let mut cmd = Command::cargo_bin("mzmider")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("tests/data/labeling_test.mzML")
        .arg("tests/data/identifications.tsv")
        .arg("-o")
        .arg(&output)
        .args(["-t", "2"]);
    let result = cmd.assert().success();
    result
        .stderr(predicate::str::contains("MS1 Spectra: 101"))
        .stderr(predicate::str::contains(
            "Identifications: 7 | Skipped: 1 | Below Confidence Threshold: 1",
        ))
        .stderr(predicate::str::contains("Extracted: 3"))
        .stderr(predicate::str::contains("Rows Written: 5"));

    let text = fs::read_to_string(&output)?;
    let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();
    assert_eq!(lines.len(), 6);
    let header = &lines[0];
    let column = |name: &str| header.iter().position(|h| *h == name).unwrap();
    assert_eq!(header.len(), 7 + 6 + 6 + 7);

    let indices: Vec<&str> = lines[1..].iter().map(|row| row[column("index")]).collect();
    assert_eq!(indices, ["0", "1", "2", "3", "5"]);
    let statuses: Vec<&str> = lines[1..].iter().map(|row| row[column("status")]).collect();
    assert_eq!(
        statuses,
        ["ok", "ok", "ok", "insufficient_data", "invalid_input"]
    );

    let peptide = &lines[1];
    let f0: f64 = peptide[column("fraction_0")].parse()?;
    assert!((0.40..0.50).contains(&f0), "fraction_0 = {f0}");
    let total: f64 = (0..6)
        .map(|i| peptide[column(&format!("fraction_{i}"))].parse::<f64>().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-6);
    assert_eq!(peptide[column("sample")], "day-3");
    assert_eq!(peptide[column("protein")], "sp|P00001|TEST1");

    // Resolved from its scan ID
    let flanked = &lines[3];
    let rt: f64 = flanked[column("retention_time")].parse()?;
    assert!((rt - 10.5).abs() < 1e-6);
    assert_eq!(flanked[column("valid")], "true");

    assert_eq!(lines[5][column("valid")], "false");
    Ok(())
}

#[test]
fn test_run_subset() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("subset.mid.tsv.gz");

    let mut cmd = Command::cargo_bin("mzmider")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("tests/data/labeling_test.mzML")
        .arg("tests/data/identifications.tsv")
        .arg("-o")
        .arg(&output)
        .args(["-r", "10-10.9", "-k", "3"]);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("MS1 Spectra: 101").not())
        .stderr(predicate::str::contains("Rows Written: 5"));
    assert!(fs::metadata(&output)?.len() > 0);
    Ok(())
}
