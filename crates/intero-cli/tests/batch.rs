use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs};
use tempfile::tempdir;

#[test]
fn simulated_dataset_runs_end_to_end() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let data = temp.path().join("data");
    let out = temp.path().join("out");
    let qc = temp.path().join("qc");
    let summary = temp.path().join("summary.json");

    let mut simulate = cargo_bin_cmd!("intero");
    simulate.args([
        "simulate",
        "--out",
        data.to_str().expect("utf8 path"),
        "--participants",
        "2",
    ]);
    let stdout = simulate.assert().success().get_output().stdout.clone();
    let ids: Vec<String> = serde_json::from_slice(&stdout)?;
    assert_eq!(ids, vec!["sub-01", "sub-02"]);

    let mut batch = cargo_bin_cmd!("intero");
    batch.args([
        "batch",
        "--root",
        data.to_str().expect("utf8 path"),
        "--out",
        out.to_str().expect("utf8 path"),
        "--qc-dir",
        qc.to_str().expect("utf8 path"),
        "--summary",
        summary.to_str().expect("utf8 path"),
    ]);
    let stdout = batch.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8(stdout)?;
    assert!(stdout.contains("sub-01\n  * synthetic\n  - RS\n  - HCT\n"));
    assert!(stdout.trim_end().ends_with("Done!"));

    let report: Value = serde_json::from_str(&fs::read_to_string(&summary)?)?;
    assert_eq!(report["processed"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["failed"].as_array().map(Vec::len), Some(0));

    let mut reader = csv::Reader::from_path(out.join("data_participants.csv"))?;
    let acc = reader
        .headers()?
        .iter()
        .position(|h| h == "HCT_Accuracy")
        .expect("accuracy column");
    for record in reader.records() {
        assert_eq!(record?[acc].parse::<f64>()?, 1.0);
    }
    assert!(out.join("data_hep.csv").exists());
    for stem in [
        "qc_rs_events",
        "qc_hct_events",
        "qc_hct_hep",
        "qc_hct_counts",
        "qc_rs_ppg",
        "qc_hct_eeg",
        "qc_rs_psd",
    ] {
        assert!(qc.join(format!("{stem}.png")).exists(), "{stem} missing");
    }
    Ok(())
}

#[test]
fn rerun_leaves_outputs_untouched() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let data = temp.path().join("data");
    let out = temp.path().join("out");
    cargo_bin_cmd!("intero")
        .args([
            "simulate",
            "--out",
            data.to_str().expect("utf8 path"),
            "--participants",
            "1",
        ])
        .assert()
        .success();

    let run = || {
        cargo_bin_cmd!("intero")
            .args([
                "batch",
                "--root",
                data.to_str().expect("utf8 path"),
                "--out",
                out.to_str().expect("utf8 path"),
            ])
            .assert()
            .success();
    };
    run();
    let cohort = fs::read(out.join("data_participants.csv"))?;
    let hep = fs::read(out.join("data_hep.csv"))?;
    run();
    assert_eq!(fs::read(out.join("data_participants.csv"))?, cohort);
    assert_eq!(fs::read(out.join("data_hep.csv"))?, hep);
    Ok(())
}

#[test]
fn overrides_and_config_are_applied() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let data = temp.path().join("data");
    let out = temp.path().join("out");
    cargo_bin_cmd!("intero")
        .args([
            "simulate",
            "--out",
            data.to_str().expect("utf8 path"),
            "--participants",
            "2",
        ])
        .assert()
        .success();
    let overrides = temp.path().join("overrides.toml");
    fs::write(&overrides, "[sub-02]\nskip = [\"hct\"]\n")?;
    let config = temp.path().join("config.toml");
    fs::write(&config, "cohort_file = \"cohort.csv\"\nhep_file = \"hep.csv\"\n")?;

    cargo_bin_cmd!("intero")
        .args([
            "batch",
            "--root",
            data.to_str().expect("utf8 path"),
            "--out",
            out.to_str().expect("utf8 path"),
            "--config",
            config.to_str().expect("utf8 path"),
            "--overrides",
            overrides.to_str().expect("utf8 path"),
        ])
        .assert()
        .success();

    let mut reader = csv::Reader::from_path(out.join("cohort.csv"))?;
    let acc = reader
        .headers()?
        .iter()
        .position(|h| h == "HCT_Accuracy")
        .expect("accuracy column");
    let values: Vec<String> = reader
        .records()
        .map(|r| r.map(|r| r[acc].to_string()))
        .collect::<Result<_, _>>()?;
    assert_eq!(values.len(), 2);
    assert!(!values[0].is_empty());
    assert!(values[1].is_empty());
    Ok(())
}

#[test]
fn malformed_overrides_fail_fast() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let overrides = temp.path().join("overrides.toml");
    fs::write(&overrides, "[sub-01]\nexclude_trial = [1]\n")?;
    cargo_bin_cmd!("intero")
        .args([
            "batch",
            "--root",
            temp.path().to_str().expect("utf8 path"),
            "--out",
            temp.path().join("out").to_str().expect("utf8 path"),
            "--overrides",
            overrides.to_str().expect("utf8 path"),
        ])
        .assert()
        .failure();
    Ok(())
}
