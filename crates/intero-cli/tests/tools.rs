use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs};
use tempfile::tempdir;

fn marker_recording(low_runs: &[usize], gap: usize) -> String {
    let mut text = String::from("PHOTO\tECG\n");
    let mut push = |value: f64, n: usize| {
        for i in 0..n {
            text.push_str(&format!("{value}\t{}\n", i % 7));
        }
    };
    push(1.0, gap);
    for &run in low_runs {
        push(0.0, run);
        push(1.0, gap);
    }
    text
}

/// 10 Hz recording with 2 s marker runs at the given onsets and an R-peak
/// indicator every fifth sample.
fn timed_markers(onsets: &[usize], len: usize) -> String {
    let mut text = String::from("PHOTO\tR\n");
    for i in 0..len {
        let low = onsets.iter().any(|&o| i >= o && i < o + 20);
        let photo = if low { 0.0 } else { 1.0 };
        let peak = u8::from(i % 5 == 0);
        text.push_str(&format!("{photo}\t{peak}\n"));
    }
    text
}

#[test]
fn events_find_reports_long_runs_only() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let input = temp.path().join("marker.tsv");
    // 10 Hz: runs of 6 s, 3 s and 8 s
    fs::write(&input, marker_recording(&[60, 30, 80], 20))?;

    let mut cmd = cargo_bin_cmd!("intero");
    cmd.args([
        "events-find",
        "--input",
        input.to_str().expect("utf8 path"),
        "--fs",
        "10",
        "--duration-min-s",
        "5",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let events: Value = serde_json::from_slice(&output)?;
    let events = events.as_array().expect("event list");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["onset"], 20);
    assert_eq!(events[0]["duration"], 60);
    assert_eq!(events[1]["onset"], 20 + 60 + 20 + 30 + 20);
    assert_eq!(events[1]["duration"], 80);
    Ok(())
}

#[test]
fn events_find_without_rate_fails() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let input = temp.path().join("marker.tsv");
    fs::write(&input, marker_recording(&[60], 20))?;
    cargo_bin_cmd!("intero")
        .args(["events-find", "--input", input.to_str().expect("utf8 path")])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn epochs_align_timestamps_to_markers() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let input = temp.path().join("task.tsv");
    let times = temp.path().join("times.txt");
    fs::write(&input, timed_markers(&[30, 70, 140, 190], 250))?;
    fs::write(&times, "10.0\n14.0\n21.0\n26.0\n")?;
    let mut cmd = cargo_bin_cmd!("intero");
    cmd.args([
        "epochs",
        "--input",
        input.to_str().expect("utf8 path"),
        "--timestamps",
        times.to_str().expect("utf8 path"),
        "--fs",
        "10",
        "--count",
        "R",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["offset"], -70);
    assert_eq!(report["anchors"], serde_json::json!([30, 70, 140, 190]));
    assert_eq!(report["markers"], report["anchors"]);
    assert_eq!(report["n_epochs"], 4);
    assert_eq!(report["counts"], serde_json::json!([2, 2, 2, 2]));
    assert_eq!(report["warnings"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn epochs_flag_disagreeing_clocks() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let input = temp.path().join("task.tsv");
    let times = temp.path().join("times.txt");
    fs::write(&input, timed_markers(&[30, 70, 140, 190], 250))?;
    fs::write(&times, "10.0\n18.0\n19.0\n26.0\n31.5\n")?;
    let mut cmd = cargo_bin_cmd!("intero");
    cmd.args([
        "epochs",
        "--input",
        input.to_str().expect("utf8 path"),
        "--timestamps",
        times.to_str().expect("utf8 path"),
        "--fs",
        "10",
        "--offset=-70",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output)?;
    assert_eq!(report["anchors"], serde_json::json!([30, 110, 120, 190, 245]));
    assert_eq!(report["truncated"], serde_json::json!([4]));
    assert!(report["counts"].is_null());
    let messages: Vec<&str> = report["warnings"]
        .as_array()
        .expect("warning list")
        .iter()
        .filter_map(|w| w["message"].as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("4 epoch(s), expected 5")));
    assert!(messages.iter().any(|m| m.contains("correlate weakly")));
    Ok(())
}

#[test]
fn hct_score_with_exclusions() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let beh = temp.path().join("beh.tsv");
    fs::write(
        &beh,
        "Trial\tAnswer\tConfidence\n1\t10\t0.9\n2\t8\t0.5\n3\t40\t0.1\n",
    )?;
    let mut cmd = cargo_bin_cmd!("intero");
    cmd.args([
        "hct-score",
        "--detected",
        "10,10,10",
        "--beh",
        beh.to_str().expect("utf8 path"),
        "--exclude",
        "2",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let scores: Value = serde_json::from_slice(&output)?;
    let expected = (1.0 + (1.0 - 2.0 / 9.0)) / 2.0;
    let accuracy = scores["accuracy"].as_f64().expect("accuracy");
    assert!((accuracy - expected).abs() < 1e-9, "{accuracy}");
    let sensibility = scores["sensibility"].as_f64().expect("sensibility");
    assert!((sensibility - 0.7).abs() < 1e-9);
    assert_eq!(scores["trials"].as_array().map(Vec::len), Some(3));
    assert_eq!(scores["trials"][2]["excluded"], true);
    Ok(())
}

#[test]
fn hrv_from_stdin() -> Result<(), Box<dyn Error>> {
    let beats: String = (0..40).map(|i| format!("{}\n", i * 100)).collect();
    let mut cmd = cargo_bin_cmd!("intero");
    cmd.args(["hrv", "--fs", "100"]).write_stdin(beats);
    let output = cmd.assert().success().get_output().stdout.clone();
    let hrv: Value = serde_json::from_slice(&output)?;
    assert_eq!(hrv["n_beats"], 40);
    assert!((hrv["mean_nn"].as_f64().expect("mean_nn") - 1000.0).abs() < 1e-9);
    assert!(hrv["sdnn"].as_f64().expect("sdnn").abs() < 1e-9);
    // a flat rhythm has no Poincaré asymmetry
    assert!(hrv["ai"].is_null());
    assert!(hrv["ca"].is_null());
    Ok(())
}

#[test]
fn hrv_with_too_few_beats_is_null() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let input = temp.path().join("beats.txt");
    fs::write(&input, "100\n200\n")?;
    let mut cmd = cargo_bin_cmd!("intero");
    cmd.args([
        "hrv",
        "--fs",
        "100",
        "--input",
        input.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    assert_eq!(String::from_utf8(output)?.trim(), "null");
    Ok(())
}
