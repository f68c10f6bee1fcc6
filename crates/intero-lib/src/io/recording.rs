//! Flat-file multichannel recordings.
//!
//! One column per channel with a header row of channel names. Tab-separated
//! for `.tsv`, comma-separated otherwise. Empty cells, `nan` and `n/a` are
//! missing samples. The sampling rate comes from a JSON sidecar next to the
//! file (`SamplingFrequency`) or from the caller.

use crate::signal::Recording;
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct Sidecar {
    #[serde(rename = "SamplingFrequency")]
    sampling_frequency: f64,
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("txt") => b'\t',
        _ => b',',
    }
}

pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

/// Parse one cell; missing markers become NaN.
pub fn parse_sample(cell: &str) -> Result<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("n/a") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .with_context(|| format!("'{cell}' is not a number"))
}

/// Sampling rate from the sidecar, if present.
pub fn read_sidecar_fs(path: &Path) -> Result<Option<f64>> {
    let sidecar = sidecar_path(path);
    if !sidecar.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&sidecar)
        .with_context(|| format!("failed to read {}", sidecar.display()))?;
    let meta: Sidecar = serde_json::from_str(&text)
        .with_context(|| format!("parsing sidecar {}", sidecar.display()))?;
    Ok(Some(meta.sampling_frequency))
}

/// Load a recording, taking the rate from the sidecar or `fallback_fs`.
pub fn read_recording(path: &Path, fallback_fs: Option<f64>) -> Result<Recording> {
    let fs = match read_sidecar_fs(path)? {
        Some(fs) => fs,
        None => fallback_fs.ok_or_else(|| {
            anyhow!(
                "no sampling rate for {}: add {} or pass one explicitly",
                path.display(),
                sidecar_path(path).display()
            )
        })?,
    };
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening recording {}", path.display()))?;
    let names: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut channels = vec![Vec::new(); names.len()];
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("row {} of {}", idx + 2, path.display()))?;
        for (col, cell) in record.iter().enumerate() {
            let value = parse_sample(cell)
                .with_context(|| format!("row {}, column '{}'", idx + 2, names[col]))?;
            channels[col].push(value);
        }
    }
    log::debug!(
        "loaded {} ({} channels, {} samples at {fs} Hz)",
        path.display(),
        names.len(),
        channels.first().map(Vec::len).unwrap_or(0)
    );
    Recording::new(fs, names, channels)
        .with_context(|| format!("invalid recording {}", path.display()))
}

/// Write a recording and its sidecar. Missing samples are written as `n/a`.
pub fn write_recording(path: &Path, rec: &Recording) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(rec.names())?;
    let columns: Vec<&[f64]> = rec.iter().map(|(_, data)| data).collect();
    for i in 0..rec.len() {
        writer.write_record(columns.iter().map(|c| {
            let v = c[i];
            if v.is_finite() {
                v.to_string()
            } else {
                "n/a".to_string()
            }
        }))?;
    }
    writer.flush()?;
    let sidecar = serde_json::json!({ "SamplingFrequency": rec.fs() });
    fs::write(sidecar_path(path), serde_json::to_string_pretty(&sidecar)?)?;
    Ok(())
}
