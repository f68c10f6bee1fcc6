//! Synthetic datasets in the layout the batch runner reads.
//!
//! Each participant gets a resting-state and a heartbeat-counting recording
//! with a square photosensor marker, an ECG with R-peak indicator, a delayed
//! PPG pulse, and two EEG channels carrying a small heartbeat-locked bump.
//! Reported counts equal the embedded beats unless `count_error` is set.

use crate::tables::Row;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use intero_lib::io::write_recording;
use intero_lib::signal::Recording;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

pub const CHANNELS: [&str; 7] = [
    "PHOTO",
    "ECG",
    "PPG_Muse",
    "AF7",
    "AF8",
    "ECG_R_Peaks",
    "PPG_Peaks",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSpec {
    pub participants: usize,
    pub fs: f64,
    pub seed: u64,
    pub rs_duration_s: f64,
    pub hct_intervals_s: Vec<f64>,
    /// Marker-high time before, between and after task periods.
    pub pause_s: f64,
    /// Largest absolute error added to each reported count.
    pub count_error: usize,
    /// Inject short PPG and EEG dropouts.
    pub dropouts: bool,
}

impl Default for SimulationSpec {
    fn default() -> Self {
        Self {
            participants: 3,
            fs: 100.0,
            seed: 7,
            rs_duration_s: 370.0,
            hct_intervals_s: vec![25.0, 30.0, 35.0, 40.0, 45.0, 50.0],
            pause_s: 5.0,
            count_error: 0,
            dropouts: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedParticipant {
    pub id: String,
    pub rs: Recording,
    pub hct: Recording,
    pub hct_answers: Vec<usize>,
    pub hct_confidence: Vec<f64>,
    pub meta: Row,
    pub questionnaire: Row,
}

pub fn participant_id(index: usize) -> String {
    format!("sub-{:02}", index + 1)
}

fn beat_times(rng: &mut StdRng, duration_s: f64, base_rr: f64) -> Vec<f64> {
    let mut t = rng.gen_range(0.1..0.6);
    let mut out = Vec::new();
    while t < duration_s {
        out.push(t);
        let rsa = 0.04 * (2.0 * PI * 0.25 * t).sin();
        t += base_rr + rsa + rng.gen_range(-0.02..0.02);
    }
    out
}

fn add_pulse(signal: &mut [f64], fs: f64, center_s: f64, width_s: f64, amplitude: f64) {
    let center = center_s * fs;
    let reach = (5.0 * width_s * fs).ceil() as i64;
    let c = center.round() as i64;
    for i in (c - reach).max(0)..(c + reach).min(signal.len() as i64) {
        let dt = (i as f64 - center) / fs;
        signal[i as usize] += amplitude * (-0.5 * (dt / width_s).powi(2)).exp();
    }
}

fn blank(signal: &mut [f64], fs: f64, from_s: f64, len_s: f64) {
    let from = (from_s * fs) as usize;
    let to = (((from_s + len_s) * fs) as usize).min(signal.len());
    if from < to {
        signal[from..to].iter_mut().for_each(|v| *v = f64::NAN);
    }
}

/// Synthesize one recording. `periods` are marker-low spans in seconds.
fn synth_recording(
    rng: &mut StdRng,
    spec: &SimulationSpec,
    duration_s: f64,
    periods: &[(f64, f64)],
    base_rr: f64,
) -> Result<(Recording, Vec<usize>)> {
    let fs = spec.fs;
    let n = (duration_s * fs).round() as usize;
    let mut photo = vec![1.0; n];
    for &(from, to) in periods {
        let (a, b) = ((from * fs).round() as usize, ((to * fs).round() as usize).min(n));
        photo[a..b].iter_mut().for_each(|v| *v = 0.0);
    }
    let mut ecg = vec![0.0; n];
    let mut ppg = vec![0.0; n];
    let mut af7 = vec![0.0; n];
    let mut r_peaks = vec![0.0; n];
    let mut ppg_peaks = vec![0.0; n];
    let mut beats = Vec::new();
    for t in beat_times(rng, duration_s, base_rr) {
        let idx = (t * fs).round() as usize;
        if idx >= n {
            break;
        }
        beats.push(idx);
        r_peaks[idx] = 1.0;
        add_pulse(&mut ecg, fs, t, 0.012, 1.0);
        add_pulse(&mut ecg, fs, t + 0.25, 0.04, 0.25);
        add_pulse(&mut ppg, fs, t + 0.25, 0.08, 1.0);
        let pulse = ((t + 0.25) * fs).round() as usize;
        if pulse < n {
            ppg_peaks[pulse] = 1.0;
        }
        add_pulse(&mut af7, fs, t + 0.3, 0.05, 3.0);
    }
    for v in photo.iter_mut().chain(ecg.iter_mut()).chain(ppg.iter_mut()) {
        *v += rng.gen_range(-0.02..0.02);
    }
    for v in af7.iter_mut() {
        *v += rng.gen_range(-4.0..4.0);
    }
    let mut af8: Vec<f64> = af7.iter().map(|v| 0.8 * v + rng.gen_range(-1.0..1.0)).collect();
    if spec.dropouts {
        if let Some(&(from, to)) = periods.first() {
            let mid = (from + to) / 2.0;
            blank(&mut ppg, fs, mid, 0.5);
            blank(&mut af7, fs, mid + (to - mid) / 2.0, 0.2);
            blank(&mut af8, fs, mid + (to - mid) / 2.0, 0.2);
        }
    }
    let names = CHANNELS.iter().map(|c| c.to_string()).collect();
    let rec = Recording::new(fs, names, vec![photo, ecg, ppg, af7, af8, r_peaks, ppg_peaks])?;
    Ok((rec, beats))
}

/// Marker-low spans of the counting task, in seconds.
pub fn hct_periods(spec: &SimulationSpec) -> Vec<(f64, f64)> {
    let mut t = spec.pause_s;
    spec.hct_intervals_s
        .iter()
        .map(|d| {
            let span = (t, t + d);
            t += d + 2.0 * spec.pause_s;
            span
        })
        .collect()
}

pub fn simulate_participant(spec: &SimulationSpec, index: usize) -> Result<SimulatedParticipant> {
    let mut rng = StdRng::seed_from_u64(spec.seed.wrapping_add(index as u64));
    let base_rr = rng.gen_range(0.7..0.95);
    let id = participant_id(index);

    let rs_period = (spec.pause_s, spec.pause_s + spec.rs_duration_s);
    let (rs, _) = synth_recording(
        &mut rng,
        spec,
        spec.rs_duration_s + 2.0 * spec.pause_s,
        &[rs_period],
        base_rr,
    )?;

    let periods = hct_periods(spec);
    let hct_end = periods.last().map(|p| p.1).unwrap_or(0.0) + spec.pause_s;
    let (hct, beats) = synth_recording(&mut rng, spec, hct_end, &periods, base_rr)?;
    let hct_answers: Vec<usize> = periods
        .iter()
        .map(|&(from, to)| {
            let (a, b) = ((from * spec.fs).round() as usize, (to * spec.fs).round() as usize);
            let true_count = beats.iter().filter(|&&i| i >= a && i < b).count();
            if spec.count_error == 0 {
                return true_count;
            }
            let err = spec.count_error as i64;
            (true_count as i64 + rng.gen_range(-err..=err)).max(0) as usize
        })
        .collect();
    let hct_confidence = periods.iter().map(|_| rng.gen_range(0.0..1.0)).collect();

    let meta = vec![
        ("participant_id".into(), id.clone()),
        ("Age".into(), rng.gen_range(18..40).to_string()),
        ("Sex".into(), if rng.gen_bool(0.5) { "F" } else { "M" }.to_string()),
        ("Comments".into(), "synthetic".to_string()),
    ];
    let questionnaire = vec![
        ("participant_id".into(), id.clone()),
        ("MAIA_Noticing".into(), format!("{:.2}", rng.gen_range(0.0..5.0))),
        ("IAS_Total".into(), rng.gen_range(21..105).to_string()),
    ];
    Ok(SimulatedParticipant {
        id,
        rs,
        hct,
        hct_answers,
        hct_confidence,
        meta,
        questionnaire,
    })
}

fn write_tsv(path: &Path, rows: &[Row]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    if let Some(first) = rows.first() {
        writer.write_record(first.iter().map(|(c, _)| c))?;
    }
    for row in rows {
        writer.write_record(row.iter().map(|(_, v)| v))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a complete dataset under `root`; returns the participant ids.
pub fn write_dataset(spec: &SimulationSpec, root: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    let mut metas = Vec::with_capacity(spec.participants);
    for index in 0..spec.participants {
        let sim = simulate_participant(spec, index)?;
        let eeg_dir = root.join(&sim.id).join("eeg");
        let beh_dir = root.join(&sim.id).join("beh");
        fs::create_dir_all(&eeg_dir)?;
        fs::create_dir_all(&beh_dir)?;
        write_recording(&eeg_dir.join(format!("{}_task-RS_physio.tsv", sim.id)), &sim.rs)?;
        write_recording(&eeg_dir.join(format!("{}_task-HCT_physio.tsv", sim.id)), &sim.hct)?;
        let trials: Vec<Row> = sim
            .hct_answers
            .iter()
            .zip(&sim.hct_confidence)
            .enumerate()
            .map(|(i, (answer, confidence))| {
                vec![
                    ("Trial".into(), (i + 1).to_string()),
                    ("Answer".into(), answer.to_string()),
                    ("Confidence".into(), format!("{confidence:.3}")),
                ]
            })
            .collect();
        write_tsv(&beh_dir.join(format!("{}_task-HCT_beh.tsv", sim.id)), &trials)?;
        write_tsv(
            &beh_dir.join(format!("{}_Questionnaires.tsv", sim.id)),
            std::slice::from_ref(&sim.questionnaire),
        )?;
        log::info!("simulated {}", sim.id);
        metas.push(sim.meta);
    }
    write_tsv(&root.join("participants.tsv"), &metas)?;
    Ok((0..spec.participants).map(participant_id).collect())
}
