//! Heartbeat-evoked potential amplitudes.
//!
//! Epochs are not baseline-corrected: the pre-R interval carries the P and Q
//! waves of the ECG itself.

use crate::epochs::{
    anchors_from_beats, average, drop_incomplete, extract_epochs, EpochWindow, Evoked,
};
use crate::error::PipelineError;
use crate::signal::{Beats, Recording};
use crate::stats::nanmean;
use serde::{Deserialize, Serialize};

/// Amplitude windows in seconds after the R-peak.
pub const HEP_WINDOWS: [(f64, f64); 2] = [(0.2, 0.4), (0.4, 0.6)];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HepOptions {
    pub tmin: f64,
    pub tmax: f64,
}

impl Default for HepOptions {
    fn default() -> Self {
        Self {
            tmin: -0.3,
            tmax: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HepResult {
    pub evoked: Evoked,
    pub n_epochs: usize,
    /// Epochs left out, truncated ones included.
    pub n_dropped: usize,
    /// Epochs whose window ran past the recording edge.
    pub n_truncated: usize,
    /// `(column, value)` pairs, e.g. `HEP_Amplitude_200_400_AF7`.
    pub amplitudes: Vec<(String, Option<f64>)>,
}

fn window_label(from_s: f64, to_s: f64) -> String {
    format!("{}_{}", (from_s * 1000.0).round(), (to_s * 1000.0).round())
}

/// Epoch `rec` around `beats`, drop epochs with missing EEG and average.
///
/// `eeg` channels feed the amplitude columns; `extra` channels (ECG, PPG) are
/// averaged alongside for the long-format waveform table.
pub fn analyze_hep(
    rec: &Recording,
    beats: &Beats,
    eeg: &[&str],
    extra: &[&str],
    opts: &HepOptions,
) -> Result<HepResult, PipelineError> {
    let window = EpochWindow::seconds(rec.fs(), opts.tmin, opts.tmax);
    let epochs = extract_epochs(rec, &anchors_from_beats(beats), &window)?;
    let total = epochs.len();
    let epochs: Vec<_> = epochs.into_iter().filter(|e| !e.truncated).collect();
    let n_truncated = total - epochs.len();
    let (epochs, incomplete) = drop_incomplete(epochs, eeg)?;
    let n_dropped = total - epochs.len();
    if incomplete > 0 {
        log::info!("HEP: dropped {incomplete} epoch(s) with missing EEG");
    }
    let channels: Vec<&str> = eeg.iter().chain(extra).copied().collect();
    let evoked = average(&epochs, &channels, &window, rec.fs())?;

    let mut amplitudes = Vec::new();
    for &(from, to) in &HEP_WINDOWS {
        let label = window_label(from, to);
        let per_channel: Vec<Option<f64>> = eeg
            .iter()
            .map(|ch| evoked.window_mean(ch, from, to))
            .collect();
        let pooled: Vec<f64> = per_channel.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        amplitudes.push((format!("HEP_Amplitude_{label}_EEG"), nanmean(&pooled)));
        for (ch, value) in eeg.iter().zip(per_channel) {
            amplitudes.push((format!("HEP_Amplitude_{label}_{ch}"), value));
        }
    }
    Ok(HepResult {
        evoked,
        n_epochs: epochs.len(),
        n_dropped,
        n_truncated,
        amplitudes,
    })
}

/// Amplitude column names for the given EEG channels, matching `analyze_hep`.
pub fn amplitude_columns(eeg: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for &(from, to) in &HEP_WINDOWS {
        let label = window_label(from, to);
        out.push(format!("HEP_Amplitude_{label}_EEG"));
        out.extend(eeg.iter().map(|ch| format!("HEP_Amplitude_{label}_{ch}")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// EEG with a +2 bump 250–350 ms after every beat and -1 at 450–550 ms.
    fn synthetic(fs: f64, beats: &[usize], n: usize) -> Recording {
        let mut af7 = vec![0.0; n];
        for &b in beats {
            for (i, v) in af7.iter_mut().enumerate() {
                let t = (i as f64 - b as f64) / fs;
                if (0.25..=0.35).contains(&t) {
                    *v += 2.0;
                } else if (0.45..=0.55).contains(&t) {
                    *v -= 1.0;
                }
            }
        }
        let af8 = af7.iter().map(|v| v * 0.5).collect();
        Recording::new(fs, vec!["AF7".into(), "AF8".into()], vec![af7, af8]).unwrap()
    }

    #[test]
    fn amplitudes_reflect_evoked_shape() {
        let fs = 100.0;
        let beats = Beats::from_indices(vec![100, 200, 300, 400]);
        let rec = synthetic(fs, &beats.indices, 600);
        let out =
            analyze_hep(&rec, &beats, &["AF7", "AF8"], &[], &HepOptions::default()).unwrap();
        assert_eq!(out.n_epochs, 4);
        let get = |name: &str| {
            out.amplitudes
                .iter()
                .find(|(c, _)| c == name)
                .and_then(|(_, v)| *v)
                .unwrap()
        };
        assert!(get("HEP_Amplitude_200_400_AF7") > 0.5);
        assert!(get("HEP_Amplitude_400_600_AF7") < 0.0);
        let pooled = get("HEP_Amplitude_200_400_EEG");
        let expected =
            (get("HEP_Amplitude_200_400_AF7") + get("HEP_Amplitude_200_400_AF8")) / 2.0;
        assert!((pooled - expected).abs() < 1e-12);
    }

    #[test]
    fn edge_and_gappy_epochs_are_dropped() {
        let fs = 100.0;
        let beats = Beats::from_indices(vec![10, 200, 300, 590]);
        let rec = synthetic(fs, &beats.indices, 600);
        let mut af7 = rec.channel("AF7").unwrap().to_vec();
        af7[310] = f64::NAN;
        let rec = rec.with_channel("AF7", af7).unwrap();
        let out =
            analyze_hep(&rec, &beats, &["AF7", "AF8"], &[], &HepOptions::default()).unwrap();
        assert_eq!(out.n_epochs, 1);
        assert_eq!(out.n_dropped, 3);
        assert_eq!(out.n_truncated, 2);
    }

    #[test]
    fn columns_match_analysis_output() {
        let fs = 100.0;
        let beats = Beats::from_indices(vec![100, 200]);
        let rec = synthetic(fs, &beats.indices, 400);
        let out =
            analyze_hep(&rec, &beats, &["AF7", "AF8"], &[], &HepOptions::default()).unwrap();
        let names: Vec<String> = out.amplitudes.into_iter().map(|(c, _)| c).collect();
        assert_eq!(names, amplitude_columns(&["AF7", "AF8"]));
    }
}
