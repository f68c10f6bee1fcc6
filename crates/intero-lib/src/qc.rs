//! Quality-control panel accumulator.
//!
//! Stages add one figure per participant and signal type; the caller owns the
//! collector for the whole batch and renders one mosaic per kind at the end.

use crate::plot::Figure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcKind {
    /// Event channel with detected events shaded.
    RsEvents,
    HctEvents,
    /// Cropped ECG.
    RsEcg,
    HctEcg,
    /// Cropped and filled PPG with detected pulse peaks.
    RsPpg,
    HctPpg,
    /// Cropped EEG traces.
    RsEeg,
    HctEeg,
    /// EEG power spectra.
    RsPsd,
    HctPsd,
    /// Evoked HEP waveform.
    RsHep,
    HctHep,
    /// Reported against detected counts.
    HctCounts,
}

impl QcKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            QcKind::RsEvents => "qc_rs_events",
            QcKind::HctEvents => "qc_hct_events",
            QcKind::RsEcg => "qc_rs_ecg",
            QcKind::HctEcg => "qc_hct_ecg",
            QcKind::RsPpg => "qc_rs_ppg",
            QcKind::HctPpg => "qc_hct_ppg",
            QcKind::RsEeg => "qc_rs_eeg",
            QcKind::HctEeg => "qc_hct_eeg",
            QcKind::RsPsd => "qc_rs_psd",
            QcKind::HctPsd => "qc_hct_psd",
            QcKind::RsHep => "qc_rs_hep",
            QcKind::HctHep => "qc_hct_hep",
            QcKind::HctCounts => "qc_hct_counts",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcPanel {
    pub participant: String,
    pub figure: Figure,
}

#[derive(Debug, Clone, Default)]
pub struct QcCollector {
    panels: BTreeMap<QcKind, Vec<QcPanel>>,
}

impl QcCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: QcKind, participant: &str, figure: Figure) {
        self.panels.entry(kind).or_default().push(QcPanel {
            participant: participant.to_string(),
            figure,
        });
    }

    pub fn panels(&self, kind: QcKind) -> &[QcPanel] {
        self.panels.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (QcKind, &[QcPanel])> {
        self.panels.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.panels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
