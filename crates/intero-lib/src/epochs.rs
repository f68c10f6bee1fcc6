//! Windowing a recording around anchors.
//!
//! Anchors come from detected events, beat indices or external behavioral
//! timestamps realigned onto the recording's sample axis. Windows that run
//! past the recording are truncated, never rejected; callers validate counts.

use crate::error::{PipelineError, QualityWarning};
use crate::events::Event;
use crate::signal::{Beats, Recording};
use serde::{Deserialize, Serialize};

/// End of an epoch relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochEnd {
    /// Exclusive end offset in samples.
    Fixed(i64),
    /// The anchor's own event duration.
    FromEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochWindow {
    /// Start offset in samples, may be negative.
    pub start: i64,
    pub end: EpochEnd,
}

impl EpochWindow {
    pub fn fixed(start: i64, end: i64) -> Self {
        Self {
            start,
            end: EpochEnd::Fixed(end),
        }
    }

    /// Window in seconds, e.g. `-0.3..0.7` around an R-peak.
    pub fn seconds(fs: f64, start_s: f64, end_s: f64) -> Self {
        Self::fixed((start_s * fs).round() as i64, (end_s * fs).round() as i64)
    }

    pub fn from_events() -> Self {
        Self {
            start: 0,
            end: EpochEnd::FromEvent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAnchor {
    pub sample: i64,
    pub duration: Option<usize>,
}

impl From<&Event> for EpochAnchor {
    fn from(event: &Event) -> Self {
        Self {
            sample: event.onset as i64,
            duration: Some(event.duration),
        }
    }
}

pub fn anchors_from_events(events: &[Event]) -> Vec<EpochAnchor> {
    events.iter().map(EpochAnchor::from).collect()
}

pub fn anchors_from_beats(beats: &Beats) -> Vec<EpochAnchor> {
    beats
        .indices
        .iter()
        .map(|&b| EpochAnchor {
            sample: b as i64,
            duration: None,
        })
        .collect()
}

/// Map behavioral timestamps (seconds) onto the recording, `offset` samples
/// marking where the behavioral clock's zero falls in the recording.
pub fn realign_timestamps(timestamps_s: &[f64], fs: f64, offset: i64) -> Vec<EpochAnchor> {
    timestamps_s
        .iter()
        .map(|t| EpochAnchor {
            sample: offset + (t * fs).round() as i64,
            duration: None,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Epoch {
    pub index: usize,
    pub anchor: i64,
    /// Offset of the first retained sample relative to the anchor.
    pub offset: i64,
    /// True when the window was clipped at a recording edge.
    pub truncated: bool,
    pub data: Recording,
}

impl Epoch {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of set samples in a binary indicator channel.
    pub fn count(&self, indicator: &str) -> Result<usize, PipelineError> {
        Ok(self
            .data
            .channel(indicator)?
            .iter()
            .filter(|v| v.is_finite() && **v != 0.0)
            .count())
    }

    pub fn is_complete(&self, channels: &[&str]) -> Result<bool, PipelineError> {
        for name in channels {
            if self.data.channel(name)?.iter().any(|v| !v.is_finite()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Time of each sample relative to the anchor, in seconds.
    pub fn times(&self) -> Vec<f64> {
        (0..self.len() as i64)
            .map(|i| (self.offset + i) as f64 / self.data.fs())
            .collect()
    }
}

/// Cut one epoch per anchor.
pub fn extract_epochs(
    rec: &Recording,
    anchors: &[EpochAnchor],
    window: &EpochWindow,
) -> Result<Vec<Epoch>, PipelineError> {
    let len = rec.len() as i64;
    let mut epochs = Vec::with_capacity(anchors.len());
    for (index, anchor) in anchors.iter().enumerate() {
        let end_offset = match window.end {
            EpochEnd::Fixed(end) => end,
            EpochEnd::FromEvent => anchor.duration.ok_or_else(|| {
                PipelineError::InvalidParameter(format!(
                    "anchor {index} at {} has no event duration",
                    anchor.sample
                ))
            })? as i64,
        };
        if end_offset <= window.start {
            return Err(PipelineError::InvalidParameter(format!(
                "epoch window {}..{end_offset} is empty",
                window.start
            )));
        }
        let nominal_start = anchor.sample + window.start;
        let nominal_end = anchor.sample + end_offset;
        let start = nominal_start.clamp(0, len);
        let end = nominal_end.clamp(start, len);
        let truncated = start != nominal_start || end != nominal_end;
        if truncated {
            log::debug!(
                "epoch {index} truncated to {start}..{end} (wanted {nominal_start}..{nominal_end})"
            );
        }
        epochs.push(Epoch {
            index,
            anchor: anchor.sample,
            offset: start - anchor.sample,
            truncated,
            data: rec.slice(start as usize, end as usize)?,
        });
    }
    Ok(epochs)
}

/// Drop epochs with any missing sample in `channels`; returns kept epochs and
/// the number dropped.
pub fn drop_incomplete(
    epochs: Vec<Epoch>,
    channels: &[&str],
) -> Result<(Vec<Epoch>, usize), PipelineError> {
    let total = epochs.len();
    let mut kept = Vec::with_capacity(total);
    for epoch in epochs {
        if epoch.is_complete(channels)? && !epoch.is_empty() {
            kept.push(epoch);
        }
    }
    let dropped = total - kept.len();
    Ok((kept, dropped))
}

/// Warn when the epoch count differs from what the design predicts.
pub fn epoch_count_warning(found: usize, expected: usize, label: &str) -> Option<QualityWarning> {
    (found != expected)
        .then(|| QualityWarning::new(label, format!("{found} epoch(s), expected {expected}")))
}

/// Pearson correlation of successive intervals between two timestamp sources.
pub fn interval_agreement(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 3 {
        return None;
    }
    let da: Vec<f64> = a[..n].windows(2).map(|w| w[1] - w[0]).collect();
    let db: Vec<f64> = b[..n].windows(2).map(|w| w[1] - w[0]).collect();
    crate::stats::pearson(&da, &db)
}

/// Quality check for realigned behavioral timestamps against detected markers.
pub fn check_agreement(a: &[f64], b: &[f64], min_r: f64, label: &str) -> Option<QualityWarning> {
    match interval_agreement(a, b) {
        Some(r) if r >= min_r => None,
        Some(r) => Some(QualityWarning::new(
            label,
            format!("timestamp sources correlate weakly (r = {r:.3} < {min_r})"),
        )),
        None => Some(QualityWarning::new(
            label,
            "too few timestamps to compare sources",
        )),
    }
}

/// Average of aligned epochs, one row per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evoked {
    pub fs: f64,
    /// Offset of the first column relative to the anchor, in samples.
    pub start: i64,
    pub n_epochs: usize,
    pub names: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl Evoked {
    pub fn times(&self) -> Vec<f64> {
        let width = self.data.first().map(Vec::len).unwrap_or(0) as i64;
        (0..width)
            .map(|i| (self.start + i) as f64 / self.fs)
            .collect()
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.data[i].as_slice())
    }

    /// Mean of `name` over `[from_s, to_s]` (seconds relative to the anchor).
    pub fn window_mean(&self, name: &str, from_s: f64, to_s: f64) -> Option<f64> {
        let values = self.channel(name)?;
        let picked: Vec<f64> = self
            .times()
            .into_iter()
            .zip(values)
            .filter(|(t, _)| *t >= from_s && *t <= to_s)
            .map(|(_, v)| *v)
            .collect();
        crate::stats::nanmean(&picked)
    }
}

/// NaN-tolerant average of the epochs over `window`, aligned on the anchor.
pub fn average(
    epochs: &[Epoch],
    channels: &[&str],
    window: &EpochWindow,
    fs: f64,
) -> Result<Evoked, PipelineError> {
    let EpochEnd::Fixed(end) = window.end else {
        return Err(PipelineError::InvalidParameter(
            "averaging needs a fixed-length window".into(),
        ));
    };
    let width = (end - window.start).max(0) as usize;
    let mut data = Vec::with_capacity(channels.len());
    for name in channels {
        let mut sums = vec![0.0; width];
        let mut counts = vec![0usize; width];
        for epoch in epochs {
            for (i, v) in epoch.data.channel(name)?.iter().enumerate() {
                let col = epoch.offset + i as i64 - window.start;
                if v.is_finite() && col >= 0 && (col as usize) < width {
                    sums[col as usize] += v;
                    counts[col as usize] += 1;
                }
            }
        }
        data.push(
            sums.into_iter()
                .zip(counts)
                .map(|(s, c)| if c == 0 { f64::NAN } else { s / c as f64 })
                .collect(),
        );
    }
    Ok(Evoked {
        fs,
        start: window.start,
        n_epochs: epochs.len(),
        names: channels.iter().map(|c| c.to_string()).collect(),
        data,
    })
}
