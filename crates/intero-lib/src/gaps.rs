//! Missing-data runs and directional gap filling.

use crate::error::PipelineError;
use crate::signal::Recording;
use serde::{Deserialize, Serialize};

/// Maximal span of missing samples in one channel, bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRun {
    pub channel: String,
    pub start: usize,
    pub end: usize,
}

impl MissingRun {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, sample: usize) -> bool {
        sample >= self.start && sample <= self.end
    }
}

/// Inclusive `(start, end)` spans of non-finite samples.
pub fn missing_spans(values: &[f64]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, v) in values.iter().enumerate() {
        match (v.is_finite(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                spans.push((s, i - 1));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, values.len() - 1));
    }
    spans
}

pub fn missing_runs(rec: &Recording, channels: &[&str]) -> Result<Vec<MissingRun>, PipelineError> {
    let mut runs = Vec::new();
    for &name in channels {
        runs.extend(
            missing_spans(rec.channel(name)?)
                .into_iter()
                .map(|(start, end)| MissingRun {
                    channel: name.to_string(),
                    start,
                    end,
                }),
        );
    }
    Ok(runs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillDirection {
    /// Carry the last valid value forward.
    Forward,
    /// Carry the next valid value backward.
    Backward,
}

impl FillDirection {
    fn opposite(self) -> Self {
        match self {
            FillDirection::Forward => FillDirection::Backward,
            FillDirection::Backward => FillDirection::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPolicy {
    /// No missing sample tolerated.
    Strict,
    /// Transient dropouts filled by carrying values in the given direction.
    Tolerant(FillDirection),
}

fn carry(values: &mut [f64], direction: FillDirection) {
    let mut last = None;
    let mut step = |v: &mut f64| {
        if v.is_finite() {
            last = Some(*v);
        } else if let Some(prev) = last {
            *v = prev;
        }
    };
    match direction {
        FillDirection::Forward => values.iter_mut().for_each(&mut step),
        FillDirection::Backward => values.iter_mut().rev().for_each(&mut step),
    }
}

/// Fill every missing sample. The primary direction handles interior runs;
/// the edge run it cannot reach is filled from the other side.
pub fn fill_channel(values: &[f64], direction: FillDirection) -> Option<Vec<f64>> {
    if !values.iter().any(|v| v.is_finite()) {
        return None;
    }
    let mut out = values.to_vec();
    carry(&mut out, direction);
    carry(&mut out, direction.opposite());
    Some(out)
}

/// Fail if `channel` has any missing run.
pub fn ensure_complete(rec: &Recording, channel: &str) -> Result<(), PipelineError> {
    let spans = missing_spans(rec.channel(channel)?);
    match spans.first() {
        None => Ok(()),
        Some(&(first_start, _)) => Err(PipelineError::UnresolvedMissing {
            channel: channel.to_string(),
            runs: spans.len(),
            first_start,
        }),
    }
}

/// Apply each channel policy and return the repaired recording.
pub fn fill_gaps(
    rec: &Recording,
    policies: &[(String, ChannelPolicy)],
) -> Result<Recording, PipelineError> {
    let mut out = rec.clone();
    for (name, policy) in policies {
        match policy {
            ChannelPolicy::Strict => ensure_complete(&out, name)?,
            ChannelPolicy::Tolerant(direction) => {
                let values = out.channel(name)?;
                let runs = missing_spans(values).len();
                if runs == 0 {
                    continue;
                }
                let filled = fill_channel(values, *direction).ok_or_else(|| {
                    PipelineError::NoValidSamples {
                        channel: name.clone(),
                    }
                })?;
                log::debug!("filled {runs} missing run(s) in {name} ({direction:?})");
                out = out.with_channel(name, filled)?;
            }
        }
    }
    Ok(out)
}
