use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Multichannel recording sharing one time base.
///
/// Every crop/fill/select returns a new `Recording`; nothing mutates a
/// recording in place once it has been handed to another stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    fs: f64,
    names: Vec<String>,
    channels: Vec<Vec<f64>>,
}

impl Recording {
    /// Build a recording, checking the rate, name uniqueness and channel lengths.
    pub fn new(
        fs: f64,
        names: Vec<String>,
        channels: Vec<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        if !(fs.is_finite() && fs > 0.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "sampling rate must be positive, got {fs}"
            )));
        }
        if names.len() != channels.len() {
            return Err(PipelineError::InvalidParameter(format!(
                "{} channel names for {} channels",
                names.len(),
                channels.len()
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(PipelineError::InvalidParameter(format!(
                    "duplicate channel name '{name}'"
                )));
            }
        }
        if let Some(first) = channels.first() {
            if let Some((idx, _)) = channels
                .iter()
                .enumerate()
                .find(|(_, c)| c.len() != first.len())
            {
                return Err(PipelineError::InvalidParameter(format!(
                    "channel '{}' has {} samples, expected {}",
                    names[idx],
                    channels[idx].len(),
                    first.len()
                )));
            }
        }
        Ok(Self {
            fs,
            names,
            channels,
        })
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.fs
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn channel(&self, name: &str) -> Result<&[f64], PipelineError> {
        self.position(name)
            .map(|idx| self.channels[idx].as_slice())
            .ok_or_else(|| PipelineError::UnknownChannel(name.to_string()))
    }

    /// Iterate `(name, samples)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.channels.iter().map(Vec::as_slice))
    }

    /// Copy of `[start, end)` re-based to sample zero.
    pub fn slice(&self, start: usize, end: usize) -> Result<Recording, PipelineError> {
        if start > end || end > self.len() {
            return Err(PipelineError::InvalidParameter(format!(
                "slice {start}..{end} outside recording of {} samples",
                self.len()
            )));
        }
        Ok(Self {
            fs: self.fs,
            names: self.names.clone(),
            channels: self
                .channels
                .iter()
                .map(|c| c[start..end].to_vec())
                .collect(),
        })
    }

    /// New recording holding only the named channels, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Recording, PipelineError> {
        let mut channels = Vec::with_capacity(names.len());
        for name in names {
            channels.push(self.channel(name)?.to_vec());
        }
        Recording::new(
            self.fs,
            names.iter().map(|n| n.to_string()).collect(),
            channels,
        )
    }

    /// New recording with one channel's samples replaced.
    pub fn with_channel(&self, name: &str, data: Vec<f64>) -> Result<Recording, PipelineError> {
        let idx = self
            .position(name)
            .ok_or_else(|| PipelineError::UnknownChannel(name.to_string()))?;
        if data.len() != self.len() {
            return Err(PipelineError::InvalidParameter(format!(
                "replacement for '{name}' has {} samples, expected {}",
                data.len(),
                self.len()
            )));
        }
        let mut out = self.clone();
        out.channels[idx] = data;
        Ok(out)
    }

    /// Sample indices where an indicator channel is non-zero.
    pub fn indicator_indices(&self, name: &str) -> Result<Vec<usize>, PipelineError> {
        Ok(self
            .channel(name)?
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite() && **v != 0.0)
            .map(|(i, _)| i)
            .collect())
    }

    pub fn seconds_to_samples(&self, seconds: f64) -> i64 {
        (seconds * self.fs).round() as i64
    }
}

/// Point events on the timeline (R-peaks, pulse peaks).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beats {
    pub indices: Vec<usize>,
}

impl Beats {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Inter-beat intervals (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_beats(beats: &Beats, fs: f64) -> Self {
        let rr = beats
            .indices
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64) / fs)
            .collect();
        Self { rr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> Recording {
        Recording::new(
            100.0,
            vec!["PHOTO".into(), "ECG".into()],
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![0.1, f64::NAN, 0.3, 0.4]],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_channels() {
        let err = Recording::new(
            100.0,
            vec!["A".into(), "B".into()],
            vec![vec![1.0, 2.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_duplicate_names() {
        assert!(Recording::new(10.0, vec!["A".into(), "A".into()], vec![vec![], vec![]]).is_err());
    }

    #[test]
    fn slice_rebases_all_channels() {
        let rec = recording();
        let cut = rec.slice(1, 3).unwrap();
        assert_eq!(cut.len(), 2);
        assert_eq!(cut.channel("PHOTO").unwrap(), &[2.0, 3.0]);
        assert!(cut.channel("ECG").unwrap()[0].is_nan());
        // source untouched
        assert_eq!(rec.len(), 4);
    }

    #[test]
    fn unknown_channel_is_reported() {
        let rec = recording();
        assert!(matches!(
            rec.channel("EEG"),
            Err(PipelineError::UnknownChannel(name)) if name == "EEG"
        ));
    }

    #[test]
    fn rr_from_beats_uses_rate() {
        let rr = RRSeries::from_beats(&Beats::from_indices(vec![0, 100, 250]), 100.0);
        assert_eq!(rr.rr, vec![1.0, 1.5]);
    }
}
