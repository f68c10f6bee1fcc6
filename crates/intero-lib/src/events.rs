//! Photosensor/marker event detection.
//!
//! A marker channel alternates between two voltage levels. Runs where the
//! channel sits on the requested side of the threshold for long enough are
//! reported as [`Event`]s in onset order.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Interval on the sample axis: `[onset, onset + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub onset: usize,
    pub duration: usize,
}

impl Event {
    pub fn new(onset: usize, duration: usize) -> Self {
        Self { onset, duration }
    }

    /// First sample after the event.
    pub fn end(&self) -> usize {
        self.onset + self.duration
    }

    /// Closed-bound membership, `onset <= sample <= onset + duration`.
    pub fn contains(&self, sample: usize) -> bool {
        sample >= self.onset && sample <= self.end()
    }
}

/// Which side of the threshold counts as "active".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Keep samples at or below the threshold (screen marker turned dark).
    Below,
    /// Keep samples strictly above the threshold.
    Above,
}

impl Polarity {
    fn keeps(self, value: f64, threshold: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Polarity::Below => value <= threshold,
            Polarity::Above => value > threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Threshold {
    /// Midpoint between the finite minimum and maximum of the channel.
    Auto,
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventOptions {
    pub polarity: Polarity,
    pub threshold: Threshold,
    /// Shortest run reported, in samples.
    pub duration_min: usize,
    /// Longest run reported, in samples.
    pub duration_max: Option<usize>,
    /// Minimum number of samples between the end of one kept event and the
    /// onset of the next.
    pub inter_min: usize,
}

impl EventOptions {
    pub fn below(duration_min: usize) -> Self {
        Self {
            polarity: Polarity::Below,
            threshold: Threshold::Auto,
            duration_min,
            duration_max: None,
            inter_min: 0,
        }
    }
}

/// Resolve the threshold for a channel. `None` when the channel holds no
/// finite sample.
pub fn resolve_threshold(channel: &[f64], threshold: Threshold) -> Option<f64> {
    match threshold {
        Threshold::Fixed(value) => Some(value),
        Threshold::Auto => {
            let (min, max) = channel
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            (min <= max).then(|| (min + max) / 2.0)
        }
    }
}

/// Detect qualifying runs in `channel`.
pub fn find_events(channel: &[f64], opts: &EventOptions) -> Vec<Event> {
    let Some(threshold) = resolve_threshold(channel, opts.threshold) else {
        return Vec::new();
    };
    let min = opts.duration_min.max(1);
    let mut events: Vec<Event> = Vec::new();
    let mut run_start: Option<usize> = None;
    for i in 0..=channel.len() {
        let active = i < channel.len() && opts.polarity.keeps(channel[i], threshold);
        match (active, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                run_start = None;
                let duration = i - start;
                if duration < min || opts.duration_max.is_some_and(|max| duration > max) {
                    continue;
                }
                if let Some(prev) = events.last() {
                    if start - prev.end() < opts.inter_min {
                        continue;
                    }
                }
                events.push(Event::new(start, duration));
            }
            _ => {}
        }
    }
    events
}

/// Fail unless exactly `expected` events are present.
pub fn expect_count(events: &[Event], expected: usize, label: &str) -> Result<(), PipelineError> {
    if events.len() != expected {
        return Err(PipelineError::EventCount {
            label: label.to_string(),
            expected,
            found: events.len(),
        });
    }
    Ok(())
}

/// Known per-recording fix applied to detected events before counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventCorrection {
    /// Ignore detection and use these events.
    Replace { events: Vec<Event> },
    /// Discard the last `count` detected events.
    DropLast { count: usize },
}

impl EventCorrection {
    pub fn apply(
        &self,
        detected: Vec<Event>,
        recording_len: usize,
    ) -> Result<Vec<Event>, PipelineError> {
        match self {
            EventCorrection::Replace { events } => {
                for event in events {
                    if event.duration == 0 || event.end() > recording_len {
                        return Err(PipelineError::InvalidParameter(format!(
                            "replacement event {}+{} does not fit a recording of {} samples",
                            event.onset, event.duration, recording_len
                        )));
                    }
                }
                let mut events = events.clone();
                events.sort_by_key(|e| e.onset);
                Ok(events)
            }
            EventCorrection::DropLast { count } => {
                let mut detected = detected;
                let keep = detected.len().saturating_sub(*count);
                detected.truncate(keep);
                Ok(detected)
            }
        }
    }
}

/// Detect, apply an optional correction, then enforce the expected count.
pub fn detect_checked(
    channel: &[f64],
    opts: &EventOptions,
    correction: Option<&EventCorrection>,
    expected: usize,
    label: &str,
) -> Result<Vec<Event>, PipelineError> {
    let mut events = find_events(channel, opts);
    if let Some(correction) = correction {
        events = correction.apply(events, channel.len())?;
    }
    expect_count(&events, expected, label)?;
    log::info!("{label}: {} event(s) at {:?}", events.len(), onsets(&events));
    Ok(events)
}

pub fn onsets(events: &[Event]) -> Vec<usize> {
    events.iter().map(|e| e.onset).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// High baseline with low runs of the given durations, separated by `gap`.
    fn marker_channel(durations: &[usize], gap: usize) -> (Vec<f64>, Vec<usize>) {
        let mut data = vec![5.0; gap];
        let mut onsets = Vec::new();
        for &d in durations {
            onsets.push(data.len());
            data.extend(std::iter::repeat(0.2).take(d));
            data.extend(std::iter::repeat(5.0).take(gap));
        }
        (data, onsets)
    }

    #[test]
    fn reports_only_runs_at_least_min_duration() {
        let durations = [30, 5, 12, 11, 50, 2];
        let (data, onsets) = marker_channel(&durations, 20);
        let events = find_events(&data, &EventOptions::below(12));
        let expected: Vec<Event> = durations
            .iter()
            .zip(&onsets)
            .filter(|(d, _)| **d >= 12)
            .map(|(d, o)| Event::new(*o, *d))
            .collect();
        assert_eq!(events, expected);
    }

    #[test]
    fn above_polarity_finds_high_runs() {
        let data = [0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0];
        let mut opts = EventOptions::below(2);
        opts.polarity = Polarity::Above;
        assert_eq!(find_events(&data, &opts), vec![Event::new(2, 3)]);
    }

    #[test]
    fn run_touching_the_end_is_closed() {
        let data = [5.0, 5.0, 0.0, 0.0, 0.0];
        assert_eq!(
            find_events(&data, &EventOptions::below(3)),
            vec![Event::new(2, 3)]
        );
    }

    #[test]
    fn missing_samples_split_runs() {
        let data = [5.0, 0.0, 0.0, f64::NAN, 0.0, 0.0, 5.0];
        assert_eq!(find_events(&data, &EventOptions::below(3)), vec![]);
        assert_eq!(
            find_events(&data, &EventOptions::below(2)),
            vec![Event::new(1, 2), Event::new(4, 2)]
        );
    }

    #[test]
    fn max_duration_and_inter_min_filter() {
        let (data, _) = marker_channel(&[10, 40, 10], 5);
        let mut opts = EventOptions::below(5);
        opts.duration_max = Some(20);
        assert_eq!(find_events(&data, &opts).len(), 2);
        opts.duration_max = None;
        opts.inter_min = 10;
        // second run starts 5 samples after the first ends
        assert_eq!(
            find_events(&data, &opts),
            vec![Event::new(5, 10), Event::new(65, 10)]
        );
    }

    #[test]
    fn all_missing_channel_has_no_events() {
        assert!(find_events(&[f64::NAN; 8], &EventOptions::below(1)).is_empty());
    }

    #[test]
    fn drop_last_applies_before_count_check() {
        let (data, _) = marker_channel(&[10, 10, 10], 5);
        let events = detect_checked(
            &data,
            &EventOptions::below(5),
            Some(&EventCorrection::DropLast { count: 1 }),
            2,
            "HCT",
        )
        .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn count_mismatch_is_structural() {
        let (data, _) = marker_channel(&[10, 10], 5);
        let err = detect_checked(&data, &EventOptions::below(5), None, 6, "HCT").unwrap_err();
        assert_eq!(
            err,
            PipelineError::EventCount {
                label: "HCT".into(),
                expected: 6,
                found: 2
            }
        );
        assert!(err.is_structural());
    }

    #[test]
    fn replacement_must_fit_recording() {
        let fix = EventCorrection::Replace {
            events: vec![Event::new(90, 20)],
        };
        assert!(fix.apply(vec![], 100).is_err());
        let fix = EventCorrection::Replace {
            events: vec![Event::new(50, 20), Event::new(10, 5)],
        };
        assert_eq!(
            fix.apply(vec![], 100).unwrap(),
            vec![Event::new(10, 5), Event::new(50, 20)]
        );
    }
}
