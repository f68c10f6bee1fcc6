//! Cropping recordings to their valid analysis window.

use crate::error::{PipelineError, QualityWarning};
use crate::events::Event;
use crate::gaps::missing_spans;
use crate::signal::Recording;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRef {
    First,
    Last,
    Nth(usize),
}

impl EventRef {
    fn resolve(self, events: &[Event]) -> Result<Event, PipelineError> {
        let picked = match self {
            EventRef::First => events.first(),
            EventRef::Last => events.last(),
            EventRef::Nth(n) => events.get(n),
        };
        picked.copied().ok_or(PipelineError::MissingEvent {
            index: match self {
                EventRef::Nth(n) => n,
                _ => 0,
            },
            available: events.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Sample(usize),
    Onset(EventRef),
    /// First sample after the event.
    Offset(EventRef),
    RecordingEnd,
}

/// Anchor plus a signed margin in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub anchor: Anchor,
    pub margin: i64,
}

impl Bound {
    pub fn at(anchor: Anchor) -> Self {
        Self { anchor, margin: 0 }
    }

    pub fn with_margin(anchor: Anchor, margin: i64) -> Self {
        Self { anchor, margin }
    }

    fn resolve(&self, events: &[Event], len: usize) -> Result<i64, PipelineError> {
        let base = match self.anchor {
            Anchor::Sample(s) => s,
            Anchor::Onset(r) => r.resolve(events)?.onset,
            Anchor::Offset(r) => r.resolve(events)?.end(),
            Anchor::RecordingEnd => len,
        };
        Ok(base as i64 + self.margin)
    }
}

/// Start is inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSpec {
    pub start: Bound,
    pub end: Bound,
}

impl CropSpec {
    /// Whole span of a single event.
    pub fn event(r: EventRef) -> Self {
        Self {
            start: Bound::at(Anchor::Onset(r)),
            end: Bound::at(Anchor::Offset(r)),
        }
    }

    /// From the first onset to the last offset, widened by `margin` on both sides.
    pub fn around_events(margin: i64) -> Self {
        Self {
            start: Bound::with_margin(Anchor::Onset(EventRef::First), -margin),
            end: Bound::with_margin(Anchor::Offset(EventRef::Last), margin),
        }
    }
}

/// Recording-specific fix applied at the crop stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CropCorrection {
    /// Use an explicit start sample instead of the event-derived one; the
    /// start margin still applies.
    StartAt { sample: usize },
    /// Keep only the samples before the first gap in `channel`.
    TruncateAtFirstGap { channel: String },
    /// Start after the last gap found within the first `search_limit` samples.
    StartAfterLastGap { channel: String, search_limit: usize },
    /// Start after the first gap of whichever channel's first gap ends last.
    SkipLeadingGaps { channels: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct CropOutcome {
    pub recording: Recording,
    /// Absolute start in the source recording.
    pub start: usize,
    /// Absolute exclusive end in the source recording.
    pub end: usize,
    pub warnings: Vec<QualityWarning>,
}

/// Advance `start` past any missing run of a guard channel containing it.
fn skip_guard_gaps(rec: &Recording, start: usize, guard: &[&str]) -> Result<usize, PipelineError> {
    let mut spans = Vec::with_capacity(guard.len());
    for name in guard {
        spans.push(missing_spans(rec.channel(name)?));
    }
    let mut start = start;
    loop {
        let next = spans
            .iter()
            .flatten()
            .filter(|(s, e)| *s <= start && start <= *e)
            .map(|(_, e)| e + 1)
            .max();
        match next {
            Some(n) if n > start => start = n,
            _ => return Ok(start),
        }
    }
}

/// Crop `rec` to `spec`. Guard channels are the attention/heart/pulse group;
/// a start inside one of their missing runs is moved past the run.
pub fn crop(
    rec: &Recording,
    events: &[Event],
    spec: &CropSpec,
    guard: &[&str],
) -> Result<CropOutcome, PipelineError> {
    let len = rec.len();
    let mut warnings = Vec::new();
    let start = spec.start.resolve(events, len)?;
    if start < 0 {
        return Err(PipelineError::CropBeforeData { start });
    }
    let mut end = spec.end.resolve(events, len)?;
    if end > len as i64 {
        warnings.push(QualityWarning::new(
            "crop",
            format!("end {end} past recording end {len}, clamped"),
        ));
        end = len as i64;
    }
    let nominal = start as usize;
    let start = skip_guard_gaps(rec, nominal, guard)?;
    if start != nominal {
        log::info!("crop start moved from {nominal} to {start} past leading gap");
    }
    let end = end.max(0) as usize;
    if start >= end {
        return Err(PipelineError::EmptyCrop { start, end });
    }
    Ok(CropOutcome {
        recording: rec.slice(start, end)?,
        start,
        end,
        warnings,
    })
}

fn post_correction(
    outcome: CropOutcome,
    correction: &CropCorrection,
) -> Result<CropOutcome, PipelineError> {
    let rec = &outcome.recording;
    let (from, to) = match correction {
        CropCorrection::StartAt { .. } => return Ok(outcome),
        CropCorrection::TruncateAtFirstGap { channel } => {
            match missing_spans(rec.channel(channel)?).first() {
                Some(&(first, _)) => (0, first),
                None => return Ok(outcome),
            }
        }
        CropCorrection::StartAfterLastGap {
            channel,
            search_limit,
        } => {
            let values = rec.channel(channel)?;
            let limit = (*search_limit).min(values.len());
            match values[..limit].iter().rposition(|v| !v.is_finite()) {
                Some(last) => (last + 1, rec.len()),
                None => return Ok(outcome),
            }
        }
        CropCorrection::SkipLeadingGaps { channels } => {
            let mut skip = None;
            for name in channels {
                if let Some(&(_, end)) = missing_spans(rec.channel(name)?).first() {
                    skip = skip.max(Some(end + 1));
                }
            }
            match skip {
                Some(s) => (s, rec.len()),
                None => return Ok(outcome),
            }
        }
    };
    if from >= to {
        return Err(PipelineError::EmptyCrop {
            start: outcome.start + from,
            end: outcome.start + to,
        });
    }
    log::info!("crop correction {correction:?} keeps {from}..{to}");
    Ok(CropOutcome {
        recording: rec.slice(from, to)?,
        start: outcome.start + from,
        end: outcome.start + to,
        warnings: outcome.warnings,
    })
}

/// Crop, then apply recording-specific corrections in order.
pub fn crop_with_corrections(
    rec: &Recording,
    events: &[Event],
    spec: &CropSpec,
    guard: &[&str],
    corrections: &[CropCorrection],
) -> Result<CropOutcome, PipelineError> {
    let mut spec = *spec;
    for correction in corrections {
        if let CropCorrection::StartAt { sample } = correction {
            spec.start.anchor = Anchor::Sample(*sample);
        }
    }
    let mut outcome = crop(rec, events, &spec, guard)?;
    for correction in corrections {
        outcome = post_correction(outcome, correction)?;
    }
    Ok(outcome)
}

/// Events lying fully inside `[start, end)`, shifted onto the cropped axis.
pub fn rebase_events(events: &[Event], start: usize, end: usize) -> Vec<Event> {
    events
        .iter()
        .filter(|e| e.onset >= start && e.end() <= end)
        .map(|e| Event::new(e.onset - start, e.duration))
        .collect()
}

pub fn ensure_min_duration(
    rec: &Recording,
    required_s: f64,
    label: &str,
) -> Result<(), PipelineError> {
    if rec.duration() < required_s {
        return Err(PipelineError::SegmentTooShort {
            label: label.to_string(),
            actual_s: rec.duration(),
            required_s,
        });
    }
    Ok(())
}
