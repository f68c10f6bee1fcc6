//! Backend-agnostic line figures; the CLI renders them with plotters.

use crate::epochs::Evoked;
use crate::events::Event;
use crate::signal::Recording;
use crate::spectrum::welch;
use serde::{Deserialize, Serialize};

/// Default number of points kept per series.
pub const MAX_POINTS: usize = 2000;

const PALETTE: [u32; 5] = [0x1F77B4, 0xD62728, 0x2CA02C, 0x9467BD, 0xFF7F0E];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub width: u32,
    pub color: Color,
    /// Drawn as isolated markers instead of a connected line.
    #[serde(default)]
    pub marker: bool,
}

/// Shaded x-range, e.g. a detected task interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub from: f64,
    pub to: f64,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub lines: Vec<LineSeries>,
    pub spans: Vec<Span>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            lines: Vec::new(),
            spans: Vec::new(),
        }
    }

    pub fn with_labels(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_line(&mut self, name: &str, points: Vec<[f64; 2]>, color: Color) {
        self.lines.push(LineSeries {
            name: name.into(),
            points,
            width: 1,
            color,
            marker: false,
        });
    }

    pub fn add_markers(&mut self, name: &str, points: Vec<[f64; 2]>, color: Color) {
        self.lines.push(LineSeries {
            name: name.into(),
            points,
            width: 3,
            color,
            marker: true,
        });
    }

    /// Finite x and y extents over every line, `None` for an empty figure.
    pub fn bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        let mut xs = [f64::INFINITY, f64::NEG_INFINITY];
        let mut ys = [f64::INFINITY, f64::NEG_INFINITY];
        for [x, y] in self.lines.iter().flat_map(|l| l.points.iter()) {
            if x.is_finite() && y.is_finite() {
                xs = [xs[0].min(*x), xs[1].max(*x)];
                ys = [ys[0].min(*y), ys[1].max(*y)];
            }
        }
        if xs[0] > xs[1] {
            return None;
        }
        if ys[0] == ys[1] {
            ys = [ys[0] - 1.0, ys[1] + 1.0];
        }
        if xs[0] == xs[1] {
            xs = [xs[0] - 1.0, xs[1] + 1.0];
        }
        Some((xs, ys))
    }
}

/// Bucketed min/max decimation; keeps spikes visible in long recordings.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points || max_points < 2 {
        return points.to_vec();
    }
    let buckets = max_points / 2;
    let size = points.len() as f64 / buckets as f64;
    let mut out = Vec::with_capacity(buckets * 2);
    for b in 0..buckets {
        let start = (b as f64 * size).floor() as usize;
        let end = (((b + 1) as f64 * size).floor() as usize).min(points.len());
        let chunk = &points[start..end];
        let finite = chunk.iter().filter(|p| p[1].is_finite());
        let lo = finite.clone().min_by(|a, b| a[1].total_cmp(&b[1]));
        let hi = finite.max_by(|a, b| a[1].total_cmp(&b[1]));
        match (lo, hi) {
            (Some(lo), Some(hi)) if lo[0] <= hi[0] => out.extend([*lo, *hi]),
            (Some(lo), Some(hi)) => out.extend([*hi, *lo]),
            _ => {}
        }
    }
    out
}

fn channel_points(values: &[f64], fs: f64) -> Vec<[f64; 2]> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| [i as f64 / fs, *v])
        .collect()
}

/// One channel against time in seconds, with events shaded.
pub fn figure_from_channel(title: &str, values: &[f64], fs: f64, events: &[Event]) -> Figure {
    let mut fig = Figure::new(Some(title.to_string())).with_labels("Time (s)", "");
    fig.add_line(
        title,
        decimate_points(&channel_points(values, fs), MAX_POINTS),
        Color(PALETTE[0]),
    );
    fig.spans = events
        .iter()
        .map(|e| Span {
            from: e.onset as f64 / fs,
            to: e.end() as f64 / fs,
            color: Color(0xFFD27F),
        })
        .collect();
    fig
}

/// One channel with detected peaks marked on it.
pub fn figure_from_peaks(title: &str, values: &[f64], fs: f64, peaks: &[usize]) -> Figure {
    let mut fig = Figure::new(Some(title.to_string())).with_labels("Time (s)", "");
    fig.add_line(
        title,
        decimate_points(&channel_points(values, fs), MAX_POINTS),
        Color(PALETTE[0]),
    );
    let marks = peaks
        .iter()
        .filter_map(|&i| values.get(i).map(|v| [i as f64 / fs, *v]))
        .collect();
    fig.add_markers("peaks", marks, Color(PALETTE[1]));
    fig
}

/// Several channels of one recording overlaid against time in seconds.
pub fn figure_from_channels(title: &str, rec: &Recording, channels: &[&str]) -> Figure {
    let mut fig = Figure::new(Some(title.to_string())).with_labels("Time (s)", "Amplitude");
    for (i, name) in channels.iter().enumerate() {
        if let Ok(values) = rec.channel(name) {
            fig.add_line(
                name,
                decimate_points(&channel_points(values, rec.fs()), MAX_POINTS),
                Color(PALETTE[i % PALETTE.len()]),
            );
        }
    }
    fig
}

/// Welch power spectrum (log10) per channel over its finite samples.
pub fn figure_from_psd(
    title: &str,
    rec: &Recording,
    channels: &[&str],
    segment_s: f64,
) -> Figure {
    let mut fig =
        Figure::new(Some(title.to_string())).with_labels("Frequency (Hz)", "log10 power");
    let segment = (segment_s * rec.fs()).round() as usize;
    for (i, name) in channels.iter().enumerate() {
        let Ok(values) = rec.channel(name) else {
            continue;
        };
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if let Some((freqs, powers)) = welch(&finite, rec.fs(), segment) {
            let points = freqs
                .iter()
                .zip(&powers)
                .skip(1)
                .map(|(f, p)| [*f, p.log10()])
                .collect();
            fig.add_line(name, points, Color(PALETTE[i % PALETTE.len()]));
        }
    }
    fig
}

/// Evoked waveforms of the given channels.
pub fn figure_from_evoked(title: &str, evoked: &Evoked, channels: &[&str]) -> Figure {
    let mut fig = Figure::new(Some(title.to_string())).with_labels("Time (s)", "Amplitude");
    let times = evoked.times();
    for (i, name) in channels.iter().enumerate() {
        if let Some(values) = evoked.channel(name) {
            let points = times.iter().zip(values).map(|(t, v)| [*t, *v]).collect();
            fig.add_line(name, points, Color(PALETTE[i % PALETTE.len()]));
        }
    }
    fig
}

/// Reported against detected counts per trial, with the identity line.
pub fn figure_from_counts(title: &str, detected: &[usize], reported: &[Option<f64>]) -> Figure {
    let mut fig = Figure::new(Some(title.to_string())).with_labels("Trial", "Count");
    let det = detected
        .iter()
        .enumerate()
        .map(|(i, d)| [i as f64 + 1.0, *d as f64])
        .collect();
    let rep = reported
        .iter()
        .enumerate()
        .map(|(i, r)| [i as f64 + 1.0, r.unwrap_or(f64::NAN)])
        .collect();
    fig.add_line("detected", det, Color(PALETTE[1]));
    fig.add_line("reported", rep, Color(PALETTE[0]));
    fig
}
