use crate::signal::{Beats, RRSeries};
use crate::spectrum::{band_power, welch};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;

/// Tachogram resampling rate for the spectral measures (Hz).
pub const INTERP_FS: f64 = 4.0;
/// Welch segment length on the resampled tachogram (s).
const WELCH_SEGMENT_S: f64 = 60.0;
const LF_BAND: (f64, f64) = (0.04, 0.15);
const HF_BAND: (f64, f64) = (0.15, 0.4);
const HFD_KMAX: usize = 10;

/// Heart-rate variability summary of one analysis window.
///
/// Intervals are in milliseconds, `pnn50` is a percentage, band powers are
/// ms² summed over the Welch periodogram bins of each band. `ca` is the
/// fraction of total variance owed to accelerations and `ai` the percentage
/// of Poincaré area above the identity line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    pub n_beats: usize,
    pub mean_nn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
    pub samp_en: Option<f64>,
    pub lf: Option<f64>,
    pub hf: Option<f64>,
    pub lf_hf: Option<f64>,
    pub hfd: Option<f64>,
    pub ials: Option<f64>,
    pub ca: Option<f64>,
    pub ai: Option<f64>,
}

/// Number of HRV output columns.
pub const HRV_WIDTH: usize = 12;

impl HrvSummary {
    /// Output columns, in a fixed order.
    pub const COLUMNS: [&'static str; HRV_WIDTH] = [
        "HRV_MeanNN",
        "HRV_SDNN",
        "HRV_RMSSD",
        "HRV_pNN50",
        "HRV_SampEn",
        "HRV_LF",
        "HRV_HF",
        "HRV_LFHF",
        "HRV_HFD",
        "HRV_IALS",
        "HRV_Ca",
        "HRV_AI",
    ];

    pub fn values(&self) -> [Option<f64>; HRV_WIDTH] {
        [
            Some(self.mean_nn),
            Some(self.sdnn),
            Some(self.rmssd),
            Some(self.pnn50),
            self.samp_en,
            self.lf,
            self.hf,
            self.lf_hf,
            self.hfd,
            self.ials,
            self.ca,
            self.ai,
        ]
    }
}

/// Summary from beat sample indices. `None` below three beats.
pub fn hrv_summary(beats: &Beats, fs: f64) -> Option<HrvSummary> {
    if beats.len() < 3 {
        return None;
    }
    let rr = RRSeries::from_beats(beats, fs);
    let nn: Vec<f64> = rr.rr.iter().map(|s| s * 1000.0).collect();
    let n = nn.len() as f64;
    let mean_nn = nn.iter().sum::<f64>() / n;
    let sdnn = (nn.iter().map(|x| (x - mean_nn).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    let diffs: Vec<f64> = nn.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
    let pnn50 =
        100.0 * diffs.iter().filter(|d| d.abs() > 50.0).count() as f64 / diffs.len() as f64;
    let samp_en = sample_entropy(&nn, 2, 0.2 * sdnn);
    let tachogram = resample_tachogram(&nn, INTERP_FS);
    let segment = (INTERP_FS * WELCH_SEGMENT_S) as usize;
    let (lf, hf) = match welch(&tachogram, INTERP_FS, segment) {
        Some((freqs, powers)) => (
            Some(band_power(&freqs, &powers, LF_BAND)),
            Some(band_power(&freqs, &powers, HF_BAND)),
        ),
        None => (None, None),
    };
    let lf_hf = match (lf, hf) {
        (Some(lf), Some(hf)) if hf > 0.0 => Some(lf / hf),
        _ => None,
    };
    let (ca, ai) = poincare_asymmetry(&nn);
    Some(HrvSummary {
        n_beats: beats.len(),
        mean_nn,
        sdnn,
        rmssd,
        pnn50,
        samp_en,
        lf,
        hf,
        lf_hf,
        hfd: higuchi_fd(&nn, HFD_KMAX),
        ials: ials(&diffs),
        ca,
        ai,
    })
}

/// Sample entropy with embedding `m` and tolerance `r`; `None` when no
/// template pair matches.
fn sample_entropy(data: &[f64], m: usize, r: f64) -> Option<f64> {
    if data.len() <= m + 1 || r <= 0.0 {
        return None;
    }
    let templates = data.len() - m;
    let mut matches_m = 0usize;
    let mut matches_m1 = 0usize;
    for i in 0..templates {
        for j in (i + 1)..templates {
            if chebyshev(data, i, j, m) < r {
                matches_m += 1;
                if j + m < data.len() && chebyshev(data, i, j, m + 1) < r {
                    matches_m1 += 1;
                }
            }
        }
    }
    if matches_m == 0 || matches_m1 == 0 {
        return None;
    }
    Some(-(matches_m1 as f64 / matches_m as f64).ln())
}

fn chebyshev(data: &[f64], i: usize, j: usize, length: usize) -> f64 {
    data[i..i + length]
        .iter()
        .zip(&data[j..j + length])
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

/// Linear interpolation of the NN tachogram onto a uniform grid.
fn resample_tachogram(nn_ms: &[f64], fs: f64) -> Vec<f64> {
    let mut times = Vec::with_capacity(nn_ms.len());
    let mut acc = 0.0;
    for interval in nn_ms {
        acc += interval / 1000.0;
        times.push(acc);
    }
    let (Some(&first), Some(&last)) = (times.first(), times.last()) else {
        return Vec::new();
    };
    let n = ((last - first) * fs).floor() as usize + 1;
    let mut out = Vec::with_capacity(n);
    let mut idx = 0;
    for k in 0..n {
        let t = first + k as f64 / fs;
        while idx + 2 < times.len() && times[idx + 1] < t {
            idx += 1;
        }
        let (t0, t1) = (times[idx], times[(idx + 1).min(times.len() - 1)]);
        let (v0, v1) = (nn_ms[idx], nn_ms[(idx + 1).min(nn_ms.len() - 1)]);
        let frac = if t1 > t0 {
            ((t - t0) / (t1 - t0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(v0 + frac * (v1 - v0));
    }
    out
}

/// Higuchi fractal dimension with curve lengths up to `kmax` steps.
///
/// Scales whose mean curve length is zero are skipped; `None` when fewer
/// than two scales remain.
fn higuchi_fd(data: &[f64], kmax: usize) -> Option<f64> {
    let n = data.len();
    let mut points = Vec::with_capacity(kmax);
    for k in 1..=kmax {
        let mut lengths = Vec::with_capacity(k);
        for m in 0..k {
            let steps = n.saturating_sub(m + 1) / k;
            if steps == 0 {
                continue;
            }
            let walk: f64 = (1..=steps)
                .map(|i| (data[m + i * k] - data[m + (i - 1) * k]).abs())
                .sum();
            lengths.push(walk * (n - 1) as f64 / (steps * k) as f64 / k as f64);
        }
        if lengths.is_empty() {
            break;
        }
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        if mean > 0.0 {
            points.push(((1.0 / k as f64).ln(), mean.ln()));
        }
    }
    slope(&points)
}

/// Least-squares slope of `(x, y)` points.
fn slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    (sxx > 0.0).then(|| sxy / sxx)
}

/// Inverse of the mean length of runs of successive same-sign interval
/// changes. Zero changes end a run without starting one.
fn ials(diffs: &[f64]) -> Option<f64> {
    let mut runs = Vec::new();
    let mut current = 0usize;
    let mut sign = 0.0;
    for d in diffs {
        let s = if *d > 0.0 {
            1.0
        } else if *d < 0.0 {
            -1.0
        } else {
            0.0
        };
        if s != 0.0 && s == sign {
            current += 1;
        } else {
            if current > 0 {
                runs.push(current);
            }
            current = usize::from(s != 0.0);
        }
        sign = s;
    }
    if current > 0 {
        runs.push(current);
    }
    if runs.is_empty() {
        return None;
    }
    let mean = runs.iter().sum::<usize>() as f64 / runs.len() as f64;
    Some(1.0 / mean)
}

/// Poincaré plot asymmetry: share of the short-term variance carried by
/// accelerations (`Ca`) and the area index of decelerations (`AI`, %).
///
/// Points above the identity line (next interval longer) are
/// decelerations, points below are accelerations.
fn poincare_asymmetry(nn: &[f64]) -> (Option<f64>, Option<f64>) {
    if nn.len() < 3 {
        return (None, None);
    }
    let x = &nn[..nn.len() - 1];
    let y = &nn[1..];
    let pairs = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / pairs;
    let mean_y = y.iter().sum::<f64>() / pairs;

    let mut area_dec = 0.0;
    let mut area_all = 0.0;
    let (mut sd1_dec, mut sd1_acc) = (0.0, 0.0);
    let (mut sd2_dec, mut sd2_acc, mut sd2_flat) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let across = (b - a).abs() / 2f64.sqrt();
        let along = ((a - mean_x) + (b - mean_y)).abs() / 2f64.sqrt();
        let theta = (FRAC_PI_4 - (b / a).atan()).abs();
        let sector = 0.5 * theta * (a * a + b * b);
        area_all += sector;
        if b > a {
            area_dec += sector;
            sd1_dec += across * across;
            sd2_dec += along * along;
        } else if b < a {
            sd1_acc += across * across;
            sd2_acc += along * along;
        } else {
            sd2_flat += along * along;
        }
    }
    let ai = (area_all > 0.0).then(|| 100.0 * area_dec / area_all);

    let sd2_dec = sd2_dec + 0.5 * sd2_flat;
    let sd2_acc = sd2_acc + 0.5 * sd2_flat;
    // variances over all pairs, halved sums of the SD1 and SD2 parts
    let sdnn_dec = 0.5 * (sd1_dec + sd2_dec) / pairs;
    let sdnn_acc = 0.5 * (sd1_acc + sd2_acc) / pairs;
    let total = sdnn_dec + sdnn_acc;
    let ca = (total > 0.0).then(|| sdnn_acc / total);
    (ca, ai)
}
