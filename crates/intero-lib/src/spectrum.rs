//! Welch power spectrum shared by the HRV band powers and the EEG QC panels.

use realfft::RealFftPlanner;
use std::f64::consts::PI;

/// Welch periodogram with Hann windows and 50 % overlap.
///
/// Each segment is mean-removed before tapering. `segment` is clamped to the
/// signal length. Returns bin frequencies and the power in each bin (density
/// times bin width), one-sided. `None` below 8 samples.
pub fn welch(signal: &[f64], fs: f64, segment: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    if signal.len() < 8 || fs <= 0.0 {
        return None;
    }
    let window = segment.clamp(8, signal.len());
    let step = (window / 2).max(1);
    let taper = hann(window);
    let norm: f64 = taper.iter().map(|w| w * w).sum::<f64>() * fs;
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let mut spectrum = r2c.make_output_vec();
    let mut powers = vec![0.0; spectrum.len()];
    let mut segments = 0;
    let mut pos = 0;
    while pos + window <= signal.len() {
        let chunk = &signal[pos..pos + window];
        let mean = chunk.iter().sum::<f64>() / window as f64;
        let mut frame: Vec<f64> = chunk
            .iter()
            .zip(&taper)
            .map(|(x, w)| (x - mean) * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum).ok()?;
        for (k, bin) in spectrum.iter().enumerate() {
            let one_sided = if k == 0 || (window % 2 == 0 && k == window / 2) {
                1.0
            } else {
                2.0
            };
            powers[k] += one_sided * bin.norm_sqr() / norm;
        }
        segments += 1;
        pos += step;
    }
    let df = fs / window as f64;
    // density to per-bin power
    powers
        .iter_mut()
        .for_each(|p| *p = *p / segments as f64 * df);
    let freqs = (0..powers.len()).map(|k| k as f64 * df).collect();
    Some((freqs, powers))
}

/// Sum of the bins in `[band.0, band.1)`.
pub fn band_power(freqs: &[f64], powers: &[f64], band: (f64, f64)) -> f64 {
    freqs
        .iter()
        .zip(powers)
        .filter(|(f, _)| **f >= band.0 && **f < band.1)
        .map(|(_, p)| *p)
        .sum()
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amp: f64, fs: f64, secs: f64) -> Vec<f64> {
        (0..(fs * secs) as usize)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn short_signal_has_no_spectrum() {
        assert!(welch(&[1.0; 5], 100.0, 256).is_none());
    }

    #[test]
    fn peak_sits_at_the_sine_frequency() {
        let signal = sine(10.0, 1.0, 128.0, 20.0);
        let (freqs, powers) = welch(&signal, 128.0, 256).unwrap();
        assert_eq!(freqs.len(), 129);
        let peak = powers
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| freqs[k])
            .unwrap();
        assert!((peak - 10.0).abs() < 0.5, "peak at {peak}");
    }

    #[test]
    fn band_power_recovers_the_variance() {
        // a sine of amplitude A carries A²/2 of power
        let signal = sine(5.0, 2.0, 100.0, 60.0);
        let (freqs, powers) = welch(&signal, 100.0, 400).unwrap();
        let total = band_power(&freqs, &powers, (0.0, 50.0));
        assert!((total - 2.0).abs() < 0.1, "total {total}");
        assert!(band_power(&freqs, &powers, (20.0, 30.0)) < 1e-3);
    }

    #[test]
    fn offset_is_removed() {
        let signal: Vec<f64> = sine(5.0, 1.0, 100.0, 10.0)
            .into_iter()
            .map(|v| v + 50.0)
            .collect();
        let (_, powers) = welch(&signal, 100.0, 200).unwrap();
        assert!(powers[0] < 1e-6);
    }
}
