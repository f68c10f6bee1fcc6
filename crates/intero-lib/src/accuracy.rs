//! Heartbeat counting task scores (Garfinkel et al., 2015).
//!
//! Accuracy uses the symmetric percentage error
//! `1 - |reported - detected| / ((reported + detected) / 2)`. A trial whose
//! reported count is zero or missing has no accuracy; the gap propagates as a
//! missing value instead of an error.

use crate::stats::{nanmean, spearman};
use serde::{Deserialize, Serialize};

/// Which detected physiological events a participant's counts are compared to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountSource {
    /// R-peaks from the electrocardiogram.
    #[default]
    Ecg,
    /// Pulse peaks, for participants whose ECG is unusable.
    Ppg,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HctTrial {
    pub detected: usize,
    pub reported: Option<f64>,
    pub confidence: Option<f64>,
}

pub fn trial_accuracy(reported: Option<f64>, detected: usize) -> Option<f64> {
    let reported = reported.filter(|r| r.is_finite() && *r > 0.0)?;
    let detected = detected as f64;
    let mean = (reported + detected) / 2.0;
    Some(1.0 - (reported - detected).abs() / mean)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialScore {
    pub trial: usize,
    pub detected: usize,
    pub reported: Option<f64>,
    pub confidence: Option<f64>,
    pub accuracy: Option<f64>,
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HctScores {
    /// Mean accuracy over valid trials.
    pub accuracy: Option<f64>,
    /// Mean confidence over valid trials.
    pub sensibility: Option<f64>,
    /// Spearman correlation between confidence and accuracy.
    pub awareness: Option<f64>,
    pub trials: Vec<TrialScore>,
}

/// Score every trial; trials listed in `excluded` (0-based) are kept in the
/// per-trial output but left out of all three summaries.
pub fn score_trials(trials: &[HctTrial], excluded: &[usize]) -> HctScores {
    let scored: Vec<TrialScore> = trials
        .iter()
        .enumerate()
        .map(|(trial, t)| TrialScore {
            trial,
            detected: t.detected,
            reported: t.reported,
            confidence: t.confidence,
            accuracy: trial_accuracy(t.reported, t.detected),
            excluded: excluded.contains(&trial),
        })
        .collect();
    let valid: Vec<&TrialScore> = scored.iter().filter(|t| !t.excluded).collect();
    let accuracies: Vec<f64> = valid
        .iter()
        .map(|t| t.accuracy.unwrap_or(f64::NAN))
        .collect();
    let confidences: Vec<f64> = valid
        .iter()
        .map(|t| t.confidence.unwrap_or(f64::NAN))
        .collect();
    HctScores {
        accuracy: nanmean(&accuracies),
        sensibility: nanmean(&confidences),
        awareness: spearman(&confidences, &accuracies),
        trials: scored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(detected: usize, reported: f64, confidence: f64) -> HctTrial {
        HctTrial {
            detected,
            reported: Some(reported),
            confidence: Some(confidence),
        }
    }

    #[test]
    fn exact_count_is_perfect() {
        assert_eq!(trial_accuracy(Some(10.0), 10), Some(1.0));
    }

    #[test]
    fn symmetric_error() {
        let acc = trial_accuracy(Some(8.0), 10).unwrap();
        assert!((acc - (1.0 - 2.0 / 9.0)).abs() < 1e-12);
        // swapping reported and detected gives the same score
        assert_eq!(trial_accuracy(Some(10.0), 8), trial_accuracy(Some(8.0), 10));
    }

    #[test]
    fn zero_or_missing_report_is_missing() {
        assert_eq!(trial_accuracy(Some(0.0), 0), None);
        assert_eq!(trial_accuracy(Some(0.0), 12), None);
        assert_eq!(trial_accuracy(None, 12), None);
        assert_eq!(trial_accuracy(Some(f64::NAN), 12), None);
    }

    #[test]
    fn summaries_over_valid_trials() {
        let trials = [
            trial(10, 10.0, 0.9),
            trial(10, 8.0, 0.5),
            trial(20, 10.0, 0.1),
        ];
        let scores = score_trials(&trials, &[]);
        let expected = (1.0 + (1.0 - 2.0 / 9.0) + (1.0 - 10.0 / 15.0)) / 3.0;
        assert!((scores.accuracy.unwrap() - expected).abs() < 1e-12);
        assert!((scores.sensibility.unwrap() - 0.5).abs() < 1e-12);
        assert!((scores.awareness.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn excluded_trials_leave_all_statistics() {
        let trials = [
            trial(10, 10.0, 0.9),
            trial(10, 1.0, 0.95),
            trial(20, 10.0, 0.1),
            trial(12, 11.0, 0.6),
        ];
        let scores = score_trials(&trials, &[1]);
        assert!(scores.trials[1].excluded);
        assert!(scores.trials[1].accuracy.is_some());
        let kept = score_trials(&[trials[0], trials[2], trials[3]], &[]);
        assert_eq!(scores.accuracy, kept.accuracy);
        assert_eq!(scores.sensibility, kept.sensibility);
        assert_eq!(scores.awareness, kept.awareness);
    }

    #[test]
    fn missing_accuracy_is_skipped_not_fatal() {
        let trials = [
            trial(10, 10.0, 0.8),
            HctTrial {
                detected: 9,
                reported: None,
                confidence: Some(0.2),
            },
            trial(10, 5.0, 0.3),
        ];
        let scores = score_trials(&trials, &[]);
        assert_eq!(scores.trials[1].accuracy, None);
        let expected = (1.0 + (1.0 - 5.0 / 7.5)) / 2.0;
        assert!((scores.accuracy.unwrap() - expected).abs() < 1e-12);
        // sensibility still uses the confidence of the unscored trial
        assert!((scores.sensibility.unwrap() - 0.4333333333333333).abs() < 1e-12);
    }

    #[test]
    fn single_trial_has_no_awareness() {
        let scores = score_trials(&[trial(10, 9.0, 0.5)], &[]);
        assert_eq!(scores.awareness, None);
        assert!(scores.accuracy.is_some());
    }
}
