//! Error taxonomy for the segmentation core.
//!
//! Every variant except [`PipelineError::InvalidParameter`] is a structural
//! violation: the participant being processed cannot yield trustworthy
//! features and must be aborted. Quality warnings are not errors; they are
//! collected as [`QualityWarning`] values and logged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("expected {expected} {label} event(s), found {found}")]
    EventCount {
        label: String,
        expected: usize,
        found: usize,
    },
    #[error("channel '{channel}' still has {runs} missing run(s) (first at sample {first_start})")]
    UnresolvedMissing {
        channel: String,
        runs: usize,
        first_start: usize,
    },
    #[error("channel '{channel}' has no valid samples to fill from")]
    NoValidSamples { channel: String },
    #[error("crop start {start} precedes the start of the data")]
    CropBeforeData { start: i64 },
    #[error("crop range {start}..{end} is empty")]
    EmptyCrop { start: usize, end: usize },
    #[error("{label} segment lasts {actual_s:.1}s, at least {required_s:.1}s required")]
    SegmentTooShort {
        label: String,
        actual_s: f64,
        required_s: f64,
    },
    #[error("event index {index} requested but only {available} event(s) detected")]
    MissingEvent { index: usize, available: usize },
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl PipelineError {
    pub fn is_structural(&self) -> bool {
        !matches!(self, PipelineError::InvalidParameter(_))
    }
}

/// Non-fatal finding; processing continues with the data as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityWarning {
    pub stage: String,
    pub message: String,
}

impl QualityWarning {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        let warning = Self {
            stage: stage.into(),
            message: message.into(),
        };
        log::warn!("[{}] {}", warning.stage, warning.message);
        warning
    }
}

impl std::fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}
