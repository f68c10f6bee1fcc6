//! Segmentation and scoring core for interoception physiology recordings.

pub mod accuracy;
pub mod beats;
pub mod crop;
pub mod epochs;
pub mod error;
pub mod events;
pub mod features;
pub mod gaps;
pub mod io;
pub mod overrides;
pub mod plot;
pub mod qc;
pub mod signal;
pub mod spectrum;
pub mod stats;

pub use error::{PipelineError, QualityWarning};
pub use signal::{Beats, Recording, RRSeries};
