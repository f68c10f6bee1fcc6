pub mod hep;
pub mod hrv;

pub use hep::{analyze_hep, HepOptions, HepResult};
pub use hrv::{hrv_summary, HrvSummary};
