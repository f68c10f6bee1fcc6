//! Batch orchestration for the interoception pipeline: configuration, the
//! tabular inputs and outputs, per-participant processing and a synthetic
//! dataset generator.

pub mod batch;
pub mod cohort;
pub mod config;
pub mod participant;
pub mod simulate;
pub mod tables;

pub use batch::{run_batch, BatchSummary};
pub use config::{read_config, BatchConfig};
