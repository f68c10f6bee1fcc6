//! Sequential batch over the cohort.
//!
//! Participants already present in the cohort table are skipped. A failed
//! participant is logged and left out of both outputs so a later run retries
//! it.

use crate::cohort::Outputs;
use crate::config::BatchConfig;
use crate::participant::Pipeline;
use crate::tables::read_participants;
use anyhow::Result;
use intero_lib::error::QualityWarning;
use intero_lib::overrides::OverrideTable;
use intero_lib::qc::QcCollector;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    /// Participant id and the error chain that aborted it.
    pub failed: Vec<(String, String)>,
    pub warnings: Vec<(String, QualityWarning)>,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn run_batch(
    config: &BatchConfig,
    root: &Path,
    out_dir: &Path,
    overrides: &OverrideTable,
    qc: &mut QcCollector,
) -> Result<BatchSummary> {
    let participants = read_participants(root)?;
    let pipeline = Pipeline::new(config);
    let columns = pipeline.record_columns(&participants, root)?;
    let mut outputs = Outputs::open(
        out_dir,
        (&config.cohort_file, columns),
        (&config.hep_file, pipeline.hep_columns()),
    )?;
    let mut summary = BatchSummary::default();
    log::info!(
        "{} participant(s) listed, {} with overrides",
        participants.len(),
        overrides.len()
    );

    for entry in &participants {
        let id = entry.id.as_str();
        println!("{id}");
        if let Some(comment) = &entry.comment {
            println!("  * {comment}");
        }
        if outputs.is_complete(id) {
            log::info!("{id}: already in {}, skipping", config.cohort_file);
            summary.skipped.push(id.to_string());
            continue;
        }
        let outcome = match pipeline.process(entry, root, &overrides.get(id), qc) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("{id}: {e:#}");
                summary.failed.push((id.to_string(), format!("{e:#}")));
                continue;
            }
        };
        outputs.commit(&outcome.hep_rows, &outcome.record)?;
        summary.warnings.extend(
            outcome
                .warnings
                .into_iter()
                .map(|w| (id.to_string(), w)),
        );
        summary.processed.push(outcome.id);
    }

    log::info!(
        "{} processed, {} skipped, {} failed",
        summary.processed.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    println!("Done!");
    Ok(summary)
}
