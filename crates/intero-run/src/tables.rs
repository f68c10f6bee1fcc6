//! Dataset layout and the tabular inputs around the recordings.

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use intero_lib::accuracy::HctTrial;
use intero_lib::io::recording::parse_sample;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Ordered `(column, value)` cells of one table row.
pub type Row = Vec<(String, String)>;

/// Paths of one participant's files under the dataset root.
#[derive(Debug, Clone)]
pub struct ParticipantFiles {
    pub id: String,
    pub eeg_dir: PathBuf,
    pub beh_dir: PathBuf,
}

impl ParticipantFiles {
    pub fn new(root: &Path, id: &str) -> Self {
        Self {
            id: id.to_string(),
            eeg_dir: root.join(id).join("eeg"),
            beh_dir: root.join(id).join("beh"),
        }
    }

    pub fn physio(&self, task: &str) -> PathBuf {
        self.eeg_dir.join(format!("{}_task-{task}_physio.tsv", self.id))
    }

    pub fn behavior(&self, task: &str) -> PathBuf {
        self.beh_dir.join(format!("{}_task-{task}_beh.tsv", self.id))
    }

    pub fn questionnaires(&self) -> PathBuf {
        self.beh_dir.join(format!("{}_Questionnaires.tsv", self.id))
    }
}

/// Read every row of a tab-separated table as ordered cells.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .clone();
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("row {} of {}", idx + 2, path.display()))?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

pub fn cell<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.iter()
        .find(|(c, _)| c == column)
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone)]
pub struct ParticipantEntry {
    pub id: String,
    pub comment: Option<String>,
    /// Full metadata row, `participant_id` first.
    pub meta: Row,
}

/// Cohort metadata; `participant_id` is required and must be unique.
pub fn read_participants(root: &Path) -> Result<Vec<ParticipantEntry>> {
    let path = root.join("participants.tsv");
    let rows = read_rows(&path)?;
    let mut entries: Vec<ParticipantEntry> = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let id = match cell(&row, "participant_id") {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => bail!("{} row {} has no participant_id", path.display(), idx + 2),
        };
        if entries.iter().any(|e| e.id == id) {
            bail!("{} lists {id} twice", path.display());
        }
        let comment = cell(&row, "Comments")
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("n/a"))
            .map(str::to_string);
        let mut meta: Row = vec![("participant_id".into(), id.clone())];
        meta.extend(row.into_iter().filter(|(c, _)| c != "participant_id"));
        entries.push(ParticipantEntry { id, comment, meta });
    }
    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct HctBehRow {
    #[serde(rename = "Answer", default)]
    answer: String,
    #[serde(rename = "Confidence", default)]
    confidence: String,
}

fn optional_number(cell: &str, what: &str, row: usize) -> Result<Option<f64>> {
    let value = parse_sample(cell).with_context(|| format!("{what} in trial row {row}"))?;
    Ok(value.is_finite().then_some(value))
}

/// Reported counts and confidence ratings, one row per trial in task order.
pub fn read_hct_behavior(path: &Path) -> Result<Vec<(Option<f64>, Option<f64>)>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening HCT behavior {}", path.display()))?;
    let mut trials = Vec::new();
    for (idx, row) in reader.deserialize::<HctBehRow>().enumerate() {
        let row = row.with_context(|| format!("parsing trial row {}", idx + 1))?;
        trials.push((
            optional_number(&row.answer, "Answer", idx + 1)?,
            optional_number(&row.confidence, "Confidence", idx + 1)?,
        ));
    }
    Ok(trials)
}

/// Pair detected counts with behavior rows. Short behavior tables leave the
/// remaining trials unreported; extra rows are ignored.
pub fn pair_trials(
    detected: &[usize],
    behavior: &[(Option<f64>, Option<f64>)],
) -> Vec<HctTrial> {
    detected
        .iter()
        .enumerate()
        .map(|(i, &detected)| {
            let (reported, confidence) = behavior.get(i).copied().unwrap_or((None, None));
            HctTrial {
                detected,
                reported,
                confidence,
            }
        })
        .collect()
}

/// First row of an optional single-row table, minus `participant_id`.
pub fn read_single_row(path: &Path) -> Result<Option<Row>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rows = read_rows(path)?;
    if rows.is_empty() {
        return Ok(None);
    }
    let row = rows.swap_remove(0);
    Ok(Some(
        row.into_iter()
            .filter(|(c, _)| c != "participant_id")
            .collect(),
    ))
}

/// Column names of a single-row table without `participant_id`; `None`
/// when the file is absent.
pub fn read_header(path: &Path) -> Result<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let header = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .filter(|c| *c != "participant_id")
        .map(str::to_string)
        .collect();
    Ok(Some(header))
}
