//! Checkpointed output tables.
//!
//! The cohort table gains one row per participant, flushed immediately. Its
//! header is the full column set of the batch, fixed before the first write,
//! so a participant lacking an optional table only leaves cells empty. Rows
//! already on disk are never rewritten, so re-running a batch leaves
//! completed participants byte-identical.

use crate::tables::{cell, Row};
use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const KEY: &str = "participant_id";

/// Append-only CSV keyed by `participant_id`.
#[derive(Debug)]
pub struct CsvTable {
    path: PathBuf,
    header: Vec<String>,
    /// Whether the header is already on disk.
    written: bool,
    ids: Vec<String>,
}

impl CsvTable {
    /// Open (or lazily create) the table with the given columns, indexing
    /// the ids already present. An existing file keeps its own column order
    /// but must carry every requested column.
    pub fn open(path: &Path, columns: Vec<String>) -> Result<Self> {
        let mut table = Self {
            path: path.to_path_buf(),
            header: columns,
            written: false,
            ids: Vec::new(),
        };
        if !table.header.iter().any(|c| c == KEY) {
            table.header.insert(0, KEY.to_string());
        }
        if !path.exists() || fs::metadata(path)?.len() == 0 {
            return Ok(table);
        }
        let mut reader = ReaderBuilder::new()
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let key = header
            .iter()
            .position(|h| h == KEY)
            .with_context(|| format!("{} has no {KEY} column", path.display()))?;
        let missing: Vec<&str> = table
            .header
            .iter()
            .filter(|c| !header.contains(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            bail!(
                "{} lacks column(s) {missing:?}; move it aside to rebuild it",
                path.display()
            );
        }
        for record in reader.records() {
            let record = record.with_context(|| format!("reading {}", path.display()))?;
            if let Some(id) = record.get(key) {
                table.ids.push(id.to_string());
            }
        }
        table.header = header;
        table.written = true;
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    /// Distinct ids in first-seen order.
    pub fn ids(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Append rows and flush, writing the header first on a new file. A
    /// row with a column outside the header is rejected before anything is
    /// written.
    pub fn append(&mut self, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for row in rows {
            let unknown: Vec<&str> = row
                .iter()
                .filter(|(c, _)| !self.header.contains(c))
                .map(|(c, _)| c.as_str())
                .collect();
            if !unknown.is_empty() {
                bail!(
                    "{}: columns {unknown:?} not in header",
                    self.path.display()
                );
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {} for append", self.path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(&mut file);
        if !self.written {
            writer.write_record(&self.header)?;
            self.written = true;
        }
        for row in rows {
            writer.write_record(self.header.iter().map(|h| cell(row, h).unwrap_or("")))?;
            if let Some(id) = cell(row, KEY) {
                self.ids.push(id.to_string());
            }
        }
        writer.flush()?;
        drop(writer);
        file.flush()?;
        Ok(())
    }

    /// Rewrite the table keeping only rows whose id is in `keep`. Returns the
    /// number of rows removed.
    pub fn retain(&mut self, keep: &BTreeSet<String>) -> Result<usize> {
        if !self.written {
            return Ok(0);
        }
        let header = self.header.clone();
        let key = header.iter().position(|h| h == KEY).unwrap_or(0);
        let mut reader = ReaderBuilder::new()
            .from_path(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let mut removed = 0;
        {
            let mut writer = WriterBuilder::new().from_writer(tmp.as_file_mut());
            writer.write_record(&header)?;
            for record in reader.records() {
                let record = record?;
                if record.get(key).is_some_and(|id| keep.contains(id)) {
                    writer.write_record(&record)?;
                } else {
                    removed += 1;
                }
            }
            writer.flush()?;
        }
        if removed > 0 {
            tmp.persist(&self.path)
                .with_context(|| format!("replacing {}", self.path.display()))?;
            self.ids.retain(|id| keep.contains(id));
        }
        Ok(removed)
    }
}

/// The two batch outputs.
#[derive(Debug)]
pub struct Outputs {
    pub cohort: CsvTable,
    pub hep: CsvTable,
}

impl Outputs {
    /// Open both tables and purge HEP rows of participants missing from the
    /// cohort (a run that stopped between the two writes).
    pub fn open(
        out_dir: &Path,
        cohort: (&str, Vec<String>),
        hep: (&str, Vec<String>),
    ) -> Result<Self> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("creating {}", out_dir.display()))?;
        let cohort = CsvTable::open(&out_dir.join(cohort.0), cohort.1)?;
        let mut hep = CsvTable::open(&out_dir.join(hep.0), hep.1)?;
        let done: BTreeSet<String> = cohort.ids().into_iter().map(str::to_string).collect();
        let purged = hep.retain(&done)?;
        if purged > 0 {
            log::warn!("purged {purged} orphan HEP row(s) from {}", hep.path().display());
        }
        Ok(Self { cohort, hep })
    }

    pub fn is_complete(&self, id: &str) -> bool {
        self.cohort.contains(id)
    }

    /// HEP rows first, then the cohort row.
    pub fn commit(&mut self, hep_rows: &[Row], record: &Row) -> Result<()> {
        self.hep.append(hep_rows)?;
        self.cohort.append(std::slice::from_ref(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> Row {
        cells
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_string()))
            .collect()
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn missing_cells_are_left_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.csv");
        let mut table = CsvTable::open(&path, columns(&["participant_id", "A", "B", "C"])).unwrap();
        table
            .append(&[row(&[("participant_id", "sub-01"), ("B", "2")])])
            .unwrap();
        table
            .append(&[row(&[("C", "9"), ("participant_id", "sub-02"), ("A", "1")])])
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "participant_id,A,B,C\nsub-01,,2,\nsub-02,1,,9\n");
        assert!(table.contains("sub-02"));
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.csv");
        let mut table = CsvTable::open(&path, columns(&["participant_id", "A"])).unwrap();
        let err = table
            .append(&[row(&[("participant_id", "sub-01"), ("Z", "1")])])
            .unwrap_err();
        assert!(err.to_string().contains("\"Z\""), "{err}");
        assert!(!path.exists());
    }

    #[test]
    fn existing_file_without_a_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.csv");
        fs::write(&path, "participant_id,A\nsub-01,1\n").unwrap();
        let err = CsvTable::open(&path, columns(&["participant_id", "A", "B"])).unwrap_err();
        assert!(err.to_string().contains("lacks column(s) [\"B\"]"), "{err}");
    }

    #[test]
    fn reopen_indexes_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.csv");
        fs::write(&path, "participant_id,B,A\nsub-01,2,1\n").unwrap();
        let mut table = CsvTable::open(&path, columns(&["participant_id", "A"])).unwrap();
        assert!(table.contains("sub-01"));
        assert!(!table.contains("sub-02"));
        table
            .append(&[row(&[("participant_id", "sub-02"), ("A", "5")])])
            .unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "participant_id,B,A\nsub-01,2,1\nsub-02,,5\n"
        );
    }

    #[test]
    fn orphan_hep_rows_are_purged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cohort.csv"), "participant_id,X\nsub-01,1\n").unwrap();
        fs::write(
            dir.path().join("hep.csv"),
            "participant_id,Condition,time\nsub-01,HCT,0.0\nsub-02,HCT,0.0\nsub-02,HCT,0.1\n",
        )
        .unwrap();
        let outputs = Outputs::open(
            dir.path(),
            ("cohort.csv", columns(&["participant_id", "X"])),
            ("hep.csv", columns(&["participant_id", "Condition", "time"])),
        )
        .unwrap();
        assert_eq!(outputs.hep.ids(), vec!["sub-01"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("hep.csv")).unwrap(),
            "participant_id,Condition,time\nsub-01,HCT,0.0\n"
        );
    }

    #[test]
    fn clean_tables_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cohort.csv"), "participant_id\nsub-01\n").unwrap();
        fs::write(dir.path().join("hep.csv"), "participant_id,time\nsub-01,0\n").unwrap();
        let outputs = Outputs::open(
            dir.path(),
            ("cohort.csv", columns(&["participant_id"])),
            ("hep.csv", columns(&["participant_id", "time"])),
        )
        .unwrap();
        assert!(outputs.is_complete("sub-01"));
        assert_eq!(
            fs::read_to_string(dir.path().join("hep.csv")).unwrap(),
            "participant_id,time\nsub-01,0\n"
        );
    }

    #[test]
    fn new_table_without_rows_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let mut outputs = Outputs::open(
            dir.path(),
            ("cohort.csv", columns(&["participant_id", "A"])),
            ("hep.csv", columns(&["participant_id", "time"])),
        )
        .unwrap();
        assert!(!dir.path().join("hep.csv").exists());
        outputs
            .commit(&[], &row(&[("participant_id", "sub-01"), ("A", "1")]))
            .unwrap();
        assert!(!dir.path().join("hep.csv").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("cohort.csv")).unwrap(),
            "participant_id,A\nsub-01,1\n"
        );
    }
}
