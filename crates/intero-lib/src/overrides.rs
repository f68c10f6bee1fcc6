//! Per-participant exception table.
//!
//! Recordings with known acquisition problems carry fixes keyed by
//! participant id. The pipeline consults the table at fixed points: event
//! counting, crop boundaries, fill direction, count source, trial exclusion
//! and modality skipping. A participant absent from the table gets defaults.
//!
//! ```toml
//! [sub-13]
//! hct_start = 2178
//! fill = { PPG_Muse = "backward" }
//!
//! [sub-16.hct_events]
//! kind = "drop_last"
//! count = 1
//! ```

use crate::accuracy::CountSource;
use crate::crop::CropCorrection;
use crate::events::EventCorrection;
use crate::gaps::FillDirection;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Rs,
    Hct,
    Hep,
}

/// Task condition a HEP average belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Condition {
    RS,
    HCT,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::RS => "RS",
            Condition::HCT => "HCT",
        }
    }

    /// Name used in the HEP waveform table.
    pub fn label(self) -> &'static str {
        match self {
            Condition::RS => "RestingState",
            Condition::HCT => "HCT",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticipantOverrides {
    pub rs_events: Option<EventCorrection>,
    pub hct_events: Option<EventCorrection>,
    /// Explicit HCT crop start sample, margin still applied.
    pub hct_start: Option<usize>,
    pub rs_crop: Vec<CropCorrection>,
    pub fill: BTreeMap<String, FillDirection>,
    pub count_source: CountSource,
    /// 0-based HCT trials left out of the scores.
    pub exclude_trials: Vec<usize>,
    pub suppress_hep: Vec<Condition>,
    pub skip: Vec<Modality>,
}

impl ParticipantOverrides {
    pub fn skips(&self, modality: Modality) -> bool {
        self.skip.contains(&modality)
    }

    pub fn hep_suppressed(&self, condition: Condition) -> bool {
        self.skips(Modality::Hep) || self.suppress_hep.contains(&condition)
    }

    /// HCT crop corrections derived from the start override.
    pub fn hct_crop(&self) -> Vec<CropCorrection> {
        self.hct_start
            .map(|sample| vec![CropCorrection::StartAt { sample }])
            .unwrap_or_default()
    }

    pub fn fill_direction(&self, channel: &str, default: FillDirection) -> FillDirection {
        self.fill.get(channel).copied().unwrap_or(default)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideTable {
    pub participants: BTreeMap<String, ParticipantOverrides>,
}

impl OverrideTable {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid override table")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Overrides for `participant`, defaults when absent.
    pub fn get(&self, participant: &str) -> ParticipantOverrides {
        self.participants
            .get(participant)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    const TABLE: &str = r#"
[sub-09]
count_source = "ppg"

[sub-11]
exclude_trials = [0, 1, 2]
suppress_hep = ["HCT"]

[sub-13]
hct_start = 2178
fill = { PPG_Muse = "backward" }

[sub-16.hct_events]
kind = "drop_last"
count = 1

[sub-20]
skip = ["rs"]
rs_events = { kind = "replace", events = [{ onset = 120, duration = 900 }] }

[[sub-21.rs_crop]]
kind = "truncate_at_first_gap"
channel = "AF7"

[[sub-21.rs_crop]]
kind = "start_after_last_gap"
channel = "ECG"
search_limit = 800000
"#;

    #[test]
    fn parses_every_extension_point() {
        let table = OverrideTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.get("sub-09").count_source, CountSource::Ppg);
        assert_eq!(table.get("sub-11").exclude_trials, vec![0, 1, 2]);
        assert!(table.get("sub-11").hep_suppressed(Condition::HCT));
        assert!(!table.get("sub-11").hep_suppressed(Condition::RS));

        let s13 = table.get("sub-13");
        assert_eq!(s13.hct_crop(), vec![CropCorrection::StartAt { sample: 2178 }]);
        assert_eq!(
            s13.fill_direction("PPG_Muse", FillDirection::Forward),
            FillDirection::Backward
        );
        assert_eq!(
            s13.fill_direction("ECG", FillDirection::Forward),
            FillDirection::Forward
        );

        assert_eq!(
            table.get("sub-16").hct_events,
            Some(EventCorrection::DropLast { count: 1 })
        );
        let s20 = table.get("sub-20");
        assert!(s20.skips(Modality::Rs));
        assert_eq!(
            s20.rs_events,
            Some(EventCorrection::Replace {
                events: vec![Event::new(120, 900)]
            })
        );
        assert_eq!(table.get("sub-21").rs_crop.len(), 2);
    }

    #[test]
    fn unknown_participant_gets_defaults() {
        let table = OverrideTable::parse(TABLE).unwrap();
        let none = table.get("sub-99");
        assert_eq!(none, ParticipantOverrides::default());
        assert_eq!(none.count_source, CountSource::Ecg);
        assert!(none.hct_crop().is_empty());
    }

    #[test]
    fn typos_are_rejected() {
        assert!(OverrideTable::parse("[sub-01]\nexclude_trial = [1]\n").is_err());
    }

    #[test]
    fn empty_table_is_valid() {
        assert!(OverrideTable::parse("").unwrap().is_empty());
    }
}
