//! One participant, start to finish.
//!
//! Resting state: detect the single RS marker, crop to it, repair gaps,
//! require six minutes, then HRV and HEP over every R-peak. Heartbeat
//! counting: detect the six intervals, crop around them, count peaks per
//! interval against the reported counts, and HEP over in-interval R-peaks.

use crate::config::BatchConfig;
use crate::tables::{
    pair_trials, read_hct_behavior, read_header, read_single_row, ParticipantEntry,
    ParticipantFiles, Row,
};
use anyhow::{Context, Result};
use intero_lib::accuracy::{score_trials, CountSource, HctScores};
use intero_lib::beats::restrict_beats;
use intero_lib::crop::{
    crop_with_corrections, ensure_min_duration, rebase_events, CropCorrection, CropSpec, EventRef,
};
use intero_lib::epochs::{anchors_from_events, epoch_count_warning, extract_epochs, EpochWindow};
use intero_lib::error::{PipelineError, QualityWarning};
use intero_lib::events::{detect_checked, expect_count, find_events, onsets, Event};
use intero_lib::features::hep::amplitude_columns;
use intero_lib::features::hrv::HRV_WIDTH;
use intero_lib::features::{analyze_hep, hrv_summary, HepResult, HrvSummary};
use intero_lib::gaps::fill_gaps;
use intero_lib::io::read_recording;
use intero_lib::overrides::{Condition, Modality, ParticipantOverrides};
use intero_lib::plot::{
    figure_from_channel, figure_from_channels, figure_from_counts, figure_from_evoked,
    figure_from_peaks, figure_from_psd,
};
use intero_lib::qc::{QcCollector, QcKind};
use intero_lib::signal::{Beats, Recording};

pub const HCT_COLUMNS: [&str; 3] = ["HCT_Accuracy", "HCT_Sensibility", "HCT_Awareness"];

/// Welch segment length of the EEG spectrum panels (s).
const PSD_SEGMENT_S: f64 = 20.0;

/// Panel kinds of the cleaned-signal views of one condition.
struct SignalPanels {
    ppg: QcKind,
    eeg: QcKind,
    psd: QcKind,
}

const RS_PANELS: SignalPanels = SignalPanels {
    ppg: QcKind::RsPpg,
    eeg: QcKind::RsEeg,
    psd: QcKind::RsPsd,
};

const HCT_PANELS: SignalPanels = SignalPanels {
    ppg: QcKind::HctPpg,
    eeg: QcKind::HctEeg,
    psd: QcKind::HctPsd,
};

#[derive(Debug, Clone)]
pub struct RsResult {
    pub duration_s: f64,
    pub hrv: Option<HrvSummary>,
    pub hep: Option<HepResult>,
    pub warnings: Vec<QualityWarning>,
}

#[derive(Debug, Clone)]
pub struct HctResult {
    pub events: Vec<Event>,
    pub counts: Vec<usize>,
    pub scores: Option<HctScores>,
    pub hep: Option<HepResult>,
    pub warnings: Vec<QualityWarning>,
}

/// Everything a participant contributes to the outputs.
#[derive(Debug, Clone)]
pub struct ParticipantOutcome {
    pub id: String,
    pub record: Row,
    pub hep_rows: Vec<Row>,
    pub rs: Option<RsResult>,
    pub hct: Option<HctResult>,
    pub warnings: Vec<QualityWarning>,
}

pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

/// Runs the per-condition stages with a fixed configuration.
pub struct Pipeline<'a> {
    pub config: &'a BatchConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a BatchConfig) -> Self {
        Self { config }
    }

    fn cleaned(
        &self,
        rec: &Recording,
        events: &[Event],
        spec: &CropSpec,
        corrections: &[CropCorrection],
        overrides: &ParticipantOverrides,
        warnings: &mut Vec<QualityWarning>,
    ) -> Result<(Recording, usize, usize), PipelineError> {
        let guard = self.config.channels.guard();
        let outcome = crop_with_corrections(rec, events, spec, &guard, corrections)?;
        warnings.extend(outcome.warnings);
        let filled = fill_gaps(&outcome.recording, &self.config.fill_policies(overrides))?;
        Ok((filled, outcome.start, outcome.end))
    }

    fn hep(
        &self,
        rec: &Recording,
        beats: &Beats,
        condition: Condition,
        overrides: &ParticipantOverrides,
        warnings: &mut Vec<QualityWarning>,
    ) -> Result<Option<HepResult>, PipelineError> {
        if overrides.hep_suppressed(condition) {
            log::info!("{} HEP suppressed", condition.as_str());
            return Ok(None);
        }
        let ch = &self.config.channels;
        let hep = analyze_hep(rec, beats, &ch.eeg(), &ch.hep_extra(), &self.config.hep)?;
        log::info!(
            "{} HEP: {} epoch(s) kept, {} dropped",
            condition.as_str(),
            hep.n_epochs,
            hep.n_dropped
        );
        let expected = beats.len() - hep.n_truncated;
        warnings.extend(epoch_count_warning(hep.n_epochs, expected, condition.as_str()));
        Ok(Some(hep))
    }

    /// PPG with its peaks, EEG traces and EEG spectra of a cleaned recording.
    fn signal_panels(
        &self,
        rec: &Recording,
        kinds: &SignalPanels,
        id: &str,
        qc: &mut QcCollector,
    ) -> Result<(), PipelineError> {
        let ch = &self.config.channels;
        if rec.has_channel(&ch.ppg) {
            let peaks = if rec.has_channel(&ch.ppg_peaks) {
                rec.indicator_indices(&ch.ppg_peaks)?
            } else {
                Vec::new()
            };
            qc.add(
                kinds.ppg,
                id,
                figure_from_peaks(&ch.ppg, rec.channel(&ch.ppg)?, rec.fs(), &peaks),
            );
        }
        let eeg = ch.eeg();
        qc.add(kinds.eeg, id, figure_from_channels("EEG", rec, &eeg));
        qc.add(kinds.psd, id, figure_from_psd("EEG PSD", rec, &eeg, PSD_SEGMENT_S));
        Ok(())
    }

    pub fn run_rs(
        &self,
        rec: &Recording,
        overrides: &ParticipantOverrides,
        id: &str,
        qc: &mut QcCollector,
    ) -> Result<RsResult, PipelineError> {
        let ch = &self.config.channels;
        let cfg = &self.config.rs;
        let mut warnings = Vec::new();
        let marker = rec.channel(&ch.event)?;
        let events = detect_checked(
            marker,
            &cfg.detection.options(rec.fs()),
            overrides.rs_events.as_ref(),
            cfg.detection.expected,
            "RS",
        )?;
        qc.add(
            QcKind::RsEvents,
            id,
            figure_from_channel(&ch.event, marker, rec.fs(), &events),
        );
        let (rec, start, end) = self.cleaned(
            rec,
            &events,
            &CropSpec::event(EventRef::First),
            &overrides.rs_crop,
            overrides,
            &mut warnings,
        )?;
        log::info!("RS cropped to {start}..{end} ({:.1} s)", rec.duration());
        ensure_min_duration(&rec, cfg.min_duration_s, "RS")?;
        qc.add(
            QcKind::RsEcg,
            id,
            figure_from_channel(&ch.ecg, rec.channel(&ch.ecg)?, rec.fs(), &[]),
        );
        self.signal_panels(&rec, &RS_PANELS, id, qc)?;

        let beats = Beats::from_indices(rec.indicator_indices(&ch.r_peaks)?);
        let hrv = hrv_summary(&beats, rec.fs());
        if hrv.is_none() {
            warnings.push(QualityWarning::new(
                "RS",
                format!("{} R-peak(s), HRV not computed", beats.len()),
            ));
        }
        let hep = self.hep(&rec, &beats, Condition::RS, overrides, &mut warnings)?;
        if let Some(hep) = &hep {
            qc.add(
                QcKind::RsHep,
                id,
                figure_from_evoked(id, &hep.evoked, &ch.eeg()),
            );
        }
        Ok(RsResult {
            duration_s: rec.duration(),
            hrv,
            hep,
            warnings,
        })
    }

    /// `behavior` is the reported count and confidence per trial; without
    /// it the task is counted but not scored.
    pub fn run_hct(
        &self,
        rec: &Recording,
        behavior: Option<&[(Option<f64>, Option<f64>)]>,
        overrides: &ParticipantOverrides,
        id: &str,
        qc: &mut QcCollector,
    ) -> Result<HctResult, PipelineError> {
        let ch = &self.config.channels;
        let cfg = &self.config.hct;
        let expected = cfg.detection.expected;
        let mut warnings = Vec::new();
        let marker = rec.channel(&ch.event)?;
        let mut events = find_events(marker, &cfg.detection.options(rec.fs()));
        if let Some(correction) = &overrides.hct_events {
            events = correction.apply(events, rec.len())?;
        }
        if events.is_empty() {
            return Err(PipelineError::EventCount {
                label: "HCT".into(),
                expected,
                found: 0,
            });
        }
        qc.add(
            QcKind::HctEvents,
            id,
            figure_from_channel(&ch.event, marker, rec.fs(), &events),
        );
        let margin = rec.seconds_to_samples(cfg.margin_s);
        let (rec, start, end) = self.cleaned(
            rec,
            &events,
            &CropSpec::around_events(margin),
            &overrides.hct_crop(),
            overrides,
            &mut warnings,
        )?;
        let events = rebase_events(&events, start, end);
        expect_count(&events, expected, "HCT")?;
        log::info!("HCT cropped to {start}..{end}, intervals at {:?}", onsets(&events));
        qc.add(
            QcKind::HctEcg,
            id,
            figure_from_channel(&ch.ecg, rec.channel(&ch.ecg)?, rec.fs(), &events),
        );
        self.signal_panels(&rec, &HCT_PANELS, id, qc)?;

        let anchors = anchors_from_events(&events);
        let epochs = extract_epochs(&rec, &anchors, &EpochWindow::from_events())?;
        if let Some(epoch) = epochs.iter().find(|e| e.truncated) {
            warnings.push(QualityWarning::new(
                "HCT",
                format!("interval {} runs past the recording", epoch.index + 1),
            ));
        }
        let source = match overrides.count_source {
            CountSource::Ecg => &ch.r_peaks,
            CountSource::Ppg => &ch.ppg_peaks,
        };
        let counts = epochs
            .iter()
            .map(|e| e.count(source))
            .collect::<Result<Vec<usize>, _>>()?;
        log::info!("HCT counts ({source}): {counts:?}");

        let scores = behavior.map(|beh| {
            if beh.len() != counts.len() {
                warnings.push(QualityWarning::new(
                    "HCT",
                    format!(
                        "{} behavior row(s) for {} interval(s)",
                        beh.len(),
                        counts.len()
                    ),
                ));
            }
            let trials = pair_trials(&counts, beh);
            let reported: Vec<Option<f64>> = trials.iter().map(|t| t.reported).collect();
            qc.add(QcKind::HctCounts, id, figure_from_counts(id, &counts, &reported));
            score_trials(&trials, &overrides.exclude_trials)
        });

        let beats = restrict_beats(
            &Beats::from_indices(rec.indicator_indices(&ch.r_peaks)?),
            &events,
        );
        let hep = self.hep(&rec, &beats, Condition::HCT, overrides, &mut warnings)?;
        if let Some(hep) = &hep {
            qc.add(
                QcKind::HctHep,
                id,
                figure_from_evoked(id, &hep.evoked, &ch.eeg()),
            );
        }
        Ok(HctResult {
            events,
            counts,
            scores,
            hep,
            warnings,
        })
    }

    /// Column set of the cohort record beyond metadata and questionnaires.
    pub fn feature_columns(&self) -> Vec<String> {
        let eeg = self.config.channels.eeg();
        let mut cols: Vec<String> = amplitude_columns(&eeg)
            .into_iter()
            .map(|c| format!("RS_{c}"))
            .collect();
        cols.extend(HrvSummary::COLUMNS.iter().map(|c| c.to_string()));
        cols.extend(amplitude_columns(&eeg).into_iter().map(|c| format!("HCT_{c}")));
        cols.extend(HCT_COLUMNS.iter().map(|c| c.to_string()));
        cols
    }

    /// Cohort header for a batch: participant metadata, then every
    /// questionnaire and RS behavior column any participant provides, then
    /// the feature columns.
    pub fn record_columns(
        &self,
        participants: &[ParticipantEntry],
        root: &std::path::Path,
    ) -> Result<Vec<String>> {
        fn push_unique(cols: &mut Vec<String>, col: String) {
            if !cols.contains(&col) {
                cols.push(col);
            }
        }
        let mut cols = Vec::new();
        for entry in participants {
            for (c, _) in &entry.meta {
                push_unique(&mut cols, c.clone());
            }
        }
        let files: Vec<ParticipantFiles> = participants
            .iter()
            .map(|e| ParticipantFiles::new(root, &e.id))
            .collect();
        for f in &files {
            for c in read_header(&f.questionnaires())?.unwrap_or_default() {
                push_unique(&mut cols, c);
            }
        }
        for f in &files {
            for c in read_header(&f.behavior("RS"))?.unwrap_or_default() {
                push_unique(&mut cols, format!("RS_{c}"));
            }
        }
        for c in self.feature_columns() {
            push_unique(&mut cols, c);
        }
        Ok(cols)
    }

    /// Header of the long HEP table, matching `waveform_rows`.
    pub fn hep_columns(&self) -> Vec<String> {
        let ch = &self.config.channels;
        let mut cols: Vec<String> = ["participant_id", "Condition", "time"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        cols.extend(ch.eeg().into_iter().chain(ch.hep_extra()).map(str::to_string));
        cols
    }

    /// Full participant: tables, both conditions, record and HEP rows.
    pub fn process(
        &self,
        entry: &ParticipantEntry,
        root: &std::path::Path,
        overrides: &ParticipantOverrides,
        qc: &mut QcCollector,
    ) -> Result<ParticipantOutcome> {
        let files = ParticipantFiles::new(root, &entry.id);
        let id = entry.id.as_str();
        let mut warnings = Vec::new();
        let mut record = entry.meta.clone();

        match read_single_row(&files.questionnaires())? {
            Some(row) => record.extend(row),
            None => log::info!("{id}: no questionnaires"),
        }

        let rs = if overrides.skips(Modality::Rs) {
            log::info!("{id}: RS skipped");
            None
        } else if let Some(rec) = self.load(&files.physio("RS"))? {
            println!("  - RS");
            if let Some(row) = read_single_row(&files.behavior("RS"))? {
                record.extend(row.into_iter().map(|(c, v)| (format!("RS_{c}"), v)));
            }
            let rs = self
                .run_rs(&rec, overrides, id, qc)
                .with_context(|| format!("{id} resting state"))?;
            warnings.extend(rs.warnings.iter().cloned());
            Some(rs)
        } else {
            warnings.push(QualityWarning::new("RS", format!("{id}: no RS recording")));
            None
        };

        let hct = if overrides.skips(Modality::Hct) {
            log::info!("{id}: HCT skipped");
            None
        } else if let Some(rec) = self.load(&files.physio("HCT"))? {
            println!("  - HCT");
            let beh_path = files.behavior("HCT");
            let behavior = if beh_path.exists() {
                Some(read_hct_behavior(&beh_path)?)
            } else {
                warnings.push(QualityWarning::new("HCT", format!("{id}: no HCT behavior")));
                None
            };
            let hct = self
                .run_hct(&rec, behavior.as_deref(), overrides, id, qc)
                .with_context(|| format!("{id} heartbeat counting"))?;
            warnings.extend(hct.warnings.iter().cloned());
            Some(hct)
        } else {
            warnings.push(QualityWarning::new("HCT", format!("{id}: no HCT recording")));
            None
        };

        let outcome = assemble(self, id, record, rs, hct, warnings);
        Ok(outcome)
    }

    fn load(&self, path: &std::path::Path) -> Result<Option<Recording>> {
        if !path.exists() {
            return Ok(None);
        }
        read_recording(path, self.config.fallback_fs).map(Some)
    }
}

fn hep_amplitudes(hep: Option<&HepResult>, prefix: &str, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|col| {
            let value = hep
                .and_then(|h| h.amplitudes.iter().find(|(c, _)| c == col))
                .and_then(|(_, v)| *v);
            (format!("{prefix}_{col}"), format_value(value))
        })
        .collect()
}

fn waveform_rows(id: &str, condition: Condition, hep: &HepResult) -> Vec<Row> {
    let evoked = &hep.evoked;
    evoked
        .times()
        .into_iter()
        .enumerate()
        .map(|(i, t)| {
            let mut row: Row = vec![
                ("participant_id".into(), id.to_string()),
                ("Condition".into(), condition.label().to_string()),
                ("time".into(), t.to_string()),
            ];
            row.extend(
                evoked
                    .names
                    .iter()
                    .zip(&evoked.data)
                    .map(|(name, data)| (name.clone(), format_value(Some(data[i])))),
            );
            row
        })
        .collect()
}

fn assemble(
    pipeline: &Pipeline<'_>,
    id: &str,
    mut record: Row,
    rs: Option<RsResult>,
    hct: Option<HctResult>,
    warnings: Vec<QualityWarning>,
) -> ParticipantOutcome {
    let eeg = pipeline.config.channels.eeg();
    let amp_cols = amplitude_columns(&eeg);
    let mut hep_rows = Vec::new();

    let rs_hep = rs.as_ref().and_then(|r| r.hep.as_ref());
    record.extend(hep_amplitudes(rs_hep, "RS", &amp_cols));
    if let Some(hep) = rs_hep {
        hep_rows.extend(waveform_rows(id, Condition::RS, hep));
    }
    let hrv = rs.as_ref().and_then(|r| r.hrv);
    let hrv_values = hrv.map(|h| h.values()).unwrap_or([None; HRV_WIDTH]);
    record.extend(
        HrvSummary::COLUMNS
            .iter()
            .zip(hrv_values)
            .map(|(c, v)| (c.to_string(), format_value(v))),
    );

    let hct_hep = hct.as_ref().and_then(|h| h.hep.as_ref());
    record.extend(hep_amplitudes(hct_hep, "HCT", &amp_cols));
    if let Some(hep) = hct_hep {
        hep_rows.extend(waveform_rows(id, Condition::HCT, hep));
    }
    let scores = hct.as_ref().and_then(|h| h.scores.as_ref());
    let summary = [
        scores.and_then(|s| s.accuracy),
        scores.and_then(|s| s.sensibility),
        scores.and_then(|s| s.awareness),
    ];
    record.extend(
        HCT_COLUMNS
            .iter()
            .zip(summary)
            .map(|(c, v)| (c.to_string(), format_value(v))),
    );

    ParticipantOutcome {
        id: id.to_string(),
        record,
        hep_rows,
        rs,
        hct,
        warnings,
    }
}
