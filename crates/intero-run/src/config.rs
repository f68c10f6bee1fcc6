//! Batch configuration.
//!
//! Every field has a default matching the recording setup of the study
//! (photosensor on `PHOTO`, Muse EEG `AF7`/`AF8`, chest ECG, Muse PPG), so an
//! empty TOML file is a valid configuration.

use anyhow::{Context, Result};
use intero_lib::events::{EventOptions, Polarity, Threshold};
use intero_lib::features::HepOptions;
use intero_lib::gaps::{ChannelPolicy, FillDirection};
use intero_lib::overrides::ParticipantOverrides;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub event: String,
    pub ecg: String,
    pub ppg: String,
    pub eeg: Vec<String>,
    pub r_peaks: String,
    pub ppg_peaks: String,
    /// Channels whose leading gaps push the crop start forward.
    pub guard: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event: "PHOTO".into(),
            ecg: "ECG".into(),
            ppg: "PPG_Muse".into(),
            eeg: vec!["AF7".into(), "AF8".into()],
            r_peaks: "ECG_R_Peaks".into(),
            ppg_peaks: "PPG_Peaks".into(),
            guard: vec!["AF7".into(), "ECG".into(), "PPG_Muse".into()],
        }
    }
}

impl ChannelConfig {
    pub fn eeg(&self) -> Vec<&str> {
        self.eeg.iter().map(String::as_str).collect()
    }

    pub fn guard(&self) -> Vec<&str> {
        self.guard.iter().map(String::as_str).collect()
    }

    /// Channels averaged next to the EEG in the HEP waveform table.
    pub fn hep_extra(&self) -> Vec<&str> {
        vec![self.ecg.as_str(), self.ppg.as_str()]
    }
}

/// Marker detection settings, durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    #[serde(default = "default_polarity")]
    pub polarity: Polarity,
    #[serde(default = "default_threshold")]
    pub threshold: Threshold,
    pub duration_min_s: f64,
    #[serde(default)]
    pub duration_max_s: Option<f64>,
    #[serde(default)]
    pub inter_min_s: f64,
    pub expected: usize,
}

fn default_polarity() -> Polarity {
    Polarity::Below
}

fn default_threshold() -> Threshold {
    Threshold::Auto
}

impl DetectionConfig {
    pub fn options(&self, fs: f64) -> EventOptions {
        let samples = |s: f64| (s * fs).round().max(0.0) as usize;
        EventOptions {
            polarity: self.polarity,
            threshold: self.threshold,
            duration_min: samples(self.duration_min_s).max(1),
            duration_max: self.duration_max_s.map(samples),
            inter_min: samples(self.inter_min_s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RsConfig {
    pub detection: DetectionConfig,
    /// Shortest usable resting-state segment.
    pub min_duration_s: f64,
}

impl Default for RsConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig {
                polarity: Polarity::Below,
                threshold: Threshold::Auto,
                duration_min_s: 5.0,
                duration_max_s: None,
                inter_min_s: 0.0,
                expected: 1,
            },
            min_duration_s: 360.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HctConfig {
    pub detection: DetectionConfig,
    /// Padding kept before the first and after the last interval.
    pub margin_s: f64,
}

impl Default for HctConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig {
                polarity: Polarity::Below,
                threshold: Threshold::Auto,
                duration_min_s: 7.5,
                duration_max_s: None,
                inter_min_s: 0.0,
                expected: 6,
            },
            margin_s: 1.0,
        }
    }
}

/// Per-channel missing-data policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillRule {
    pub channel: String,
    pub policy: ChannelPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub channels: ChannelConfig,
    pub rs: RsConfig,
    pub hct: HctConfig,
    pub hep: HepOptions,
    /// Explicit fill rules; derived from `channels` when absent.
    pub fill: Option<Vec<FillRule>>,
    /// Rate used when a recording has no sidecar.
    pub fallback_fs: Option<f64>,
    pub cohort_file: String,
    pub hep_file: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            channels: ChannelConfig::default(),
            rs: RsConfig::default(),
            hct: HctConfig::default(),
            hep: HepOptions::default(),
            fill: None,
            fallback_fs: None,
            cohort_file: "data_participants.csv".into(),
            hep_file: "data_hep.csv".into(),
        }
    }
}

impl BatchConfig {
    /// Configured fill rules, or strict ECG and forward-filled PPG on the
    /// configured channel names.
    pub fn fill_rules(&self) -> Vec<FillRule> {
        if let Some(rules) = &self.fill {
            return rules.clone();
        }
        vec![
            FillRule {
                channel: self.channels.ecg.clone(),
                policy: ChannelPolicy::Strict,
            },
            FillRule {
                channel: self.channels.ppg.clone(),
                policy: ChannelPolicy::Tolerant(FillDirection::Forward),
            },
        ]
    }

    /// Fill policies with the participant's direction overrides applied. An
    /// override on a channel without a rule makes it tolerant.
    pub fn fill_policies(
        &self,
        overrides: &ParticipantOverrides,
    ) -> Vec<(String, ChannelPolicy)> {
        let mut out: Vec<(String, ChannelPolicy)> = self
            .fill_rules()
            .into_iter()
            .map(|rule| {
                let policy = match (rule.policy, overrides.fill.get(&rule.channel)) {
                    (_, Some(dir)) => ChannelPolicy::Tolerant(*dir),
                    (policy, None) => policy,
                };
                (rule.channel, policy)
            })
            .collect();
        for (channel, dir) in &overrides.fill {
            if !out.iter().any(|(name, _)| name == channel) {
                out.push((channel.clone(), ChannelPolicy::Tolerant(*dir)));
            }
        }
        out
    }
}

pub fn read_config(path: &Path) -> Result<BatchConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: BatchConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: BatchConfig = toml::from_str("").unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.hct.detection.expected, 6);
        assert_eq!(config.rs.min_duration_s, 360.0);
    }

    #[test]
    fn detection_converts_to_samples() {
        let opts = HctConfig::default().detection.options(2000.0);
        assert_eq!(opts.duration_min, 15_000);
        assert_eq!(opts.polarity, Polarity::Below);
        let rs = RsConfig::default().detection.options(500.0);
        assert_eq!(rs.duration_min, 2500);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: BatchConfig = toml::from_str(
            r#"
fallback_fs = 250.0

[hct]
margin_s = 0.5

[hct.detection]
duration_min_s = 10.0
expected = 4

[[fill]]
channel = "ECG"
policy = { tolerant = "backward" }
"#,
        )
        .unwrap();
        assert_eq!(config.fallback_fs, Some(250.0));
        assert_eq!(config.hct.margin_s, 0.5);
        assert_eq!(config.hct.detection.expected, 4);
        assert_eq!(config.hct.detection.threshold, Threshold::Auto);
        assert_eq!(config.rs, RsConfig::default());
        assert_eq!(
            config.fill_rules(),
            vec![FillRule {
                channel: "ECG".into(),
                policy: ChannelPolicy::Tolerant(FillDirection::Backward),
            }]
        );
    }

    #[test]
    fn overrides_change_fill_direction() {
        let config = BatchConfig::default();
        let mut overrides = ParticipantOverrides::default();
        overrides
            .fill
            .insert("PPG_Muse".into(), FillDirection::Backward);
        overrides.fill.insert("AF7".into(), FillDirection::Forward);
        let policies = config.fill_policies(&overrides);
        assert_eq!(policies[0], ("ECG".into(), ChannelPolicy::Strict));
        assert_eq!(
            policies[1],
            (
                "PPG_Muse".into(),
                ChannelPolicy::Tolerant(FillDirection::Backward)
            )
        );
        assert_eq!(
            policies[2],
            ("AF7".into(), ChannelPolicy::Tolerant(FillDirection::Forward))
        );
    }

    #[test]
    fn default_fill_follows_renamed_channels() {
        let config: BatchConfig = toml::from_str(
            r#"
[channels]
ecg = "EKG"
ppg = "PPG_Finger"
"#,
        )
        .unwrap();
        assert_eq!(config.fill, None);
        let policies = config.fill_policies(&ParticipantOverrides::default());
        assert_eq!(
            policies,
            vec![
                ("EKG".into(), ChannelPolicy::Strict),
                (
                    "PPG_Finger".into(),
                    ChannelPolicy::Tolerant(FillDirection::Forward)
                ),
            ]
        );
    }
}
