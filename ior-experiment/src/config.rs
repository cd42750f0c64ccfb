use std::path::{Path, PathBuf};

use ior_core::{BlockCondition, Layout, PlaceholderId, SaccadeLoc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::ResponseKey;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Phase durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub fixation_ms: u64,
    pub cue_ms: u64,
    /// Cue offset to saccade signal onset.
    pub cue_signal_isi_ms: u64,
    /// Signal onset to the moment a missing saccade aborts the trial.
    pub saccade_timeout_ms: u64,
    pub saccade_target_soa_ms: u64,
    /// Measured from saccade detection, so it includes the SOA.
    pub response_timeout_ms: u64,
    pub feedback_ms: u64,
    pub inter_trial_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fixation_ms: 500,
            cue_ms: 300,
            cue_signal_isi_ms: 300,
            saccade_timeout_ms: 600,
            saccade_target_soa_ms: 300,
            response_timeout_ms: 1800,
            feedback_ms: 1000,
            inter_trial_interval_ms: 1000,
        }
    }
}

/// Stimulus geometry in degrees of visual angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub px_per_degree: f32,
    pub offset_deg: f32,
    pub boundary_radius_deg: f32,
    pub placeholder_deg: f32,
    pub fixation_deg: f32,
    pub target_deg: f32,
    pub uncued_stroke_deg: f32,
    pub cued_stroke_deg: f32,
    pub text_px: f32,
    /// TrueType font for on-screen messages. Without one, messages are
    /// only logged.
    pub font_path: Option<PathBuf>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            px_per_degree: 30.0,
            offset_deg: 6.0,
            boundary_radius_deg: 1.5,
            placeholder_deg: 1.5,
            fixation_deg: 1.5,
            target_deg: 0.75,
            uncued_stroke_deg: 0.1,
            cued_stroke_deg: 0.3,
            text_px: 28.0,
            font_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub participant_id: String,
    /// Block conditions in running order.
    pub blocks: Vec<BlockCondition>,
    /// Copies of the full factorial design per block.
    pub repetitions: usize,
    pub saccade_locs: Vec<SaccadeLoc>,
    pub cue_locs: Vec<u8>,
    pub target_locs: Vec<u8>,
    pub response_key: ResponseKey,
    pub results_path: PathBuf,
    pub error_log_path: PathBuf,
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            participant_id: "anonymous".into(),
            blocks: vec![BlockCondition::Pro, BlockCondition::Anti],
            repetitions: 1,
            saccade_locs: SaccadeLoc::ALL.to_vec(),
            cue_locs: vec![3, 4, 5, 6],
            target_locs: vec![1, 2, 3, 4, 5, 6],
            response_key: ResponseKey::Space,
            results_path: PathBuf::from("retino_ior_results.json"),
            error_log_path: PathBuf::from("retino_ior_errors.jsonl"),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub timing: TimingConfig,
    pub display: DisplayConfig,
    pub session: SessionConfig,
}

impl ExperimentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        for (name, ms) in [
            ("fixation_ms", t.fixation_ms),
            ("cue_ms", t.cue_ms),
            ("saccade_timeout_ms", t.saccade_timeout_ms),
            ("response_timeout_ms", t.response_timeout_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::Invalid(format!("timing.{name} must be positive")));
            }
        }
        if t.response_timeout_ms <= t.saccade_target_soa_ms {
            return Err(ConfigError::Invalid(
                "timing.response_timeout_ms must exceed timing.saccade_target_soa_ms".into(),
            ));
        }

        let d = &self.display;
        if !(d.px_per_degree > 0.0) || !(d.boundary_radius_deg > 0.0) {
            return Err(ConfigError::Invalid(
                "display.px_per_degree and display.boundary_radius_deg must be positive".into(),
            ));
        }

        let s = &self.session;
        if s.blocks.is_empty() || s.repetitions == 0 {
            return Err(ConfigError::Invalid(
                "session needs at least one block and one repetition".into(),
            ));
        }
        if s.saccade_locs.is_empty() || s.cue_locs.is_empty() || s.target_locs.is_empty() {
            return Err(ConfigError::Invalid("session factor lists must be non-empty".into()));
        }
        if let Some(bad) = s.cue_locs.iter().find(|c| PlaceholderId::new(**c).is_none()) {
            return Err(ConfigError::Invalid(format!(
                "session.cue_locs contains {bad}, expected 1..=8"
            )));
        }
        for loc in &s.saccade_locs {
            let shift = if *loc == SaccadeLoc::Lower { 2 } else { 0 };
            if let Some(bad) = s
                .target_locs
                .iter()
                .find(|t| t.checked_add(shift).and_then(PlaceholderId::new).is_none())
            {
                return Err(ConfigError::Invalid(format!(
                    "session.target_locs contains {bad}, which has no placeholder for {loc} saccades"
                )));
            }
        }
        Ok(())
    }

    pub fn layout(&self, width: u32, height: u32) -> Layout {
        let mut layout = Layout::new(width, height, self.display.px_per_degree);
        layout.offset_deg = self.display.offset_deg;
        layout.boundary_radius_deg = self.display.boundary_radius_deg;
        layout
    }
}
