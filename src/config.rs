//! Pipeline configuration

use crate::audio::{AnalyserConfig, AudioConstraints};
use crate::pipeline::BandSplit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything the capture pipeline is configured with.
///
/// Passed explicitly into the controller at construction; nothing reads
/// ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analyser: AnalyserConfig,
    pub bands: BandSplit,
    pub constraints: AudioConstraints,
    pub frames: FrameConfig,
    pub devices: DeviceSelection,

    /// Multiplier consumers apply to band values
    pub intensity: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analyser: AnalyserConfig::default(),
            bands: BandSplit::default(),
            constraints: AudioConstraints::default(),
            frames: FrameConfig::default(),
            devices: DeviceSelection::default(),
            intensity: 1.0,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analyser
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.bands.validate().map_err(ConfigError::Invalid)?;
        if self.frames.target_fps == 0 {
            return Err(ConfigError::Invalid("target_fps must be at least 1".to_string()));
        }
        if !self.intensity.is_finite() || self.intensity < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "intensity must be a non-negative number, got {}",
                self.intensity
            )));
        }
        Ok(())
    }
}

/// Frame pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// 15, 30 or 60 are typical; 60 and above follow the display cadence
    pub target_fps: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { target_fps: 60 }
    }
}

impl FrameConfig {
    /// Extra delay between frames, zero when running at display cadence
    pub fn frame_delay(&self) -> Duration {
        if self.target_fps >= 60 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
        }
    }
}

/// Optional device names overriding the host defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    pub microphone: Option<String>,
    pub system: Option<String>,
}
