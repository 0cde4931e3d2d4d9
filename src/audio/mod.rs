//! Audio capture primitives and the analysis engine
//!
//! Everything the feature pipeline treats as "the platform" lives here:
//! tracks and streams, device access, the cpal capture backend and the
//! analyser engine.

mod capture;
pub mod devices;
pub mod engine;
mod fft;
pub mod media;
mod sources;

pub use capture::CpalDevices;
pub use devices::{AudioConstraints, DeviceError, DisplayConstraints, MediaDevices};
pub use engine::{AnalyserNode, AudioContext, ContextState, EngineError, MediaStreamSourceNode, NodeId};
pub use fft::SpectrumAnalyser;
pub use media::{AudioBuffer, MediaStreamHandle, MediaTrack, SampleTap, StreamOrigin, TrackKind, TrackState};
pub use sources::{list_sources, CaptureSource, DeviceInfo, DeviceKind, SourceError};

use serde::{Deserialize, Serialize};

/// Transform size used by the analyser
pub const FFT_SIZE: usize = 2048;

/// Exponential smoothing applied by the analyser between render quanta
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

/// Sample rate assumed until a backend reports the real one
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Analyser node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    /// FFT window size (power of two, 32..=32768)
    pub fft_size: usize,

    /// Smoothing between frames (0 = none, 1 = frozen)
    pub smoothing_time_constant: f32,

    /// Magnitude mapped to byte 0
    pub min_decibels: f32,

    /// Magnitude mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: FFT_SIZE,
            smoothing_time_constant: SMOOTHING_TIME_CONSTANT,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    /// Number of frequency bins the analyser produces
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Check the same constraints a Web Audio analyser enforces
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(32..=32768).contains(&self.fft_size) || !self.fft_size.is_power_of_two() {
            return Err(EngineError::InvalidFftSize(self.fft_size));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(EngineError::InvalidSmoothing(self.smoothing_time_constant));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(EngineError::InvalidDecibelRange {
                min: self.min_decibels,
                max: self.max_decibels,
            });
        }
        Ok(())
    }
}
