//! Audio Features Library
//!
//! Captures live microphone and/or system audio, runs it through a
//! Web-Audio-style analyser, and publishes per-frame waveform, spectrum and
//! bass / mid / treble levels for audio-reactive renderers.

pub mod audio;
pub mod config;
pub mod monitor;
pub mod pipeline;
pub mod state;

#[cfg(test)]
mod test_support;

pub use audio::CaptureSource;
pub use config::PipelineConfig;
pub use pipeline::{FeatureFrame, LifecycleController};
pub use state::LifecycleState;
