//! Device access contract used by the stream acquirer

use super::media::MediaStreamHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processing a capture backend may apply before we see the samples.
///
/// Visualisation wants the raw signal, so everything defaults to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl AudioConstraints {
    /// True when no processing is requested
    pub fn is_raw(&self) -> bool {
        !self.echo_cancellation && !self.noise_suppression && !self.auto_gain_control
    }
}

/// Constraints for a display / system audio capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConstraints {
    pub audio: AudioConstraints,

    /// Display capture contracts require video even when only audio is used
    pub video: bool,
}

impl DisplayConstraints {
    pub fn audio_only_use(audio: AudioConstraints) -> Self {
        Self { audio, video: true }
    }
}

/// Device access errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("{0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Source of live media streams.
///
/// Both calls may suspend while the user answers a permission prompt or the
/// backend opens a device.
#[allow(async_fn_in_trait)]
pub trait MediaDevices {
    /// Open an input (microphone) stream
    async fn get_user_media(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<MediaStreamHandle, DeviceError>;

    /// Open a display / system audio stream
    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStreamHandle, DeviceError>;
}
