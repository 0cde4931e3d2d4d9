//! Stream acquisition for the requested capture source

use crate::audio::{
    AudioConstraints, CaptureSource, DeviceError, DisplayConstraints, MediaDevices,
    MediaStreamHandle, StreamOrigin,
};
use thiserror::Error;

/// What the host asked to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub source: CaptureSource,
}

impl CaptureRequest {
    pub fn new(source: CaptureSource) -> Self {
        Self { source }
    }
}

fn no_audio_track_message(origin: &StreamOrigin) -> &'static str {
    match origin {
        StreamOrigin::Microphone => {
            "No microphone audio track available. Please check your microphone permissions."
        }
        StreamOrigin::Display => {
            "No system audio track available. Make sure to check 'Share audio' when selecting a tab or window."
        }
    }
}

/// Acquisition failures, worded for the user
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("{message}")]
    PermissionDenied { origin: StreamOrigin, message: String },

    #[error("{}", no_audio_track_message(.0))]
    NoAudioTrack(StreamOrigin),

    #[error("Failed to access {origin}: {message}")]
    Device { origin: StreamOrigin, message: String },

    /// A later stream failed after earlier ones were acquired and released
    #[error("{cause}")]
    Partial {
        rolled_back: usize,
        cause: Box<AcquisitionError>,
    },
}

impl AcquisitionError {
    fn from_device(origin: StreamOrigin, err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied(message) => {
                AcquisitionError::PermissionDenied { origin, message }
            }
            other => AcquisitionError::Device {
                origin,
                message: other.to_string(),
            },
        }
    }

    /// The stream whose acquisition failed
    pub fn origin(&self) -> StreamOrigin {
        match self {
            AcquisitionError::PermissionDenied { origin, .. } => *origin,
            AcquisitionError::NoAudioTrack(origin) => *origin,
            AcquisitionError::Device { origin, .. } => *origin,
            AcquisitionError::Partial { cause, .. } => cause.origin(),
        }
    }
}

/// Requests raw media streams from a [`MediaDevices`] implementation
pub struct StreamAcquirer<'a, D> {
    devices: &'a D,
    constraints: AudioConstraints,
}

impl<'a, D: MediaDevices> StreamAcquirer<'a, D> {
    pub fn new(devices: &'a D, constraints: AudioConstraints) -> Self {
        Self {
            devices,
            constraints,
        }
    }

    /// Acquire every stream `request` needs, microphone first.
    ///
    /// `on_ended` is registered on the audio track each stream contributes to
    /// the graph and receives that track's id. On failure no acquired track is
    /// left live, and the same holds if the returned future is dropped while a
    /// later request is still pending.
    pub async fn acquire<F>(
        &self,
        request: CaptureRequest,
        on_ended: F,
    ) -> Result<Vec<MediaStreamHandle>, AcquisitionError>
    where
        F: Fn(u64) + Clone + Send + Sync + 'static,
    {
        let mut acquired = Acquired::with_capacity(request.source.stream_count());

        if request.source.includes_microphone() {
            let stream = self.acquire_microphone().await?;
            watch_first_audio_track(&stream, on_ended.clone());
            acquired.push(stream);
        }

        if request.source.includes_system() {
            match self.acquire_system().await {
                Ok(stream) => {
                    watch_first_audio_track(&stream, on_ended);
                    acquired.push(stream);
                }
                Err(cause) => return Err(acquired.roll_back(cause)),
            }
        }

        let streams = acquired.into_streams();
        log::info!(
            "Acquired {} stream(s) for {} capture",
            streams.len(),
            request.source
        );
        Ok(streams)
    }

    async fn acquire_microphone(&self) -> Result<MediaStreamHandle, AcquisitionError> {
        let origin = StreamOrigin::Microphone;
        let stream = self
            .devices
            .get_user_media(&self.constraints)
            .await
            .map_err(|e| AcquisitionError::from_device(origin, e))?;
        require_audio(stream)
    }

    async fn acquire_system(&self) -> Result<MediaStreamHandle, AcquisitionError> {
        let origin = StreamOrigin::Display;
        let stream = self
            .devices
            .get_display_media(&DisplayConstraints::audio_only_use(self.constraints))
            .await
            .map_err(|e| AcquisitionError::from_device(origin, e))?;

        let dropped = stream.stop_video_tracks();
        if dropped > 0 {
            log::debug!("Stopped {} video track(s) from display capture", dropped);
        }
        require_audio(stream)
    }
}

/// Reject a stream without audio, releasing whatever it did carry
fn require_audio(stream: MediaStreamHandle) -> Result<MediaStreamHandle, AcquisitionError> {
    if stream.first_audio_track().is_some() {
        return Ok(stream);
    }
    stream.stop_all();
    Err(AcquisitionError::NoAudioTrack(stream.origin()))
}

fn watch_first_audio_track<F>(stream: &MediaStreamHandle, on_ended: F)
where
    F: Fn(u64) + Send + Sync + 'static,
{
    if let Some(track) = stream.first_audio_track() {
        let track_id = track.id();
        track.on_ended(move || on_ended(track_id));
    }
}

/// Streams acquired so far. Dropping this without [`Acquired::into_streams`]
/// stops every track it holds.
struct Acquired {
    streams: Vec<MediaStreamHandle>,
}

impl Acquired {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            streams: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, stream: MediaStreamHandle) {
        self.streams.push(stream);
    }

    fn into_streams(mut self) -> Vec<MediaStreamHandle> {
        std::mem::take(&mut self.streams)
    }

    /// Release everything acquired so far and wrap `cause` if anything was
    fn roll_back(mut self, cause: AcquisitionError) -> AcquisitionError {
        let rolled_back = self.release();
        if rolled_back == 0 {
            return cause;
        }
        log::warn!(
            "{} acquisition failed, released {} earlier stream(s)",
            cause.origin(),
            rolled_back
        );
        AcquisitionError::Partial {
            rolled_back,
            cause: Box::new(cause),
        }
    }

    fn release(&mut self) -> usize {
        let streams = std::mem::take(&mut self.streams);
        for stream in &streams {
            stream.stop_all();
        }
        streams.len()
    }
}

impl Drop for Acquired {
    fn drop(&mut self) {
        let released = self.release();
        if released > 0 {
            log::warn!("Acquisition abandoned, released {} stream(s)", released);
        }
    }
}
