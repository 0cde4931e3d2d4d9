//! Scriptable media devices for lifecycle and acquisition tests

use crate::audio::{
    AudioConstraints, DeviceError, DisplayConstraints, MediaDevices, MediaStreamHandle, MediaTrack,
    SampleTap, StreamOrigin,
};
use parking_lot::Mutex;

/// How a fake device answers a request
#[derive(Debug, Clone)]
pub(crate) enum Grant {
    Stream { audio: usize, video: usize },
    Deny(String),
    Fail(String),
    /// Never answers, like a permission prompt left open
    Pending,
}

impl Grant {
    pub(crate) fn audio(audio: usize) -> Self {
        Grant::Stream { audio, video: 0 }
    }

    pub(crate) fn stream(audio: usize, video: usize) -> Self {
        Grant::Stream { audio, video }
    }
}

#[derive(Default)]
pub(crate) struct FakeDevices {
    microphone: Mutex<Option<Grant>>,
    system: Mutex<Option<Grant>>,
    user_requests: Mutex<Vec<AudioConstraints>>,
    display_requests: Mutex<Vec<DisplayConstraints>>,
    tracks: Mutex<Vec<(StreamOrigin, MediaTrack)>>,
}

impl FakeDevices {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_microphone(self, grant: Grant) -> Self {
        *self.microphone.lock() = Some(grant);
        self
    }

    pub(crate) fn with_system(self, grant: Grant) -> Self {
        *self.system.lock() = Some(grant);
        self
    }

    pub(crate) fn set_system(&self, grant: Grant) {
        *self.system.lock() = Some(grant);
    }

    pub(crate) fn user_media_requests(&self) -> Vec<AudioConstraints> {
        self.user_requests.lock().clone()
    }

    pub(crate) fn display_media_requests(&self) -> Vec<DisplayConstraints> {
        self.display_requests.lock().clone()
    }

    /// Every track handed out so far, in creation order
    pub(crate) fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    /// First audio track handed out for `origin` that is still live
    pub(crate) fn live_audio_track(&self, origin: StreamOrigin) -> Option<MediaTrack> {
        self.tracks
            .lock()
            .iter()
            .find(|(o, t)| *o == origin && t.tap().is_some() && t.is_live())
            .map(|(_, t)| t.clone())
    }

    pub(crate) fn live_track_count(&self) -> usize {
        self.tracks.lock().iter().filter(|(_, t)| t.is_live()).count()
    }

    fn answer(&self, origin: StreamOrigin, grant: Option<Grant>) -> Result<MediaStreamHandle, DeviceError> {
        match grant {
            Some(Grant::Stream { audio, video }) => {
                let mut tracks = Vec::with_capacity(audio + video);
                for i in 0..video {
                    tracks.push(MediaTrack::video(format!("{origin} video {i}")));
                }
                for i in 0..audio {
                    tracks.push(MediaTrack::audio(format!("{origin} audio {i}"), SampleTap::new(48_000, 1)));
                }
                self.tracks
                    .lock()
                    .extend(tracks.iter().map(|t| (origin, t.clone())));
                Ok(MediaStreamHandle::new(origin, tracks))
            }
            Some(Grant::Deny(message)) => Err(DeviceError::PermissionDenied(message)),
            Some(Grant::Fail(message)) => Err(DeviceError::Backend(message)),
            Some(Grant::Pending) | None => Err(DeviceError::NotFound(origin.to_string())),
        }
    }
}

impl MediaDevices for FakeDevices {
    async fn get_user_media(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<MediaStreamHandle, DeviceError> {
        self.user_requests.lock().push(*constraints);
        let grant = self.microphone.lock().clone();
        if matches!(grant, Some(Grant::Pending)) {
            std::future::pending::<()>().await;
        }
        self.answer(StreamOrigin::Microphone, grant)
    }

    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStreamHandle, DeviceError> {
        self.display_requests.lock().push(*constraints);
        let grant = self.system.lock().clone();
        if matches!(grant, Some(Grant::Pending)) {
            std::future::pending::<()>().await;
        }
        self.answer(StreamOrigin::Display, grant)
    }
}
