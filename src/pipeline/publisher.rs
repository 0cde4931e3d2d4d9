//! Per-frame feature view handed to renderers

use super::extractor::{Bands, SpectralSnapshot};
use crate::audio::CaptureSource;
use crate::state::LifecycleState;
use serde::Serialize;

/// What consumers see each frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFrame {
    pub is_listening: bool,
    pub error: Option<String>,
    pub current_source: Option<CaptureSource>,

    /// Absent while not listening
    pub waveform: Option<Vec<u8>>,
    pub spectrum: Option<Vec<u8>>,

    pub bands: Bands,
    pub overall: f32,

    /// Multiplier for consumers to apply; the bands are never pre-scaled
    pub intensity: f32,
    pub frame: u64,
}

impl FeatureFrame {
    /// The view while nothing is being captured
    pub fn idle(intensity: f32, error: Option<String>) -> Self {
        Self {
            is_listening: false,
            error,
            current_source: None,
            waveform: None,
            spectrum: None,
            bands: Bands::default(),
            overall: 0.0,
            intensity,
            frame: 0,
        }
    }

    /// Bands with the intensity multiplier applied
    pub fn scaled_bands(&self) -> Bands {
        self.bands.scaled(self.intensity)
    }
}

impl Default for FeatureFrame {
    fn default() -> Self {
        Self::idle(1.0, None)
    }
}

/// Receives published frames and lifecycle changes
pub trait FeatureSubscriber: Send {
    fn on_frame(&mut self, frame: &FeatureFrame);

    fn on_state(&mut self, _state: LifecycleState) {}
}

impl<F> FeatureSubscriber for F
where
    F: FnMut(&FeatureFrame) + Send,
{
    fn on_frame(&mut self, frame: &FeatureFrame) {
        self(frame)
    }
}

/// Handle returned by [`FeaturePublisher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fans frames out to subscribers and remembers the latest one
pub struct FeaturePublisher {
    subscribers: Vec<(SubscriptionId, Box<dyn FeatureSubscriber>)>,
    next_id: u64,
    latest: FeatureFrame,
}

impl FeaturePublisher {
    pub fn new(intensity: f32) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
            latest: FeatureFrame::idle(intensity, None),
        }
    }

    pub fn subscribe(&mut self, subscriber: impl FeatureSubscriber + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn latest(&self) -> &FeatureFrame {
        &self.latest
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.latest.intensity = intensity;
    }

    /// Publish a listening frame built from `snapshot`
    pub fn publish_snapshot(&mut self, snapshot: SpectralSnapshot, source: CaptureSource) {
        let intensity = self.latest.intensity;
        self.latest = FeatureFrame {
            is_listening: true,
            error: None,
            current_source: Some(source),
            waveform: Some(snapshot.waveform),
            spectrum: Some(snapshot.spectrum),
            bands: snapshot.bands,
            overall: snapshot.overall,
            intensity,
            frame: snapshot.frame,
        };
        self.notify_frame();
    }

    /// Publish the idle view, carrying `error` if the last start failed
    pub fn publish_idle(&mut self, error: Option<String>) {
        self.latest = FeatureFrame::idle(self.latest.intensity, error);
        self.notify_frame();
    }

    pub fn publish_state(&mut self, state: LifecycleState) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber.on_state(state);
        }
    }

    fn notify_frame(&mut self) {
        let frame = &self.latest;
        for (_, subscriber) in &mut self.subscribers {
            subscriber.on_frame(frame);
        }
    }
}
