//! Media tracks, streams and the sample taps that feed the analyser

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

type EndedListener = Box<dyn Fn() + Send + Sync>;
type Release = Box<dyn FnOnce() + Send>;

/// Circular audio buffer
pub struct AudioBuffer {
    samples: Vec<f32>,
    write_pos: usize,
    capacity: usize,
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push_samples(&mut self, data: &[f32]) {
        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// Add the most recent `out.len()` samples onto `out`, oldest first.
    ///
    /// If `out` is longer than the buffer, only its tail is touched.
    pub fn add_latest_into(&self, out: &mut [f32]) {
        let count = out.len().min(self.capacity);
        let offset = out.len() - count;

        let start = if self.write_pos >= count {
            self.write_pos - count
        } else {
            self.capacity - (count - self.write_pos)
        };

        for (i, slot) in out[offset..].iter_mut().enumerate() {
            *slot += self.samples[(start + i) % self.capacity];
        }
    }
}

/// Shared mono sample feed written by a capture backend
#[derive(Clone)]
pub struct SampleTap {
    buffer: Arc<Mutex<AudioBuffer>>,
    sample_rate: Arc<AtomicU32>,
}

impl SampleTap {
    /// Create a tap holding `seconds` worth of audio at `sample_rate`
    pub fn new(sample_rate: u32, seconds: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(AudioBuffer::new(sample_rate as usize * seconds))),
            sample_rate: Arc::new(AtomicU32::new(sample_rate)),
        }
    }

    pub fn push(&self, samples: &[f32]) {
        self.buffer.lock().push_samples(samples);
    }

    /// Sum the latest `out.len()` samples into `out`
    pub fn mix_latest_into(&self, out: &mut [f32]) {
        self.buffer.lock().add_latest_into(out);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }
}

impl fmt::Debug for SampleTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleTap")
            .field("sample_rate", &self.sample_rate())
            .field("capacity", &self.buffer.lock().capacity())
            .finish()
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Whether a track still delivers media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

struct TrackInner {
    id: u64,
    kind: TrackKind,
    label: String,
    ended: AtomicBool,
    tap: Option<SampleTap>,
    listeners: Mutex<Vec<EndedListener>>,
    release: Mutex<Option<Release>>,
}

/// A single media track.
///
/// Cloning yields another handle to the same track. `stop()` is the owner
/// releasing the track and never notifies listeners; `end()` is the backend or
/// the user terminating it from outside and notifies every listener once.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    fn with_kind(kind: TrackKind, label: String, tap: Option<SampleTap>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                label,
                ended: AtomicBool::new(false),
                tap,
                listeners: Mutex::new(Vec::new()),
                release: Mutex::new(None),
            }),
        }
    }

    pub fn audio(label: impl Into<String>, tap: SampleTap) -> Self {
        Self::with_kind(TrackKind::Audio, label.into(), Some(tap))
    }

    pub fn video(label: impl Into<String>) -> Self {
        Self::with_kind(TrackKind::Video, label.into(), None)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn tap(&self) -> Option<&SampleTap> {
        self.inner.tap.as_ref()
    }

    pub fn ready_state(&self) -> TrackState {
        if self.inner.ended.load(Ordering::Acquire) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    pub fn is_live(&self) -> bool {
        self.ready_state() == TrackState::Live
    }

    /// Install the hook that frees backend resources when the track ends.
    ///
    /// Runs immediately if the track has already ended.
    pub fn set_release(&self, release: impl FnOnce() + Send + 'static) {
        // `finish` marks the track ended before taking this lock, so checking
        // under the lock cannot miss a concurrent end
        let mut slot = self.inner.release.lock();
        if self.is_live() {
            *slot = Some(Box::new(release));
            return;
        }
        drop(slot);
        release();
    }

    /// Register a callback for external termination
    pub fn on_ended(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.listeners.lock().push(Box::new(listener));
    }

    /// Stop the track. Returns false if it had already ended.
    pub fn stop(&self) -> bool {
        let stopped = self.finish();
        if stopped {
            self.inner.listeners.lock().clear();
        }
        stopped
    }

    /// Terminate the track from outside its owner. Returns false if it had
    /// already ended.
    pub fn end(&self) -> bool {
        if !self.finish() {
            return false;
        }
        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        for listener in &listeners {
            listener();
        }
        true
    }

    fn finish(&self) -> bool {
        if self.inner.ended.swap(true, Ordering::AcqRel) {
            return false;
        }
        let release = self.inner.release.lock().take();
        if let Some(release) = release {
            release();
        }
        true
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("state", &self.ready_state())
            .finish()
    }
}

/// Where a stream was acquired from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    /// Input device capture
    Microphone,

    /// Display / system audio capture
    Display,
}

impl fmt::Display for StreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOrigin::Microphone => write!(f, "microphone"),
            StreamOrigin::Display => write!(f, "system audio"),
        }
    }
}

/// One acquired media stream and its tracks
#[derive(Debug)]
pub struct MediaStreamHandle {
    id: u64,
    origin: StreamOrigin,
    tracks: Vec<MediaTrack>,
}

impl MediaStreamHandle {
    pub fn new(origin: StreamOrigin, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            origin,
            tracks,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> StreamOrigin {
        self.origin
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    /// The track a source node reads from
    pub fn first_audio_track(&self) -> Option<&MediaTrack> {
        self.audio_tracks().next()
    }

    /// Stop every video track, returning how many were still live
    pub fn stop_video_tracks(&self) -> usize {
        self.video_tracks().filter(|t| t.stop()).count()
    }

    /// Stop every track, returning how many were still live
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}
