//! Capture lifecycle: acquisition, the frame loop and ordered teardown

use super::acquirer::{AcquisitionError, CaptureRequest, StreamAcquirer};
use super::extractor::{Bands, FeatureExtractor, LoopControl};
use super::graph::{AnalysisGraph, GraphError};
use super::publisher::{FeatureFrame, FeaturePublisher, FeatureSubscriber, SubscriptionId};
use super::scheduler::{FrameClock, FrameId, FrameScheduler, ManualFrames};
use crate::audio::{CaptureSource, MediaDevices, MediaStreamHandle};
use crate::config::PipelineConfig;
use crate::state::LifecycleState;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Why a capture could not start
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("Failed to set up audio analysis: {0}")]
    Graph(#[from] GraphError),
}

/// Events raised outside the controller and handled on its next pump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// A track feeding the graph ended without the controller stopping it
    TrackEnded { generation: u64, track_id: u64 },
}

/// What started a teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    UserStop,
    ExternalTermination,
    SourceSwitch,
    Unmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    CancelFrame,
    DisconnectSources,
    DisconnectAnalyser,
    CloseContext,
    StopTracks,
}

/// Record of one completed teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub reason: TeardownReason,
    pub steps: Vec<TeardownStep>,

    /// Tracks that were still live when stopped
    pub tracks_stopped: usize,
}

/// Everything owned by one capture session
struct Session {
    generation: u64,
    source: CaptureSource,
    streams: Vec<MediaStreamHandle>,
    graph: AnalysisGraph,
    extractor: FeatureExtractor,
    pending_frame: Option<FrameId>,
}

/// Drives the pipeline `Idle -> Acquiring -> Listening -> Stopped -> Idle`.
///
/// All capture resources live in the current session and are released by a
/// single teardown routine, whether the user stops, a track ends, the source
/// is switched or the controller is dropped.
pub struct LifecycleController<D: MediaDevices, S: FrameScheduler> {
    devices: D,
    scheduler: S,
    config: PipelineConfig,
    state: LifecycleState,
    error: Option<CaptureError>,
    current_source: Option<CaptureSource>,
    session: Option<Session>,
    generation: u64,
    events_tx: UnboundedSender<ControlEvent>,
    events_rx: UnboundedReceiver<ControlEvent>,
    publisher: FeaturePublisher,
    teardowns: usize,
    last_teardown: Option<TeardownReport>,
}

impl<D: MediaDevices, S: FrameScheduler> LifecycleController<D, S> {
    pub fn new(devices: D, scheduler: S, config: PipelineConfig) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let publisher = FeaturePublisher::new(config.intensity);

        Self {
            devices,
            scheduler,
            config,
            state: LifecycleState::Idle,
            error: None,
            current_source: None,
            session: None,
            generation: 0,
            events_tx,
            events_rx,
            publisher,
            teardowns: 0,
            last_teardown: None,
        }
    }

    /// Start capturing `source`.
    ///
    /// A running session is torn down first. Failures are recorded in
    /// [`error`](Self::error) and leave the controller idle. If the returned
    /// future is dropped mid-acquisition, whatever was acquired is released and
    /// the controller stays `Acquiring` until the next start or stop.
    pub async fn start_capture(&mut self, source: CaptureSource) {
        self.abandon_acquisition();
        if self.session.is_some() {
            log::info!("Switching capture source to {}", source);
            self.teardown(TeardownReason::SourceSwitch);
        }

        self.error = None;
        self.generation += 1;
        self.transition(LifecycleState::Acquiring);

        let generation = self.generation;
        let events = self.events_tx.clone();
        let acquired = StreamAcquirer::new(&self.devices, self.config.constraints)
            .acquire(CaptureRequest::new(source), move |track_id| {
                let _ = events.send(ControlEvent::TrackEnded {
                    generation,
                    track_id,
                });
            })
            .await;

        let streams = match acquired {
            Ok(streams) => streams,
            Err(e) => return self.fail(e.into()),
        };

        let graph = match AnalysisGraph::build(&streams, &self.config.analyser) {
            Ok(graph) => graph,
            Err(e) => {
                for stream in &streams {
                    stream.stop_all();
                }
                return self.fail(e.into());
            }
        };

        let pending_frame = Some(self.scheduler.request_frame());
        self.session = Some(Session {
            generation,
            source,
            streams,
            graph,
            extractor: FeatureExtractor::new(self.config.bands),
            pending_frame,
        });
        self.current_source = Some(source);
        self.transition(LifecycleState::Listening);
    }

    /// Stop capturing. Returns false if nothing was running.
    pub fn stop_capture(&mut self) -> bool {
        if self.abandon_acquisition() {
            return true;
        }
        self.teardown(TeardownReason::UserStop).is_some()
    }

    /// Handle queued track-ended events. Returns true if one ended the session.
    pub fn process_events(&mut self) -> bool {
        let mut stopped = false;
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                ControlEvent::TrackEnded {
                    generation,
                    track_id,
                } => {
                    let current = self.session.as_ref().map(|s| s.generation);
                    if current == Some(generation) {
                        log::info!("Track {} ended externally, stopping capture", track_id);
                        stopped |= self.teardown(TeardownReason::ExternalTermination).is_some();
                    } else {
                        log::debug!(
                            "Ignoring end of track {} from session {}",
                            track_id,
                            generation
                        );
                    }
                }
            }
        }
        stopped
    }

    /// Run the frame callback for `frame`.
    ///
    /// Frames that are not the pending one (cancelled, or from an earlier
    /// session) are ignored.
    pub fn on_frame(&mut self, frame: FrameId) {
        self.process_events();

        let state = self.state;
        let Some(session) = self.session.as_mut() else {
            log::debug!("Frame {:?} arrived with no active session", frame);
            return;
        };
        if session.pending_frame != Some(frame) {
            log::debug!("Ignoring stale frame {:?}", frame);
            return;
        }
        session.pending_frame = None;

        let (snapshot, control) = session.extractor.tick(&mut session.graph, state);
        if let Some(snapshot) = snapshot {
            self.publisher.publish_snapshot(snapshot, session.source);
        }
        if control == LoopControl::Continue {
            session.pending_frame = Some(self.scheduler.request_frame());
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_listening()
    }

    /// Why the last start failed, kept until the next start
    pub fn error(&self) -> Option<&CaptureError> {
        self.error.as_ref()
    }

    pub fn current_source(&self) -> Option<CaptureSource> {
        self.current_source
    }

    /// The most recently published frame
    pub fn frame(&self) -> &FeatureFrame {
        self.publisher.latest()
    }

    pub fn waveform(&self) -> Option<&[u8]> {
        self.frame().waveform.as_deref()
    }

    pub fn spectrum(&self) -> Option<&[u8]> {
        self.frame().spectrum.as_deref()
    }

    pub fn bands(&self) -> Bands {
        self.frame().bands
    }

    pub fn overall(&self) -> f32 {
        self.frame().overall
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.config.intensity = intensity;
        self.publisher.set_intensity(intensity);
    }

    pub fn subscribe(&mut self, subscriber: impl FeatureSubscriber + 'static) -> SubscriptionId {
        self.publisher.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// The live analysis graph, if a session is running
    pub fn graph(&self) -> Option<&AnalysisGraph> {
        self.session.as_ref().map(|s| &s.graph)
    }

    /// Number of teardowns performed so far
    pub fn teardown_count(&self) -> usize {
        self.teardowns
    }

    pub fn last_teardown(&self) -> Option<&TeardownReport> {
        self.last_teardown.as_ref()
    }

    fn transition(&mut self, next: LifecycleState) {
        if !self.state.can_transition_to(next) {
            log::warn!("Unexpected capture transition {} -> {}", self.state, next);
        }
        log::info!("Capture {} -> {}", self.state, next);
        self.state = next;
        self.publisher.publish_state(next);
    }

    fn fail(&mut self, error: CaptureError) {
        log::error!("Audio capture failed: {}", error);
        let message = error.to_string();
        self.error = Some(error);
        self.transition(LifecycleState::Errored);
        self.publisher.publish_idle(Some(message));
        self.transition(LifecycleState::Idle);
    }

    /// Return to `Idle` after a start that never finished acquiring.
    ///
    /// The acquirer has already released its streams by the time this can run.
    fn abandon_acquisition(&mut self) -> bool {
        if self.state != LifecycleState::Acquiring || self.session.is_some() {
            return false;
        }
        log::warn!("Capture start was abandoned while acquiring");
        self.current_source = None;
        let error = self.error.as_ref().map(|e| e.to_string());
        self.publisher.publish_idle(error);
        self.transition(LifecycleState::Idle);
        true
    }

    /// Release the current session, if any, in a fixed order
    fn teardown(&mut self, reason: TeardownReason) -> Option<TeardownReport> {
        let mut session = self.session.take()?;
        let mut steps = Vec::with_capacity(5);

        if let Some(frame) = session.pending_frame.take() {
            self.scheduler.cancel_frame(frame);
        }
        steps.push(TeardownStep::CancelFrame);

        session.graph.disconnect_sources();
        steps.push(TeardownStep::DisconnectSources);

        session.graph.disconnect_analyser();
        steps.push(TeardownStep::DisconnectAnalyser);

        session.graph.close_context();
        steps.push(TeardownStep::CloseContext);

        let tracks_stopped = session.streams.iter().map(|s| s.stop_all()).sum();
        steps.push(TeardownStep::StopTracks);

        log::info!(
            "Capture torn down ({:?}): {} stream(s), {} live track(s) stopped after {} frame(s)",
            reason,
            session.streams.len(),
            tracks_stopped,
            session.extractor.frames()
        );

        self.current_source = None;
        self.teardowns += 1;
        let report = TeardownReport {
            reason,
            steps,
            tracks_stopped,
        };
        self.last_teardown = Some(report.clone());

        self.transition(LifecycleState::Stopped);
        let error = self.error.as_ref().map(|e| e.to_string());
        self.publisher.publish_idle(error);
        self.transition(LifecycleState::Idle);

        Some(report)
    }
}

impl<D: MediaDevices> LifecycleController<D, ManualFrames> {
    /// Fire the pending frame, if any. Returns false when none was scheduled.
    pub fn drive_frame(&mut self) -> bool {
        self.process_events();
        match self.scheduler.take_pending() {
            Some(frame) => {
                self.on_frame(frame);
                true
            }
            None => false,
        }
    }
}

impl<D: MediaDevices> LifecycleController<D, FrameClock> {
    /// Wait for the next clock tick and run the frame or pump events
    pub async fn next_frame(&mut self) -> bool {
        match self.scheduler.next_frame().await {
            Some(frame) => {
                self.on_frame(frame);
                true
            }
            None => {
                self.process_events();
                false
            }
        }
    }
}

impl<D: MediaDevices, S: FrameScheduler> Drop for LifecycleController<D, S> {
    fn drop(&mut self) {
        if !self.abandon_acquisition() {
            self.teardown(TeardownReason::Unmount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StreamOrigin;
    use crate::test_support::{FakeDevices, Grant};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    type Controller = LifecycleController<FakeDevices, ManualFrames>;

    fn controller(devices: FakeDevices) -> Controller {
        LifecycleController::new(devices, ManualFrames::new(), PipelineConfig::default())
    }

    fn record_states(controller: &mut Controller) -> Arc<Mutex<Vec<LifecycleState>>> {
        struct States(Arc<Mutex<Vec<LifecycleState>>>);

        impl FeatureSubscriber for States {
            fn on_frame(&mut self, _frame: &FeatureFrame) {}

            fn on_state(&mut self, state: LifecycleState) {
                self.0.lock().push(state);
            }
        }

        let states = Arc::new(Mutex::new(Vec::new()));
        controller.subscribe(States(states.clone()));
        states
    }

    fn tone(frequency: f32, amplitude: f32) -> Vec<f32> {
        (0..2048)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * frequency * i as f32 / 48_000.0).sin())
            .collect()
    }

    const TEARDOWN_ORDER: [TeardownStep; 5] = [
        TeardownStep::CancelFrame,
        TeardownStep::DisconnectSources,
        TeardownStep::DisconnectAnalyser,
        TeardownStep::CloseContext,
        TeardownStep::StopTracks,
    ];

    #[tokio::test]
    async fn microphone_with_two_tracks_uses_the_first() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(2)));

        controller.start_capture(CaptureSource::Microphone).await;

        assert_eq!(controller.state(), LifecycleState::Listening);
        assert_eq!(controller.current_source(), Some(CaptureSource::Microphone));
        assert_eq!(controller.current_source().map(|s| s.as_str()), Some("microphone"));

        let graph = controller.graph().unwrap();
        let first = controller.devices().tracks()[0].id();
        assert_eq!(graph.source_count(), 1);
        assert_eq!(graph.sources()[0].track_id(), first);
        assert!(controller.error().is_none());
    }

    #[tokio::test]
    async fn system_without_audio_errors_before_any_context() {
        let mut controller = controller(FakeDevices::new().with_system(Grant::stream(0, 2)));
        let states = record_states(&mut controller);

        controller.start_capture(CaptureSource::System).await;

        assert_eq!(
            *states.lock(),
            vec![LifecycleState::Acquiring, LifecycleState::Errored, LifecycleState::Idle]
        );
        assert!(matches!(
            controller.error(),
            Some(CaptureError::Acquisition(AcquisitionError::NoAudioTrack(StreamOrigin::Display)))
        ));
        assert_eq!(controller.devices().live_track_count(), 0);
        assert!(controller.graph().is_none());
        assert_eq!(controller.scheduler().requested(), 0);
        assert!(!controller.is_listening());
    }

    #[tokio::test]
    async fn ended_microphone_stops_both_streams() {
        let devices = FakeDevices::new()
            .with_microphone(Grant::audio(1))
            .with_system(Grant::audio(1));
        let mut controller = controller(devices);
        controller.start_capture(CaptureSource::Both).await;
        let states = record_states(&mut controller);
        assert_eq!(controller.graph().unwrap().source_count(), 2);

        let mic = controller.devices().live_audio_track(StreamOrigin::Microphone).unwrap();
        mic.end();
        assert!(controller.process_events());

        assert_eq!(*states.lock(), vec![LifecycleState::Stopped, LifecycleState::Idle]);
        assert_eq!(controller.devices().live_track_count(), 0);
        assert_eq!(
            controller.last_teardown().map(|r| r.reason),
            Some(TeardownReason::ExternalTermination)
        );
        // The system track was still live and is stopped by teardown
        assert_eq!(controller.last_teardown().map(|r| r.tracks_stopped), Some(1));
        assert!(controller.error().is_none());
    }

    #[tokio::test]
    async fn partial_failure_rolls_back_microphone() {
        let devices = FakeDevices::new()
            .with_microphone(Grant::audio(1))
            .with_system(Grant::stream(0, 1));
        let mut controller = controller(devices);
        let states = record_states(&mut controller);

        controller.start_capture(CaptureSource::Both).await;

        assert!(states.lock().contains(&LifecycleState::Errored));
        assert_eq!(controller.state(), LifecycleState::Idle);
        assert_eq!(controller.devices().live_track_count(), 0);
        let message = controller.error().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.starts_with("No system audio track available"));
        assert_eq!(controller.frame().error.as_deref(), Some(message.as_str()));
    }

    #[tokio::test]
    async fn permission_denial_is_reported_verbatim() {
        let devices = FakeDevices::new().with_microphone(Grant::Deny("Permission denied".to_string()));
        let mut controller = controller(devices);

        controller.start_capture(CaptureSource::Microphone).await;

        assert_eq!(
            controller.error().map(|e| e.to_string()).as_deref(),
            Some("Permission denied")
        );
        assert_eq!(controller.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn stop_twice_tears_down_once() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(1)));
        controller.start_capture(CaptureSource::Microphone).await;

        assert!(controller.stop_capture());
        assert!(!controller.stop_capture());

        assert_eq!(controller.teardown_count(), 1);
        assert_eq!(controller.state(), LifecycleState::Idle);
        assert_eq!(controller.devices().live_track_count(), 0);
        assert_eq!(controller.current_source(), None);
        let report = controller.last_teardown().unwrap();
        assert_eq!(report.reason, TeardownReason::UserStop);
        assert_eq!(report.steps, TEARDOWN_ORDER);
    }

    #[tokio::test]
    async fn stop_then_track_end_tears_down_once() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(1)));
        controller.start_capture(CaptureSource::Microphone).await;
        let mic = controller.devices().tracks()[0].clone();

        // Queued before the stop, handled after it
        mic.end();
        controller.stop_capture();
        assert!(!controller.process_events());

        assert_eq!(controller.teardown_count(), 1);
        assert_eq!(controller.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn frames_publish_while_listening_and_stop_after_teardown() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(1)));
        controller.start_capture(CaptureSource::Microphone).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        controller.subscribe(move |frame: &FeatureFrame| sink.lock().push(frame.is_listening));

        assert!(controller.drive_frame());
        assert!(controller.drive_frame());
        assert_eq!(controller.waveform().map(|w| w.len()), Some(1024));
        assert_eq!(controller.spectrum().map(|s| s.len()), Some(1024));

        controller.stop_capture();
        assert_eq!(controller.scheduler().cancelled(), 1);
        assert!(!controller.drive_frame());
        controller.on_frame(FrameId(1));

        assert_eq!(*seen.lock(), vec![true, true, false]);
        assert!(controller.waveform().is_none());
        assert_eq!(controller.bands(), Bands::default());
        assert_eq!(controller.overall(), 0.0);
    }

    #[tokio::test]
    async fn steady_signal_gives_steady_overall() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(1)));
        controller.start_capture(CaptureSource::Microphone).await;
        let mic = controller.devices().tracks()[0].clone();
        mic.tap().unwrap().push(&tone(1000.0, 0.5));

        for _ in 0..40 {
            controller.drive_frame();
        }
        let before = controller.overall();
        let frame_before = controller.frame().frame;
        controller.drive_frame();
        let after = controller.overall();

        assert!(after > 0.0);
        assert!((after - before).abs() < 0.01, "{before} -> {after}");
        assert_eq!(controller.frame().frame, frame_before + 1);
    }

    #[tokio::test]
    async fn no_output_path_while_listening() {
        let devices = FakeDevices::new()
            .with_microphone(Grant::audio(1))
            .with_system(Grant::audio(1));
        let mut controller = controller(devices);
        controller.start_capture(CaptureSource::Both).await;
        controller.drive_frame();

        let graph = controller.graph().unwrap();
        let analyser = graph.analyser_id().unwrap();
        assert!(graph.context().outputs_of(analyser).is_empty());
        assert!(!graph.has_output_path());
    }

    #[tokio::test]
    async fn switching_source_stops_the_previous_session() {
        let devices = FakeDevices::new()
            .with_microphone(Grant::audio(1))
            .with_system(Grant::audio(1));
        let mut controller = controller(devices);
        controller.start_capture(CaptureSource::Microphone).await;
        let states = record_states(&mut controller);
        let mic = controller.devices().tracks()[0].clone();

        controller.start_capture(CaptureSource::System).await;

        assert!(!mic.is_live());
        assert_eq!(controller.current_source(), Some(CaptureSource::System));
        assert_eq!(controller.state(), LifecycleState::Listening);
        assert_eq!(
            controller.last_teardown().map(|r| r.reason),
            Some(TeardownReason::SourceSwitch)
        );
        assert_eq!(
            *states.lock(),
            vec![
                LifecycleState::Stopped,
                LifecycleState::Idle,
                LifecycleState::Acquiring,
                LifecycleState::Listening
            ]
        );
    }

    #[tokio::test]
    async fn events_from_earlier_sessions_are_ignored() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(1)));
        controller.start_capture(CaptureSource::Microphone).await;
        controller.stop_capture();
        controller.start_capture(CaptureSource::Microphone).await;

        let stale = ControlEvent::TrackEnded {
            generation: 1,
            track_id: 0,
        };
        controller.events_tx.send(stale).unwrap();

        assert!(!controller.process_events());
        assert!(controller.is_listening());
        assert_eq!(controller.teardown_count(), 1);
    }

    #[tokio::test]
    async fn retry_after_failure_clears_error() {
        let devices = FakeDevices::new().with_system(Grant::Deny("Permission denied".to_string()));
        let mut controller = controller(devices);
        controller.start_capture(CaptureSource::System).await;
        assert!(controller.error().is_some());

        controller.devices().set_system(Grant::audio(1));
        controller.start_capture(CaptureSource::System).await;

        assert!(controller.error().is_none());
        assert!(controller.is_listening());
    }

    #[tokio::test]
    async fn intensity_is_published_with_frames() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(1)));
        controller.set_intensity(1.5);
        controller.start_capture(CaptureSource::Microphone).await;
        controller.drive_frame();

        assert_eq!(controller.frame().intensity, 1.5);
        assert!(controller.frame().is_listening);
    }

    #[tokio::test]
    async fn dropping_the_controller_releases_tracks() {
        let mut controller = controller(FakeDevices::new().with_microphone(Grant::audio(1)));
        controller.start_capture(CaptureSource::Microphone).await;
        let tracks = controller.devices().tracks();

        drop(controller);

        assert!(tracks.iter().all(|t| !t.is_live()));
    }

    #[tokio::test]
    async fn cancelled_start_releases_tracks_and_can_be_stopped() {
        let devices = FakeDevices::new()
            .with_microphone(Grant::audio(1))
            .with_system(Grant::Pending);
        let mut controller = controller(devices);

        let started = tokio::time::timeout(
            Duration::from_millis(50),
            controller.start_capture(CaptureSource::Both),
        )
        .await;
        assert!(started.is_err());

        let mic = controller.devices().tracks()[0].clone();
        assert!(!mic.is_live());
        assert_eq!(controller.state(), LifecycleState::Acquiring);
        assert!(controller.graph().is_none());

        let states = record_states(&mut controller);
        assert!(controller.stop_capture());
        assert_eq!(controller.state(), LifecycleState::Idle);
        assert_eq!(*states.lock(), vec![LifecycleState::Idle]);
        assert!(!controller.frame().is_listening);
        assert!(!controller.stop_capture());
        assert_eq!(controller.teardown_count(), 0);
    }

    #[tokio::test]
    async fn restart_after_cancelled_start() {
        let devices = FakeDevices::new()
            .with_microphone(Grant::audio(1))
            .with_system(Grant::Pending);
        let mut controller = controller(devices);
        let _ = tokio::time::timeout(
            Duration::from_millis(50),
            controller.start_capture(CaptureSource::Both),
        )
        .await;

        controller.devices().set_system(Grant::audio(1));
        controller.start_capture(CaptureSource::Both).await;

        assert!(controller.is_listening());
        assert_eq!(controller.graph().map(|g| g.source_count()), Some(2));
        assert_eq!(controller.devices().live_track_count(), 2);
    }

    #[tokio::test]
    async fn dropping_after_cancelled_start_leaves_nothing_live() {
        let devices = FakeDevices::new()
            .with_microphone(Grant::audio(1))
            .with_system(Grant::Pending);
        let mut controller = controller(devices);
        let _ = tokio::time::timeout(
            Duration::from_millis(50),
            controller.start_capture(CaptureSource::Both),
        )
        .await;
        let tracks = controller.devices().tracks();

        drop(controller);

        assert_eq!(tracks.len(), 1);
        assert!(tracks.iter().all(|t| !t.is_live()));
    }
}
