//! Frame scheduling for the extraction loop

use crate::config::FrameConfig;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Handle for one requested frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Something that can call back once per display frame.
///
/// The controller requests one frame at a time and cancels the pending one
/// during teardown.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameId;
    fn cancel_frame(&mut self, frame: FrameId);
}

/// Scheduler driven by the host: frames fire only when taken
#[derive(Debug, Default)]
pub struct ManualFrames {
    next: u64,
    pending: Option<FrameId>,
    requested: usize,
    cancelled: usize,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pending frame, if one was requested and not cancelled
    pub fn take_pending(&mut self) -> Option<FrameId> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<FrameId> {
        self.pending
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualFrames {
    fn request_frame(&mut self) -> FrameId {
        self.next += 1;
        self.requested += 1;
        let frame = FrameId(self.next);
        self.pending = Some(frame);
        frame
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        if self.pending == Some(frame) {
            self.pending = None;
            self.cancelled += 1;
        }
    }
}

/// Display cadence used when the configured rate does not throttle
const DISPLAY_FRAME: Duration = Duration::from_micros(16_667);

/// Tokio interval clock standing in for the display refresh
pub struct FrameClock {
    frames: ManualFrames,
    interval: Interval,
}

impl FrameClock {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            frames: ManualFrames::new(),
            interval: Self::interval_for(config),
        }
    }

    fn interval_for(config: &FrameConfig) -> Interval {
        let delay = config.frame_delay();
        let period = if delay.is_zero() { DISPLAY_FRAME } else { delay };
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    pub fn set_target_fps(&mut self, target_fps: u32) {
        self.interval = Self::interval_for(&FrameConfig { target_fps });
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Wait for the next tick and hand out the pending frame.
    ///
    /// Returns `None` when no frame is requested; the tick is still consumed.
    pub async fn next_frame(&mut self) -> Option<FrameId> {
        self.interval.tick().await;
        self.frames.take_pending()
    }

    pub fn has_pending(&self) -> bool {
        self.frames.pending().is_some()
    }
}

impl FrameScheduler for FrameClock {
    fn request_frame(&mut self) -> FrameId {
        self.frames.request_frame()
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        self.frames.cancel_frame(frame);
    }
}
