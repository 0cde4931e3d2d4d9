//! The capture and feature pipeline
//!
//! Streams are acquired, fanned into one analyser, and reduced to band
//! levels once per frame while the lifecycle controller is listening.

mod acquirer;
mod extractor;
mod graph;
mod lifecycle;
mod publisher;
mod scheduler;

pub use acquirer::{AcquisitionError, CaptureRequest, StreamAcquirer};
pub use extractor::{
    compute_bands, BandLevels, BandRanges, BandSplit, Bands, FeatureExtractor, LoopControl,
    SpectralSnapshot,
};
pub use graph::{AnalysisGraph, GraphError};
pub use lifecycle::{
    CaptureError, ControlEvent, LifecycleController, TeardownReason, TeardownReport, TeardownStep,
};
pub use publisher::{FeatureFrame, FeaturePublisher, FeatureSubscriber, SubscriptionId};
pub use scheduler::{FrameClock, FrameId, FrameScheduler, ManualFrames};
