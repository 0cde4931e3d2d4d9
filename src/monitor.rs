//! Headless capture loop: run the pipeline and report frames until told to stop

use crate::audio::{CaptureSource, CpalDevices};
use crate::config::PipelineConfig;
use crate::pipeline::{CaptureError, FeatureFrame, FrameClock, LifecycleController};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a level line is logged in text mode
const REPORT_EVERY: u64 = 30;

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub source: CaptureSource,

    /// Stop after this long; run until interrupted when unset
    pub duration: Option<Duration>,

    /// Print every frame as a JSON line instead of logging levels
    pub json: bool,
}

/// Why the monitor loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    Interrupted,
    DurationElapsed,
    CaptureEnded,
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSummary {
    pub exit: MonitorExit,
    pub frames: u64,
}

/// One-line summary of a frame's levels
pub fn describe(frame: &FeatureFrame) -> String {
    let bands = frame.scaled_bands();
    format!(
        "#{:<6} bass {:.3}  mid {:.3}  treble {:.3}  overall {:.3}",
        frame.frame, bands.bass, bands.mid, bands.treble, frame.overall
    )
}

fn report(frame: &FeatureFrame, json: bool) {
    if json {
        match serde_json::to_string(frame) {
            Ok(line) => println!("{}", line),
            Err(e) => log::warn!("Failed to serialize frame: {}", e),
        }
    } else if frame.is_listening && frame.frame % REPORT_EVERY == 0 {
        log::info!("{}", describe(frame));
    }
}

/// Capture `options.source` on the cpal backend until Ctrl-C, the duration
/// elapsing, or the capture ending on its own.
pub async fn run_monitor(
    config: PipelineConfig,
    options: MonitorOptions,
) -> Result<MonitorSummary, CaptureError> {
    let clock = FrameClock::new(&config.frames);
    let devices = CpalDevices::new(&config.devices);
    let mut controller = LifecycleController::new(devices, clock, config);

    let frames = Arc::new(AtomicU64::new(0));
    let counter = frames.clone();
    let json = options.json;
    controller.subscribe(move |frame: &FeatureFrame| {
        if frame.is_listening {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        report(frame, json);
    });

    controller.start_capture(options.source).await;
    if let Some(error) = controller.error() {
        return Err(error.clone());
    }
    log::info!("Listening to {} (Ctrl-C to stop)", options.source);

    let deadline = async {
        match options.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let exit = loop {
        tokio::select! {
            _ = &mut ctrl_c => break MonitorExit::Interrupted,
            _ = &mut deadline => break MonitorExit::DurationElapsed,
            _ = controller.next_frame() => {
                if !controller.is_listening() {
                    break MonitorExit::CaptureEnded;
                }
            }
        }
    };

    controller.stop_capture();
    let summary = MonitorSummary {
        exit,
        frames: frames.load(Ordering::Relaxed),
    };
    log::info!("Monitor finished ({:?}) after {} frame(s)", summary.exit, summary.frames);
    Ok(summary)
}
