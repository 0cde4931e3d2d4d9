//! cpal-backed device access using one dedicated thread per captured track

use super::devices::{AudioConstraints, DeviceError, DisplayConstraints, MediaDevices};
use super::media::{MediaStreamHandle, MediaTrack, SampleTap, StreamOrigin};
use super::sources::is_monitor_name;
use super::DEFAULT_SAMPLE_RATE;
use crate::config::DeviceSelection;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, Host, SampleFormat, StreamConfig, StreamError};
use std::sync::mpsc;
use std::thread;

/// Seconds of audio each track keeps for the analyser
const TAP_SECONDS: usize = 2;

/// Commands sent to a capture thread
enum AudioCommand {
    Stop,
}

/// What a capture thread is asked to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Microphone,
    System,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::Microphone => "Microphone",
            Role::System => "System Audio",
        }
    }

    fn thread_name(self) -> &'static str {
        match self {
            Role::Microphone => "audio-capture-mic",
            Role::System => "audio-capture-system",
        }
    }
}

/// Media devices backed by the default cpal host.
///
/// Microphone capture opens an input device. System capture prefers a monitor
/// input (PulseAudio / PipeWire) and falls back to opening the default output
/// device for loopback, which WASAPI supports. The cpal stream lives on its own
/// thread because it is not `Send` on every platform.
#[derive(Debug, Clone, Default)]
pub struct CpalDevices {
    microphone: Option<String>,
    system: Option<String>,
}

impl CpalDevices {
    pub fn new(selection: &DeviceSelection) -> Self {
        Self {
            microphone: selection.microphone.clone(),
            system: selection.system.clone(),
        }
    }
}

impl MediaDevices for CpalDevices {
    async fn get_user_media(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<MediaStreamHandle, DeviceError> {
        log_constraints(constraints);
        let track = open_track(Role::Microphone, self.microphone.clone())?;
        Ok(MediaStreamHandle::new(StreamOrigin::Microphone, vec![track]))
    }

    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStreamHandle, DeviceError> {
        log_constraints(&constraints.audio);
        if constraints.video {
            log::debug!("Loopback capture carries no video; stream will be audio only");
        }
        let track = open_track(Role::System, self.system.clone())?;
        Ok(MediaStreamHandle::new(StreamOrigin::Display, vec![track]))
    }
}

fn log_constraints(constraints: &AudioConstraints) {
    if !constraints.is_raw() {
        log::warn!(
            "cpal delivers unprocessed audio, ignoring requested processing {:?}",
            constraints
        );
    }
}

/// Open a device on a fresh capture thread and wrap it in a live track
fn open_track(role: Role, requested: Option<String>) -> Result<MediaTrack, DeviceError> {
    let track = MediaTrack::audio(role.label(), SampleTap::new(DEFAULT_SAMPLE_RATE, TAP_SECONDS));

    let (command_tx, command_rx) = mpsc::channel();
    let (ready_tx, ready_rx) = mpsc::channel();
    let thread_track = track.clone();

    thread::Builder::new()
        .name(role.thread_name().to_string())
        .spawn(move || run_capture_thread(role, requested, thread_track, ready_tx, command_rx))
        .map_err(|e| DeviceError::Backend(format!("Failed to spawn capture thread: {}", e)))?;

    match ready_rx.recv() {
        Ok(Ok(())) => {
            track.set_release(move || {
                let _ = command_tx.send(AudioCommand::Stop);
            });
            Ok(track)
        }
        Ok(Err(e)) => {
            track.stop();
            Err(e)
        }
        Err(_) => {
            track.stop();
            Err(DeviceError::Backend(
                "Capture thread exited before the stream started".to_string(),
            ))
        }
    }
}

/// Own the cpal stream until the track is released
fn run_capture_thread(
    role: Role,
    requested: Option<String>,
    track: MediaTrack,
    ready_tx: mpsc::Sender<Result<(), DeviceError>>,
    command_rx: mpsc::Receiver<AudioCommand>,
) {
    let (stream, device_name) = match open_stream(role, requested.as_deref(), &track) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(DeviceError::Backend(format!("Failed to start stream: {}", e))));
        return;
    }

    log::info!("{} capture started on {}", role.label(), device_name);
    let _ = ready_tx.send(Ok(()));

    // A dropped sender ends capture the same way as an explicit stop
    match command_rx.recv() {
        Ok(AudioCommand::Stop) => log::info!("{} capture stopping", role.label()),
        Err(_) => log::info!("{} capture channel disconnected", role.label()),
    }
    drop(stream);
}

fn open_stream(
    role: Role,
    requested: Option<&str>,
    track: &MediaTrack,
) -> Result<(cpal::Stream, String), DeviceError> {
    let host = cpal::default_host();
    let (device, is_loopback) = resolve_device(&host, role, requested)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    // Loopback streams run at the output device's format
    let config = if is_loopback {
        device.default_output_config()
    } else {
        device.default_input_config()
    }
    .map_err(|e| DeviceError::Backend(format!("Failed to get device config: {}", e)))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let tap = track
        .tap()
        .cloned()
        .ok_or_else(|| DeviceError::Backend("audio track without a sample tap".to_string()))?;
    tap.set_sample_rate(sample_rate);

    log::info!(
        "Opening {} ({} Hz, {} channels{})",
        device_name,
        sample_rate,
        channels,
        if is_loopback { ", loopback" } else { "" }
    );

    let stream_config: StreamConfig = config.clone().into();
    let stream = match config.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, tap, channels, track.clone()),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, tap, channels, track.clone()),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, tap, channels, track.clone()),
        other => {
            return Err(DeviceError::Backend(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(build_error)?;

    Ok((stream, device_name))
}

/// Pick the device for `role`. The flag is true when an output device is
/// opened for loopback capture.
fn resolve_device(host: &Host, role: Role, requested: Option<&str>) -> Result<(Device, bool), DeviceError> {
    let find_input = |name: &str| -> Option<Device> {
        host.input_devices()
            .ok()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
    };
    let find_output = |name: &str| -> Option<Device> {
        host.output_devices()
            .ok()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
    };

    match (role, requested) {
        (Role::Microphone, Some(name)) => find_input(name)
            .map(|d| (d, false))
            .ok_or_else(|| DeviceError::NotFound(name.to_string())),
        (Role::Microphone, None) => host
            .default_input_device()
            .map(|d| (d, false))
            .ok_or_else(|| DeviceError::NotFound("no default input device".to_string())),
        (Role::System, Some(name)) => find_input(name)
            .map(|d| (d, false))
            .or_else(|| find_output(name).map(|d| (d, true)))
            .ok_or_else(|| DeviceError::NotFound(name.to_string())),
        (Role::System, None) => {
            let monitor = host.input_devices().ok().and_then(|mut devices| {
                devices.find(|d| d.name().map(|n| is_monitor_name(&n)).unwrap_or(false))
            });
            if let Some(device) = monitor {
                return Ok((device, false));
            }
            log::info!("No monitor source found, using default output device for loopback");
            host.default_output_device()
                .map(|d| (d, true))
                .ok_or_else(|| DeviceError::NotFound("no loopback-capable output device".to_string()))
        }
    }
}

/// Build an input stream that downmixes into the track's tap
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    tap: SampleTap,
    channels: usize,
    track: MediaTrack,
) -> Result<cpal::Stream, BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    let mut mono: Vec<f32> = Vec::new();

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            mono.clear();
            mono.extend(data.chunks(channels).map(|frame| {
                let sum: f32 = frame
                    .iter()
                    .map(|s| -> f32 { cpal::Sample::from_sample(*s) })
                    .sum();
                sum / channels as f32
            }));
            tap.push(&mono);
        },
        move |err| match err {
            StreamError::DeviceNotAvailable => {
                log::warn!("{} device disappeared, ending track", track.label());
                track.end();
            }
            other => log::error!("Audio stream error: {}", other),
        },
        None,
    )
}

fn build_error(err: BuildStreamError) -> DeviceError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            DeviceError::NotFound("device is no longer available".to_string())
        }
        BuildStreamError::BackendSpecific { err } if looks_like_permission(&err.description) => {
            DeviceError::PermissionDenied(err.description)
        }
        other => DeviceError::Backend(format!("Failed to build audio stream: {}", other)),
    }
}

fn looks_like_permission(description: &str) -> bool {
    let lower = description.to_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
}
