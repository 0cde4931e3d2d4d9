//! Capture source modes and device enumeration

use clap::ValueEnum;
use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which live audio the pipeline listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Input device only
    Microphone,

    /// System / display audio only
    System,

    /// Microphone and system audio summed into one analysis
    Both,
}

impl CaptureSource {
    pub fn includes_microphone(self) -> bool {
        matches!(self, CaptureSource::Microphone | CaptureSource::Both)
    }

    pub fn includes_system(self) -> bool {
        matches!(self, CaptureSource::System | CaptureSource::Both)
    }

    /// Number of streams this mode acquires
    pub fn stream_count(self) -> usize {
        usize::from(self.includes_microphone()) + usize::from(self.includes_system())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaptureSource::Microphone => "microphone",
            CaptureSource::System => "system",
            CaptureSource::Both => "both",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture device information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name as reported by the host
    pub name: String,

    /// What the device can be used for
    pub kind: DeviceKind,

    /// Whether this is the host default for its kind
    pub is_default: bool,
}

/// How a device is captured
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Input device (microphone)
    Microphone,

    /// Monitor input or loopback-capable output
    SystemLoopback,
}

/// Audio source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to enumerate devices: {0}")]
    EnumerationError(String),
}

/// Whether an input device name is a PulseAudio / PipeWire monitor source
pub(crate) fn is_monitor_name(name: &str) -> bool {
    name.to_lowercase().contains("monitor")
}

/// List devices usable for microphone or system capture
pub fn list_sources() -> Result<Vec<DeviceInfo>, SourceError> {
    let host = cpal::default_host();
    let mut sources = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    let inputs = host
        .input_devices()
        .map_err(|e| SourceError::EnumerationError(e.to_string()))?;
    for device in inputs {
        let Ok(name) = device.name() else { continue };
        let kind = if is_monitor_name(&name) {
            DeviceKind::SystemLoopback
        } else {
            DeviceKind::Microphone
        };
        sources.push(DeviceInfo {
            is_default: default_input.as_deref() == Some(name.as_str()),
            name,
            kind,
        });
    }

    // Output devices double as loopback sources on hosts that support it
    match host.output_devices() {
        Ok(outputs) => {
            for device in outputs {
                let Ok(name) = device.name() else { continue };
                sources.push(DeviceInfo {
                    is_default: default_output.as_deref() == Some(name.as_str()),
                    name,
                    kind: DeviceKind::SystemLoopback,
                });
            }
        }
        Err(e) => log::warn!("Failed to enumerate output devices: {}", e),
    }

    Ok(sources)
}
