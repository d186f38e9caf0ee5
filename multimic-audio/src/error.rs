//! Error types for audio capture

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),

    #[error("Device index {index} out of range (host has {count} devices)")]
    InvalidDeviceIndex { index: usize, count: usize },

    #[error("Device {0} has no input channels")]
    NoInputChannels(usize),

    #[error("Unsupported format on {device}: {reason}")]
    UnsupportedFormat { device: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Stream closed before a full chunk was read")]
    StreamClosed,
}

impl AudioError {
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceError(msg.into())
    }

    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Self::StreamError(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn unsupported<D: Into<String>, R: Into<String>>(device: D, reason: R) -> Self {
        Self::UnsupportedFormat {
            device: device.into(),
            reason: reason.into(),
        }
    }
}
