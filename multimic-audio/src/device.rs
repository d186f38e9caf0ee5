//! Host device descriptors

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AudioError, Result};

/// Audio device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Position in the host's full device list
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: u32,
}

impl DeviceInfo {
    /// Whether the device can be recorded from
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }
}

/// Enumerate every device the host exposes, inputs and outputs alike
///
/// Indices are positions in `host.devices()`, so output-only devices still
/// occupy a slot.
pub fn enumerate(host: &Host) -> Result<Vec<DeviceInfo>> {
    let default_input = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .devices()
        .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?;

    let mut infos = Vec::new();
    for (index, device) in devices.enumerate() {
        let info = describe(index, &device, default_input.as_deref());
        debug!(
            index = info.index,
            name = %info.name,
            inputs = info.max_input_channels,
            outputs = info.max_output_channels,
            "Found audio device"
        );
        infos.push(info);
    }

    Ok(infos)
}

fn describe(index: usize, device: &Device, default_input: Option<&str>) -> DeviceInfo {
    let name = device
        .name()
        .unwrap_or_else(|_| format!("Unknown Device {}", index));

    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    let default_sample_rate = device
        .default_input_config()
        .map(|c| c.sample_rate().0)
        .unwrap_or(0);

    DeviceInfo {
        is_default: default_input == Some(name.as_str()),
        index,
        name,
        max_input_channels,
        max_output_channels,
        default_sample_rate,
    }
}

/// Look up a device by index, checking it can capture
pub fn find_input(devices: &[DeviceInfo], index: usize) -> Result<&DeviceInfo> {
    let device = devices.get(index).ok_or(AudioError::InvalidDeviceIndex {
        index,
        count: devices.len(),
    })?;

    if !device.is_input() {
        return Err(AudioError::NoInputChannels(index));
    }

    Ok(device)
}
