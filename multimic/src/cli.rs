//! Command-line arguments and device listing

use anyhow::Result;
use clap::Parser;
use multimic_audio::{CaptureMode, DeviceInfo};
use std::io::Write;
use std::path::PathBuf;

use crate::config::RecorderConfig;

/// Record a fixed-length clip from several input devices at once
#[derive(Parser, Debug)]
#[command(name = "multimic", version)]
pub struct Args {
    /// List audio devices and exit
    #[arg(short, long)]
    pub list: bool,

    /// Print the device list as JSON (with --list)
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Record this device without prompting (repeatable)
    #[arg(short = 'd', long = "device", value_name = "INDEX")]
    pub devices: Vec<usize>,

    /// Recording length in seconds
    #[arg(short, long, value_name = "SECS")]
    pub seconds: Option<f64>,

    /// Sample rate in Hz
    #[arg(short = 'r', long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Channels per file
    #[arg(long)]
    pub channels: Option<u16>,

    /// Frames per read
    #[arg(long, value_name = "FRAMES")]
    pub chunk_frames: Option<usize>,

    /// Directory to write recordings into
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// File name prefix; files are named <PREFIX>-<N>.wav
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Read every device on its own thread, starting each chunk together
    #[arg(long)]
    pub aligned: bool,

    /// Config file (default: platform config dir)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    pub init_config: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Command-line values take precedence over the config file
    pub fn apply(&self, config: &mut RecorderConfig) {
        if !self.devices.is_empty() {
            config.devices = self.devices.clone();
        }
        if let Some(seconds) = self.seconds {
            config.capture.record_seconds = seconds;
        }
        if let Some(rate) = self.sample_rate {
            config.capture.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            config.capture.channels = channels;
        }
        if let Some(frames) = self.chunk_frames {
            config.capture.chunk_frames = frames;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.output_prefix = prefix.clone();
        }
        if self.aligned {
            config.capture_mode = CaptureMode::Aligned;
        }
    }
}

/// Print the device table (matches the interactive selector's indices)
pub fn print_devices<W: Write>(devices: &[DeviceInfo], out: &mut W) -> Result<()> {
    writeln!(out, "\n{}", "=".repeat(78))?;
    writeln!(out, "Available Audio Devices:")?;
    writeln!(out, "{}\n", "=".repeat(78))?;

    for device in devices {
        let mut type_parts = Vec::new();
        if device.max_input_channels > 0 {
            type_parts.push("INPUT");
        }
        if device.max_output_channels > 0 {
            type_parts.push("OUTPUT");
        }

        let type_str = type_parts.join("/");
        let default_marker = if device.is_default { " [DEFAULT INPUT]" } else { "" };

        writeln!(out, "{:3}: {}", device.index, device.name)?;
        writeln!(out, "     Type: {}{}", type_str, default_marker)?;
        writeln!(
            out,
            "     Channels: IN={}, OUT={}",
            device.max_input_channels, device.max_output_channels
        )?;
        writeln!(out, "     Sample Rate: {} Hz\n", device.default_sample_rate)?;
    }

    writeln!(out, "{}", "=".repeat(78))?;
    Ok(())
}

pub fn print_devices_json<W: Write>(devices: &[DeviceInfo], out: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, devices)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mic() -> DeviceInfo {
        DeviceInfo {
            index: 3,
            name: "USB Mic".to_string(),
            is_default: true,
            max_input_channels: 1,
            max_output_channels: 2,
            default_sample_rate: 48_000,
        }
    }

    #[test]
    fn test_overrides_apply() {
        let args = Args::try_parse_from([
            "multimic", "-d", "2", "-d", "5", "-s", "2.5", "-r", "48000", "-p", "take", "--aligned",
        ])
        .unwrap();

        let mut config = RecorderConfig::default();
        args.apply(&mut config);

        assert_eq!(config.devices, vec![2, 5]);
        assert_eq!(config.capture.record_seconds, 2.5);
        assert_eq!(config.capture.sample_rate, 48_000);
        assert_eq!(config.output_prefix, "take");
        assert_eq!(config.capture_mode, CaptureMode::Aligned);
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let args = Args::try_parse_from(["multimic"]).unwrap();
        let mut config = RecorderConfig {
            devices: vec![1],
            capture_mode: CaptureMode::Aligned,
            ..Default::default()
        };
        let before = config.clone();
        args.apply(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_json_requires_list() {
        assert!(Args::try_parse_from(["multimic", "--json"]).is_err());
        assert!(Args::try_parse_from(["multimic", "--list", "--json"]).is_ok());
    }

    #[test]
    fn test_print_devices() {
        let mut out = Vec::new();
        print_devices(&[mic()], &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("  3: USB Mic"));
        assert!(out.contains("Type: INPUT/OUTPUT [DEFAULT INPUT]"));
        assert!(out.contains("Channels: IN=1, OUT=2"));
    }

    #[test]
    fn test_print_devices_json() {
        let mut out = Vec::new();
        print_devices_json(&[mic()], &mut out).unwrap();

        let parsed: Vec<DeviceInfo> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, vec![mic()]);
    }
}
