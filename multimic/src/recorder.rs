//! Capture → WAV orchestration for one recording

use anyhow::{Context, Result};
use multimic_audio::{AudioBackend, DeviceInfo, MultiStreamCapturer};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::config::RecorderConfig;
use crate::selector::Selection;
use crate::wav;

/// What one device produced
#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub device: DeviceInfo,
    pub path: PathBuf,
    pub bytes: usize,
    pub dropped_samples: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingReport {
    pub devices: Vec<DeviceReport>,
}

impl RecordingReport {
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.devices.iter().map(|d| &d.path)
    }
}

/// Record every selected device and write one WAV per device
///
/// Status lines go to `status`. Streams are released before any file is
/// written, and also when capture fails.
pub fn record<B, W>(
    backend: &B,
    devices: &[DeviceInfo],
    selection: &Selection,
    config: &RecorderConfig,
    status: &mut W,
) -> Result<RecordingReport>
where
    B: AudioBackend + ?Sized,
    W: Write,
{
    let selected = selection.devices(devices);

    let mut capturer = MultiStreamCapturer::open(backend, &selected, config.capture)
        .context("Failed to open input streams")?;

    writeln!(status, "Recording started with {} devices", capturer.stream_count())?;

    capturer
        .record(config.capture_mode)
        .context("Recording failed")?;
    let captures = capturer.finish();

    writeln!(status, "Recording finished")?;

    let paths = wav::write_captures(
        &config.output_dir,
        &config.output_prefix,
        &config.capture,
        &captures,
    )
    .context("Failed to save recordings")?;

    let mut report = RecordingReport::default();
    for (capture, path) in captures.into_iter().zip(paths) {
        writeln!(status, "Saved {}", path.display())?;
        report.devices.push(DeviceReport {
            bytes: capture.buffer.len(),
            dropped_samples: capture.dropped_samples,
            device: capture.device,
            path,
        });
    }

    info!(files = report.devices.len(), "Recording complete");
    Ok(report)
}
