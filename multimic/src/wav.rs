//! WAV output via hound

use anyhow::{Context, Result};
use hound::{WavSpec, WavWriter};
use multimic_audio::{Capture, CaptureBuffer, CaptureFormat, SAMPLE_WIDTH_BYTES};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header for every recording: integer PCM at the capture rate and channel count
pub fn wav_spec(format: &CaptureFormat) -> WavSpec {
    WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: (SAMPLE_WIDTH_BYTES * 8) as u16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write one capture buffer as a complete WAV file
pub fn write_buffer(path: &Path, format: &CaptureFormat, buffer: &CaptureBuffer) -> Result<()> {
    let mut writer = WavWriter::create(path, wav_spec(format))
        .with_context(|| format!("Failed to create WAV file {}", path.display()))?;

    for sample in buffer.samples() {
        writer
            .write_sample(sample)
            .with_context(|| format!("Failed to write audio data to {}", path.display()))?;
    }

    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;

    debug!(path = %path.display(), bytes = buffer.len(), "WAV written");
    Ok(())
}

/// Write each capture to `<dir>/<prefix>-<ordinal>.wav`
///
/// Ordinals follow the order of `captures`, not device indices.
pub fn write_captures(
    dir: &Path,
    prefix: &str,
    format: &CaptureFormat,
    captures: &[Capture],
) -> Result<Vec<PathBuf>> {
    if captures.is_empty() {
        return Ok(Vec::new());
    }

    let dir = multimic_paths::ensure_output_dir(dir)?;
    let mut paths = Vec::with_capacity(captures.len());

    for (ordinal, capture) in captures.iter().enumerate() {
        let path = multimic_paths::recording_path(&dir, prefix, ordinal);
        write_buffer(&path, format, &capture.buffer)?;
        info!(
            device = %capture.device.name,
            path = %path.display(),
            "Saved recording"
        );
        paths.push(path);
    }

    Ok(paths)
}
