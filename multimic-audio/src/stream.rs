//! Input streams and the audio backend seam
//!
//! [`AudioHost`] is the cpal implementation. Each opened stream feeds a
//! [`PcmReader`] that the capturer drains with blocking chunk reads.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, FromSample, Host, Sample, SampleFormat, SampleRate, SizedSample, Stream,
    StreamConfig, SupportedBufferSize, SupportedStreamConfigRange,
};
use tracing::{debug, error, info, warn};

use crate::buffer::{pcm_channel, PcmReader, PcmWriter};
use crate::device::{self, DeviceInfo};
use crate::error::{AudioError, Result};
use crate::CaptureFormat;

/// Lifecycle handle of an open input stream
///
/// Handles stay on the thread that opened them; only the paired
/// [`PcmReader`] is moved between threads.
pub trait InputStream {
    /// Stop delivering audio and release the device
    fn stop(&mut self) -> Result<()>;
}

/// A freshly opened, already running input stream
pub struct OpenedStream {
    pub stream: Box<dyn InputStream>,
    pub reader: PcmReader,
}

/// Source of devices and input streams
pub trait AudioBackend {
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open and start a capture stream delivering `format`
    fn open_input(&self, device: &DeviceInfo, format: &CaptureFormat) -> Result<OpenedStream>;
}

/// Queue size for one stream: one second of audio, at least four chunks
pub fn queue_capacity(format: &CaptureFormat) -> usize {
    (format.sample_rate as usize)
        .saturating_mul(format.channels as usize)
        .max(format.chunk_samples().saturating_mul(4))
}

/// cpal host session
///
/// Owns the platform host for the duration of a run. Streams opened from it
/// are independent objects and must be stopped before the host is dropped.
pub struct AudioHost {
    host: Host,
}

impl AudioHost {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!(host = host.id().name(), "Audio host initialized");
        Self { host }
    }

    pub fn name(&self) -> &'static str {
        self.host.id().name()
    }

    fn device_at(&self, info: &DeviceInfo) -> Result<Device> {
        let mut devices = self
            .host
            .devices()
            .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?;

        let device = devices.nth(info.index).ok_or_else(|| {
            AudioError::device(format!("Device index {} not found", info.index))
        })?;

        let found = device
            .name()
            .unwrap_or_else(|_| format!("Unknown Device {}", info.index));
        check_same_device(info, &found)?;

        Ok(device)
    }
}

/// Refuse to open a different device than the one that was enumerated
///
/// Devices are addressed by position, so a hot-plug between enumeration and
/// opening shifts every later index.
fn check_same_device(info: &DeviceInfo, found: &str) -> Result<()> {
    if found != info.name {
        warn!(index = info.index, expected = %info.name, found, "Device list changed");
        return Err(AudioError::device(format!(
            "device list changed: index {} is now {:?}, expected {:?}",
            info.index, found, info.name
        )));
    }
    Ok(())
}

impl Default for AudioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioHost {
    fn drop(&mut self) {
        debug!(host = self.host.id().name(), "Audio host released");
    }
}

impl AudioBackend for AudioHost {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        device::enumerate(&self.host)
    }

    fn open_input(&self, info: &DeviceInfo, format: &CaptureFormat) -> Result<OpenedStream> {
        let device = self.device_at(info)?;

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| AudioError::device(format!("Failed to query {}: {}", info.name, e)))?
            .collect();

        let candidates: Vec<InputCandidate> = ranges.iter().map(InputCandidate::from).collect();
        let chosen = choose_config(&candidates, format).ok_or_else(|| {
            AudioError::unsupported(
                info.name.clone(),
                format!(
                    "no input config offers {} Hz with at least {} channel(s)",
                    format.sample_rate, format.channels
                ),
            )
        })?;
        let candidate = &candidates[chosen];

        let config = StreamConfig {
            channels: candidate.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: candidate.buffer_size_for(format.chunk_frames),
        };

        debug!(
            device = %info.name,
            source_channels = candidate.channels,
            sample_format = ?candidate.sample_format,
            buffer_size = ?config.buffer_size,
            "Selected input config"
        );

        let (writer, reader) = pcm_channel(queue_capacity(format));
        let target_channels = format.channels as usize;
        let name = info.name.clone();

        macro_rules! build {
            ($sample:ty) => {
                build_typed::<$sample>(&device, &config, target_channels, writer, name)?
            };
        }

        let stream = match candidate.sample_format {
            SampleFormat::I8 => build!(i8),
            SampleFormat::I16 => build!(i16),
            SampleFormat::I32 => build!(i32),
            SampleFormat::I64 => build!(i64),
            SampleFormat::U8 => build!(u8),
            SampleFormat::U16 => build!(u16),
            SampleFormat::U32 => build!(u32),
            SampleFormat::U64 => build!(u64),
            SampleFormat::F32 => build!(f32),
            SampleFormat::F64 => build!(f64),
            other => {
                return Err(AudioError::unsupported(
                    info.name.clone(),
                    format!("sample format {:?}", other),
                ))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::stream(format!("Failed to start stream: {}", e)))?;

        info!(
            index = info.index,
            device = %info.name,
            "Input stream opened ({} Hz, {} ch, {} frames/chunk)",
            format.sample_rate,
            format.channels,
            format.chunk_frames
        );

        Ok(OpenedStream {
            stream: Box::new(CpalInputStream {
                stream: Some(stream),
                name: info.name.clone(),
            }),
            reader,
        })
    }
}

fn build_typed<T>(
    device: &Device,
    config: &StreamConfig,
    target_channels: usize,
    mut writer: PcmWriter,
    name: String,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let source_channels = config.channels as usize;
    let faults = writer.fault_notifier();
    let mut scratch: Vec<i16> = Vec::with_capacity(writer.free_space());

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                interleave_to_i16(data, source_channels, target_channels, &mut scratch);
                writer.push(&scratch);
            },
            move |err| {
                error!(device = %name, "Audio stream error: {}", err);
                faults.fail(err.to_string());
            },
            None, // No timeout
        )
        .map_err(|e| AudioError::stream(format!("Failed to build stream: {}", e)))
}

/// Convert interleaved device samples to i16, keeping the first
/// `target_channels` of every frame
pub fn interleave_to_i16<T>(
    data: &[T],
    source_channels: usize,
    target_channels: usize,
    out: &mut Vec<i16>,
) where
    T: Sample,
    i16: FromSample<T>,
{
    if source_channels == target_channels {
        out.extend(data.iter().map(|&sample| sample.to_sample::<i16>()));
        return;
    }
    for frame in data.chunks(source_channels.max(1)) {
        out.extend(
            frame
                .iter()
                .take(target_channels)
                .map(|&sample| sample.to_sample::<i16>()),
        );
    }
}

struct CpalInputStream {
    stream: Option<Stream>,
    name: String,
}

impl InputStream for CpalInputStream {
    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let paused = stream.pause();
            drop(stream);
            debug!(device = %self.name, "Input stream closed");
            paused.map_err(|e| AudioError::stream(format!("Failed to stop stream: {}", e)))?;
        }
        Ok(())
    }
}

/// The parts of a supported input range that matter for stream selection
#[derive(Debug, Clone, PartialEq)]
pub struct InputCandidate {
    pub channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub sample_format: SampleFormat,
    /// Host buffer size bounds in frames, if the host reports them
    pub buffer_frames: Option<(u32, u32)>,
}

impl From<&SupportedStreamConfigRange> for InputCandidate {
    fn from(range: &SupportedStreamConfigRange) -> Self {
        let buffer_frames = match range.buffer_size() {
            SupportedBufferSize::Range { min, max } => Some((*min, *max)),
            SupportedBufferSize::Unknown => None,
        };

        Self {
            channels: range.channels(),
            min_sample_rate: range.min_sample_rate().0,
            max_sample_rate: range.max_sample_rate().0,
            sample_format: range.sample_format(),
            buffer_frames,
        }
    }
}

impl InputCandidate {
    fn supports_rate(&self, rate: u32) -> bool {
        self.min_sample_rate <= rate && rate <= self.max_sample_rate
    }

    /// Request a fixed host buffer of one chunk when the device allows it
    pub fn buffer_size_for(&self, chunk_frames: usize) -> BufferSize {
        match (self.buffer_frames, u32::try_from(chunk_frames)) {
            (Some((min, max)), Ok(frames)) if (min..=max).contains(&frames) => {
                BufferSize::Fixed(frames)
            }
            _ => BufferSize::Default,
        }
    }
}

fn is_convertible(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::I8
            | SampleFormat::I16
            | SampleFormat::I32
            | SampleFormat::I64
            | SampleFormat::U8
            | SampleFormat::U16
            | SampleFormat::U32
            | SampleFormat::U64
            | SampleFormat::F32
            | SampleFormat::F64
    )
}

/// Pick the input range to open for `format`
///
/// The range must contain the requested rate and offer at least the
/// requested channel count. Native i16 wins over conversion, then an exact
/// channel count, then the fewest surplus channels.
pub fn choose_config(candidates: &[InputCandidate], format: &CaptureFormat) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.supports_rate(format.sample_rate))
        .filter(|(_, c)| c.channels >= format.channels)
        .filter(|(_, c)| is_convertible(c.sample_format))
        .min_by_key(|(_, c)| {
            (
                c.sample_format != SampleFormat::I16,
                c.channels != format.channels,
                c.channels,
            )
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(channels: u16, rates: (u32, u32), sample_format: SampleFormat) -> InputCandidate {
        InputCandidate {
            channels,
            min_sample_rate: rates.0,
            max_sample_rate: rates.1,
            sample_format,
            buffer_frames: Some((64, 4096)),
        }
    }

    #[test]
    fn test_prefers_native_i16() {
        let candidates = vec![
            candidate(1, (8_000, 96_000), SampleFormat::F32),
            candidate(2, (8_000, 96_000), SampleFormat::I16),
        ];
        assert_eq!(choose_config(&candidates, &CaptureFormat::default()), Some(1));
    }

    #[test]
    fn test_prefers_exact_channel_count() {
        let candidates = vec![
            candidate(4, (44_100, 44_100), SampleFormat::I16),
            candidate(1, (44_100, 44_100), SampleFormat::I16),
            candidate(2, (44_100, 44_100), SampleFormat::I16),
        ];
        assert_eq!(choose_config(&candidates, &CaptureFormat::default()), Some(1));
    }

    #[test]
    fn test_rate_must_be_in_range() {
        let candidates = vec![candidate(1, (48_000, 48_000), SampleFormat::I16)];
        assert_eq!(choose_config(&candidates, &CaptureFormat::default()), None);
    }

    #[test]
    fn test_too_few_channels() {
        let candidates = vec![candidate(1, (44_100, 44_100), SampleFormat::I16)];
        let format = CaptureFormat {
            channels: 2,
            ..Default::default()
        };
        assert_eq!(choose_config(&candidates, &format), None);
    }

    #[test]
    fn test_fixed_buffer_only_within_bounds() {
        let c = candidate(1, (44_100, 44_100), SampleFormat::I16);
        assert_eq!(c.buffer_size_for(512), BufferSize::Fixed(512));
        assert_eq!(c.buffer_size_for(8192), BufferSize::Default);

        let unknown = InputCandidate {
            buffer_frames: None,
            ..c
        };
        assert_eq!(unknown.buffer_size_for(512), BufferSize::Default);
    }

    #[test]
    fn test_f32_stereo_to_mono_keeps_first_channel() {
        let data = [1.0f32, 0.5, -1.0, 0.25, 0.0, -0.5];
        let mut out = Vec::new();
        interleave_to_i16(&data, 2, 1, &mut out);
        assert_eq!(out, vec![i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn test_u16_is_recentred() {
        let data = [0u16, 32_768, 65_535];
        let mut out = Vec::new();
        interleave_to_i16(&data, 1, 1, &mut out);
        assert_eq!(out, vec![i16::MIN, 0, i16::MAX]);
    }

    #[test]
    fn test_i16_passes_through_and_appends() {
        let mut out = vec![7];
        interleave_to_i16(&[1i16, 2, 3, 4, 5, 6], 3, 2, &mut out);
        assert_eq!(out, vec![7, 1, 2, 4, 5]);
    }

    #[test]
    fn test_renamed_device_is_refused() {
        let info = DeviceInfo {
            index: 2,
            name: "USB Mic".to_string(),
            is_default: false,
            max_input_channels: 1,
            max_output_channels: 0,
            default_sample_rate: 44_100,
        };
        assert!(check_same_device(&info, "USB Mic").is_ok());

        let err = check_same_device(&info, "HDMI Out").unwrap_err();
        assert!(matches!(err, AudioError::DeviceError(_)));
        assert!(err.to_string().contains("index 2 is now \"HDMI Out\""));
    }

    #[test]
    fn test_queue_capacity_holds_a_second() {
        let format = CaptureFormat::default();
        assert_eq!(queue_capacity(&format), 44_100);

        let tiny = CaptureFormat {
            sample_rate: 100,
            chunk_frames: 512,
            ..Default::default()
        };
        assert_eq!(queue_capacity(&tiny), 2048);
    }
}
