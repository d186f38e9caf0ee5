//! Multimic Audio Capture
//!
//! Synchronous, chunked capture from several input devices at once.
//!
//! ## Features
//!
//! - Host device enumeration with input/output channel counts
//! - One cpal input stream per selected device, fixed 16-bit PCM format
//! - Blocking chunk reads backed by a ring buffer per stream
//! - Sequential (round-robin) or barrier-aligned capture across streams
//!
//! ## Architecture
//!
//! ```text
//! Audio Device (cpal callback)
//!   │
//!   ├─> PcmWriter ──(ringbuf)──> PcmReader
//!   │                              │
//!   │                              └─> read_exact(chunk) (blocking)
//!   │
//!   └─> MultiStreamCapturer
//!         │
//!         └─> CaptureBuffer per device (raw i16 LE bytes)
//! ```

pub mod buffer;
pub mod capture;
pub mod device;
pub mod error;
pub mod stream;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use buffer::{pcm_channel, FaultNotifier, PcmReader, PcmWriter};
pub use capture::{Capture, CaptureBuffer, CaptureMode, MultiStreamCapturer};
pub use device::DeviceInfo;
pub use error::{AudioError, Result};
pub use stream::{AudioBackend, AudioHost, InputStream, OpenedStream};

use serde::{Deserialize, Serialize};

/// Default capture sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default frames per blocking read
pub const DEFAULT_CHUNK_FRAMES: usize = 512;

/// Default recording length in seconds
pub const DEFAULT_RECORD_SECONDS: f64 = 1.0;

/// Bytes per sample. Capture is always 16-bit signed PCM.
pub const SAMPLE_WIDTH_BYTES: usize = 2;

/// Largest per-device capture buffer a format may ask for (1 GiB)
pub const MAX_CAPTURE_BYTES: usize = 1 << 30;

/// Capture format shared by every stream in a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureFormat {
    /// Frames per second (default: 44100 Hz)
    pub sample_rate: u32,
    /// Channels per frame (default: 1 = mono)
    pub channels: u16,
    /// Frames per read (default: 512)
    pub chunk_frames: usize,
    /// Recording length (default: 1.0 s)
    pub record_seconds: f64,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            record_seconds: DEFAULT_RECORD_SECONDS,
        }
    }
}

impl CaptureFormat {
    /// Number of read iterations: `ceil(sample_rate / chunk_frames * record_seconds)`
    pub fn iterations(&self) -> usize {
        if self.chunk_frames == 0
            || !self.record_seconds.is_finite()
            || self.record_seconds <= 0.0
        {
            return 0;
        }
        (self.sample_rate as f64 / self.chunk_frames as f64 * self.record_seconds).ceil() as usize
    }

    /// Samples per chunk across all channels
    pub fn chunk_samples(&self) -> usize {
        self.chunk_frames.saturating_mul(self.channels as usize)
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_samples().saturating_mul(SAMPLE_WIDTH_BYTES)
    }

    /// Total bytes a single device produces over a full recording
    pub fn capture_bytes(&self) -> usize {
        self.checked_capture_bytes().unwrap_or(usize::MAX)
    }

    /// Like [`capture_bytes`](Self::capture_bytes), `None` on overflow
    pub fn checked_capture_bytes(&self) -> Option<usize> {
        self.chunk_frames
            .checked_mul(self.channels as usize)?
            .checked_mul(SAMPLE_WIDTH_BYTES)?
            .checked_mul(self.iterations())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::invalid_config("sample_rate must be greater than 0"));
        }
        if self.channels == 0 {
            return Err(AudioError::invalid_config("channels must be greater than 0"));
        }
        if self.chunk_frames == 0 {
            return Err(AudioError::invalid_config("chunk_frames must be greater than 0"));
        }
        if !self.record_seconds.is_finite() || self.record_seconds < 0.0 {
            return Err(AudioError::invalid_config(format!(
                "record_seconds must be a non-negative number, got {}",
                self.record_seconds
            )));
        }

        let chunk_fits = self.chunk_bytes() <= MAX_CAPTURE_BYTES;
        match self.checked_capture_bytes() {
            Some(bytes) if chunk_fits && bytes <= MAX_CAPTURE_BYTES => Ok(()),
            _ => Err(AudioError::invalid_config(format!(
                "{} s at {} Hz x {} channel(s) exceeds the {} MiB per-device limit",
                self.record_seconds,
                self.sample_rate,
                self.channels,
                MAX_CAPTURE_BYTES >> 20
            ))),
        }
    }
}
