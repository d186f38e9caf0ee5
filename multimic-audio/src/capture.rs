//! Multi-stream capture
//!
//! Opens one input stream per selected device and reads a fixed number of
//! chunks from each. Every stream is stopped when the capturer finishes or is
//! dropped, so an error part-way through never leaves a device open.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::buffer::PcmReader;
use crate::device::DeviceInfo;
use crate::error::{AudioError, Result};
use crate::stream::{AudioBackend, InputStream};
use crate::CaptureFormat;

/// How reads are scheduled across streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// One thread reads a chunk from each stream in turn
    #[default]
    Sequential,
    /// One worker per stream; all workers start each chunk together
    Aligned,
}

/// Append-only capture of fixed-size chunks, stored as i16 little-endian bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    chunk_bytes: usize,
}

impl CaptureBuffer {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            data: Vec::new(),
            chunk_bytes,
        }
    }

    /// Preallocate room for `chunks` chunks, or nothing if that overflows
    pub fn with_capacity(chunk_bytes: usize, chunks: usize) -> Self {
        Self {
            data: Vec::with_capacity(chunk_bytes.checked_mul(chunks).unwrap_or(0)),
            chunk_bytes,
        }
    }

    pub fn push_chunk(&mut self, samples: &[i16]) {
        debug_assert_eq!(samples.len() * 2, self.chunk_bytes);
        self.data.reserve(samples.len() * 2);
        for sample in samples {
            self.data.extend_from_slice(&sample.to_le_bytes());
        }
    }

    pub fn chunk_count(&self) -> usize {
        if self.chunk_bytes == 0 {
            0
        } else {
            self.data.len() / self.chunk_bytes
        }
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Chunks in capture order
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.chunk_bytes.max(1))
    }

    /// All chunks concatenated
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the buffer back into samples
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}

/// Finished capture for one device
#[derive(Debug, Clone)]
pub struct Capture {
    pub device: DeviceInfo,
    pub buffer: CaptureBuffer,
    /// Samples the host delivered while the queue was full
    pub dropped_samples: usize,
}

struct CaptureSession {
    device: DeviceInfo,
    stream: Box<dyn InputStream>,
    reader: PcmReader,
    buffer: CaptureBuffer,
    stopped: bool,
}

impl CaptureSession {
    fn read_chunk(&mut self, chunk: &mut [i16]) -> Result<()> {
        self.reader.read_exact(chunk)?;
        self.buffer.push_chunk(chunk);
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(e) = self.stream.stop() {
            warn!(device = %self.device.name, "Failed to stop stream cleanly: {}", e);
        }
    }
}

/// Owns every open capture stream for one recording
pub struct MultiStreamCapturer {
    format: CaptureFormat,
    sessions: Vec<CaptureSession>,
}

impl MultiStreamCapturer {
    /// Open a stream on each device, in the order given
    ///
    /// If any device fails to open, streams opened before it are stopped
    /// before the error is returned.
    pub fn open<B: AudioBackend + ?Sized>(
        backend: &B,
        devices: &[DeviceInfo],
        format: CaptureFormat,
    ) -> Result<Self> {
        format.validate()?;

        let mut capturer = Self {
            format,
            sessions: Vec::with_capacity(devices.len()),
        };

        for device in devices {
            if !device.is_input() {
                return Err(AudioError::NoInputChannels(device.index));
            }

            let opened = backend.open_input(device, &format).map_err(|e| {
                error!(device = %device.name, "Failed to open input stream: {}", e);
                e
            })?;

            capturer.sessions.push(CaptureSession {
                device: device.clone(),
                stream: opened.stream,
                reader: opened.reader,
                buffer: CaptureBuffer::with_capacity(format.chunk_bytes(), format.iterations()),
                stopped: false,
            });
        }

        debug!(streams = capturer.sessions.len(), "Capture streams open");
        Ok(capturer)
    }

    pub fn stream_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn format(&self) -> &CaptureFormat {
        &self.format
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.sessions.iter().map(|s| &s.device)
    }

    /// Read `format.iterations()` chunks from every stream
    ///
    /// The first read error aborts the recording and is returned. Streams stay
    /// open until [`finish`](Self::finish) or drop.
    pub fn record(&mut self, mode: CaptureMode) -> Result<()> {
        let iterations = self.format.iterations();
        if self.sessions.is_empty() || iterations == 0 {
            debug!("Nothing to record");
            return Ok(());
        }

        info!(
            streams = self.sessions.len(),
            iterations,
            mode = ?mode,
            "Recording {} chunk(s) of {} frames",
            iterations,
            self.format.chunk_frames
        );

        match mode {
            CaptureMode::Sequential => self.record_sequential(iterations),
            CaptureMode::Aligned => self.record_aligned(iterations),
        }
    }

    fn record_sequential(&mut self, iterations: usize) -> Result<()> {
        let mut chunk = vec![0i16; self.format.chunk_samples()];

        for iteration in 0..iterations {
            for session in self.sessions.iter_mut() {
                if let Err(e) = session.read_chunk(&mut chunk) {
                    error!(
                        device = %session.device.name,
                        iteration,
                        "Read failed, aborting recording: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn record_aligned(&mut self, iterations: usize) -> Result<()> {
        let chunk_samples = self.format.chunk_samples();
        let barrier = Barrier::new(self.sessions.len());
        let abort = AtomicBool::new(false);

        let results: Vec<Result<()>> = thread::scope(|scope| {
            let mut workers = Vec::with_capacity(self.sessions.len());

            for session in self.sessions.iter_mut() {
                let CaptureSession {
                    device,
                    reader,
                    buffer,
                    ..
                } = session;
                let device: &DeviceInfo = device;
                let barrier = &barrier;
                let abort = &abort;

                let worker = scope.spawn(move || {
                    aligned_worker(
                        device,
                        reader,
                        buffer,
                        chunk_samples,
                        iterations,
                        barrier,
                        abort,
                    )
                });
                workers.push((device.name.clone(), worker));
            }

            workers
                .into_iter()
                .map(|(name, worker)| {
                    worker.join().unwrap_or_else(|_| {
                        Err(AudioError::stream(format!("Capture worker for {} panicked", name)))
                    })
                })
                .collect()
        });

        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    /// Stop every stream and hand back the captured audio, in open order
    pub fn finish(mut self) -> Vec<Capture> {
        let sessions = std::mem::take(&mut self.sessions);
        let mut captures = Vec::with_capacity(sessions.len());

        for mut session in sessions {
            session.stop();

            let dropped_samples = session.reader.dropped();
            if dropped_samples > 0 {
                warn!(
                    device = %session.device.name,
                    "Dropped {} samples while the queue was full",
                    dropped_samples
                );
            }

            captures.push(Capture {
                device: session.device,
                buffer: session.buffer,
                dropped_samples,
            });
        }

        info!(streams = captures.len(), "All capture streams closed");
        captures
    }
}

impl Drop for MultiStreamCapturer {
    fn drop(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        for session in self.sessions.iter_mut() {
            session.stop();
        }
        debug!(streams = self.sessions.len(), "Released capture streams");
    }
}

/// Every worker meets the barrier once per iteration, even after an abort,
/// so no peer is left waiting.
fn aligned_worker(
    device: &DeviceInfo,
    reader: &mut PcmReader,
    buffer: &mut CaptureBuffer,
    chunk_samples: usize,
    iterations: usize,
    barrier: &Barrier,
    abort: &AtomicBool,
) -> Result<()> {
    let mut chunk = vec![0i16; chunk_samples];
    let mut failure = None;

    for iteration in 0..iterations {
        barrier.wait();
        if abort.load(Ordering::Acquire) {
            continue;
        }

        match reader.read_exact(&mut chunk) {
            Ok(()) => buffer.push_chunk(&chunk),
            Err(e) => {
                error!(
                    device = %device.name,
                    iteration,
                    "Read failed, aborting recording: {}",
                    e
                );
                abort.store(true, Ordering::Release);
                failure = Some(e);
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_sample, input_device, FakeBackend};

    fn short_format() -> CaptureFormat {
        CaptureFormat {
            sample_rate: 8_000,
            channels: 1,
            chunk_frames: 256,
            record_seconds: 0.25,
        }
    }

    #[test]
    fn test_capture_buffer_chunks() {
        let mut buffer = CaptureBuffer::new(4);
        buffer.push_chunk(&[1, -1]);
        buffer.push_chunk(&[256, 0]);

        assert_eq!(buffer.chunk_count(), 2);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.chunks().next().unwrap(), &[1, 0, 0xff, 0xff]);
        assert_eq!(buffer.samples().collect::<Vec<_>>(), vec![1, -1, 256, 0]);
    }

    #[test]
    fn test_sequential_capture_sizes() {
        let backend = FakeBackend::with_inputs(3);
        let devices = backend.device_list();
        let format = CaptureFormat::default();

        let mut capturer = MultiStreamCapturer::open(&backend, &devices, format).unwrap();
        assert_eq!(capturer.stream_count(), 3);
        capturer.record(CaptureMode::Sequential).unwrap();

        let captures = capturer.finish();
        assert_eq!(captures.len(), 3);
        for capture in &captures {
            assert_eq!(capture.buffer.len(), 89_088);
            assert_eq!(capture.buffer.chunk_count(), 87);
        }
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_captures_keep_device_order_and_data() {
        let backend = FakeBackend::with_inputs(2);
        let devices = backend.device_list();

        let mut capturer = MultiStreamCapturer::open(&backend, &devices, short_format()).unwrap();
        capturer.record(CaptureMode::Sequential).unwrap();
        let captures = capturer.finish();

        for (capture, device) in captures.iter().zip(&devices) {
            assert_eq!(capture.device, *device);
            let first: Vec<i16> = capture.buffer.samples().take(3).collect();
            let expected: Vec<i16> = (0..3).map(|i| fake_sample(device.index, i)).collect();
            assert_eq!(first, expected);
        }
    }

    #[test]
    fn test_aligned_capture_matches_sequential() {
        let backend = FakeBackend::with_inputs(3);
        let devices = backend.device_list();
        let format = short_format();

        let mut sequential = MultiStreamCapturer::open(&backend, &devices, format).unwrap();
        sequential.record(CaptureMode::Sequential).unwrap();
        let sequential = sequential.finish();

        let mut aligned = MultiStreamCapturer::open(&backend, &devices, format).unwrap();
        aligned.record(CaptureMode::Aligned).unwrap();
        let aligned = aligned.finish();

        assert_eq!(aligned.len(), sequential.len());
        for (a, s) in aligned.iter().zip(&sequential) {
            assert_eq!(a.buffer, s.buffer);
            assert_eq!(a.buffer.len(), format.capture_bytes());
        }
    }

    #[test]
    fn test_oversized_format_opens_nothing() {
        let backend = FakeBackend::with_inputs(2);
        let devices = backend.device_list();
        let format = CaptureFormat {
            record_seconds: 1e15,
            ..Default::default()
        };

        let err = MultiStreamCapturer::open(&backend, &devices, format).err().unwrap();
        assert!(matches!(err, AudioError::InvalidConfig(_)));
        assert!(backend.opened().is_empty());
    }

    #[test]
    fn test_no_devices_opens_nothing() {
        let backend = FakeBackend::with_inputs(2);

        let mut capturer =
            MultiStreamCapturer::open(&backend, &[], CaptureFormat::default()).unwrap();
        assert_eq!(capturer.stream_count(), 0);
        capturer.record(CaptureMode::Aligned).unwrap();
        assert!(capturer.finish().is_empty());
        assert!(backend.opened().is_empty());
    }

    #[test]
    fn test_read_failure_releases_every_stream() {
        let backend = FakeBackend::with_inputs(3).fail_read_after(1, 10);
        let devices = backend.device_list();

        let mut capturer =
            MultiStreamCapturer::open(&backend, &devices, CaptureFormat::default()).unwrap();
        let err = capturer.record(CaptureMode::Sequential).unwrap_err();
        assert!(matches!(err, AudioError::StreamError(_)));
        assert_eq!(backend.open_streams(), 3);

        drop(capturer);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_aligned_read_failure_does_not_deadlock() {
        let backend = FakeBackend::with_inputs(3).fail_read_after(2, 3);
        let devices = backend.device_list();

        let mut capturer = MultiStreamCapturer::open(&backend, &devices, short_format()).unwrap();
        let err = capturer.record(CaptureMode::Aligned).unwrap_err();
        assert!(err.to_string().contains("device unplugged"));

        drop(capturer);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_open_failure_releases_earlier_streams() {
        let backend = FakeBackend::with_inputs(3).fail_open(2);
        let devices = backend.device_list();

        let result = MultiStreamCapturer::open(&backend, &devices, CaptureFormat::default());
        assert!(matches!(result, Err(AudioError::DeviceError(_))));
        assert_eq!(backend.opened(), vec![0, 1]);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_output_only_device_rejected() {
        let backend = FakeBackend::new(vec![input_device(0, "Speakers", 0)]);
        let devices = backend.device_list();

        let result = MultiStreamCapturer::open(&backend, &devices, CaptureFormat::default());
        assert!(matches!(result, Err(AudioError::NoInputChannels(0))));
    }

    #[test]
    fn test_invalid_format_rejected_before_opening() {
        let backend = FakeBackend::with_inputs(1);
        let devices = backend.device_list();
        let format = CaptureFormat {
            chunk_frames: 0,
            ..Default::default()
        };

        assert!(MultiStreamCapturer::open(&backend, &devices, format).is_err());
        assert!(backend.opened().is_empty());
    }
}
