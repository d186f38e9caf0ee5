//! In-memory audio backend for tests
//!
//! Streams are pre-filled with a deterministic pattern so captures can be
//! checked sample by sample without hardware.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::buffer::{pcm_channel, PcmWriter};
use crate::device::DeviceInfo;
use crate::error::{AudioError, Result};
use crate::stream::{AudioBackend, InputStream, OpenedStream};
use crate::CaptureFormat;

#[derive(Debug, Clone, Copy)]
enum Fault {
    Open,
    ReadAfter(usize),
}

/// Sample at `position` of the fake stream for `device_index`
pub fn fake_sample(device_index: usize, position: usize) -> i16 {
    ((position % 200) as i16 - 100) * (device_index as i16 + 1)
}

/// Convenience constructor for a device descriptor
pub fn input_device(index: usize, name: &str, max_input_channels: u16) -> DeviceInfo {
    DeviceInfo {
        index,
        name: name.to_string(),
        is_default: index == 0,
        max_input_channels,
        max_output_channels: 0,
        default_sample_rate: crate::DEFAULT_SAMPLE_RATE,
    }
}

pub struct FakeBackend {
    devices: Vec<DeviceInfo>,
    faults: HashMap<usize, Fault>,
    open_streams: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<usize>>>,
}

impl FakeBackend {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            faults: HashMap::new(),
            open_streams: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `count` mono input devices named "Mic N"
    pub fn with_inputs(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| input_device(i, &format!("Mic {}", i), 1))
                .collect(),
        )
    }

    /// Opening `index` fails
    pub fn fail_open(mut self, index: usize) -> Self {
        self.faults.insert(index, Fault::Open);
        self
    }

    /// Stream `index` delivers `chunks` chunks, then reports a disconnect
    pub fn fail_read_after(mut self, index: usize, chunks: usize) -> Self {
        self.faults.insert(index, Fault::ReadAfter(chunks));
        self
    }

    pub fn device_list(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    /// Streams opened and not yet stopped
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Device indices in the order they were opened
    pub fn opened(&self) -> Vec<usize> {
        self.opened.lock().clone()
    }
}

impl AudioBackend for FakeBackend {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn open_input(&self, device: &DeviceInfo, format: &CaptureFormat) -> Result<OpenedStream> {
        let fault = self.faults.get(&device.index).copied();
        if let Some(Fault::Open) = fault {
            return Err(AudioError::device(format!("{} is busy", device.name)));
        }

        let chunks = match fault {
            Some(Fault::ReadAfter(n)) => n.min(format.iterations()),
            _ => format.iterations(),
        };
        let total = chunks * format.chunk_samples();

        let (mut writer, reader) = pcm_channel(total.max(format.chunk_samples()).max(1));
        let samples: Vec<i16> = (0..total).map(|i| fake_sample(device.index, i)).collect();
        writer.push(&samples);

        if let Some(Fault::ReadAfter(_)) = fault {
            writer.fault_notifier().fail("device unplugged");
        }

        self.opened.lock().push(device.index);
        self.open_streams.fetch_add(1, Ordering::SeqCst);

        Ok(OpenedStream {
            stream: Box::new(FakeStream {
                writer: Some(writer),
                open_streams: Arc::clone(&self.open_streams),
            }),
            reader,
        })
    }
}

struct FakeStream {
    writer: Option<PcmWriter>,
    open_streams: Arc<AtomicUsize>,
}

impl InputStream for FakeStream {
    fn stop(&mut self) -> Result<()> {
        if self.writer.take().is_some() {
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
