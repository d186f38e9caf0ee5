//! SPSC PCM queue with blocking chunk reads
//!
//! The audio callback pushes without locking while no reader is parked. The
//! mutex is only taken to hand a wake-up to a reader that is waiting.

use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AudioError, Result};

/// Upper bound on a single condvar wait. Readers re-check the queue after each slice.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct StreamState {
    failure: Option<String>,
    closed: bool,
}

struct Shared {
    state: Mutex<StreamState>,
    ready: Condvar,
    /// Set by the reader, under the lock, right before it parks
    parked: AtomicBool,
    dropped: AtomicUsize,
}

impl Shared {
    fn wake_if_parked(&self) {
        // Pairs with the fence in `read_exact`: either the reader sees our
        // samples on its re-check, or we see `parked` and notify.
        fence(Ordering::SeqCst);
        if self.parked.load(Ordering::Relaxed) {
            let _guard = self.state.lock();
            self.ready.notify_all();
        }
    }
}

/// Create a bounded single-producer single-consumer PCM queue
///
/// The writer lives in the audio callback; the reader performs blocking
/// reads of whole chunks. Samples that do not fit are dropped and counted.
///
/// # Example
///
/// ```
/// use multimic_audio::pcm_channel;
///
/// let (mut writer, mut reader) = pcm_channel(1024);
/// writer.push(&[1, 2, 3, 4]);
///
/// let mut chunk = [0i16; 4];
/// reader.read_exact(&mut chunk).unwrap();
/// assert_eq!(chunk, [1, 2, 3, 4]);
/// ```
pub fn pcm_channel(capacity: usize) -> (PcmWriter, PcmReader) {
    let rb = HeapRb::<i16>::new(capacity);
    let (producer, consumer) = rb.split();

    let shared = Arc::new(Shared {
        state: Mutex::new(StreamState::default()),
        ready: Condvar::new(),
        parked: AtomicBool::new(false),
        dropped: AtomicUsize::new(0),
    });

    (
        PcmWriter {
            producer,
            shared: Arc::clone(&shared),
        },
        PcmReader {
            consumer,
            shared,
            capacity,
        },
    )
}

/// Producer half, owned by the audio callback
///
/// Dropping the writer closes the queue.
pub struct PcmWriter {
    producer: ringbuf::HeapProd<i16>,
    shared: Arc<Shared>,
}

impl PcmWriter {
    /// Push samples, returning how many were accepted
    ///
    /// Never blocks unless a reader is parked, and then only to notify it.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        let written = self.producer.push_slice(samples);
        if written < samples.len() {
            self.shared
                .dropped
                .fetch_add(samples.len() - written, Ordering::Relaxed);
        }
        if written > 0 {
            self.shared.wake_if_parked();
        }
        written
    }

    /// Handle for reporting stream errors from a separate callback
    pub fn fault_notifier(&self) -> FaultNotifier {
        FaultNotifier {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn free_space(&self) -> usize {
        self.producer.vacant_len()
    }
}

impl Drop for PcmWriter {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.ready.notify_all();
    }
}

/// Reports a host stream failure to the reader
#[derive(Clone)]
pub struct FaultNotifier {
    shared: Arc<Shared>,
}

impl FaultNotifier {
    /// Record a failure. Only the first reason is kept.
    pub fn fail<S: Into<String>>(&self, reason: S) {
        let mut state = self.shared.state.lock();
        if state.failure.is_none() {
            state.failure = Some(reason.into());
        }
        self.shared.ready.notify_all();
    }
}

/// Consumer half with blocking reads
pub struct PcmReader {
    consumer: ringbuf::HeapCons<i16>,
    shared: Arc<Shared>,
    capacity: usize,
}

impl PcmReader {
    /// Block until `out` is completely filled
    ///
    /// Buffered samples are always drained first. Once the queue runs dry a
    /// recorded failure is returned as [`AudioError::StreamError`], and a
    /// closed queue as [`AudioError::StreamClosed`]. There is no timeout.
    pub fn read_exact(&mut self, out: &mut [i16]) -> Result<()> {
        if out.len() > self.capacity {
            return Err(AudioError::invalid_config(format!(
                "chunk of {} samples exceeds queue capacity of {}",
                out.len(),
                self.capacity
            )));
        }

        let mut filled = self.consumer.pop_slice(out);
        while filled < out.len() {
            let mut state = self.shared.state.lock();
            self.shared.parked.store(true, Ordering::Relaxed);
            fence(Ordering::SeqCst);

            filled += self.consumer.pop_slice(&mut out[filled..]);
            let outcome = if filled == out.len() {
                Some(Ok(()))
            } else if let Some(reason) = &state.failure {
                Some(Err(AudioError::stream(reason.clone())))
            } else if state.closed {
                Some(Err(AudioError::StreamClosed))
            } else {
                self.shared.ready.wait_for(&mut state, WAIT_SLICE);
                None
            };
            self.shared.parked.store(false, Ordering::Relaxed);

            if let Some(outcome) = outcome {
                return outcome;
            }
        }

        Ok(())
    }

    /// Samples currently buffered
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Samples discarded because the queue was full
    pub fn dropped(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_pcm_queue_basic() {
        let (mut writer, mut reader) = pcm_channel(1024);

        let samples = vec![1, 2, 3, 4, 5];
        assert_eq!(writer.push(&samples), 5);
        assert_eq!(reader.available(), 5);

        let mut output = vec![0i16; 5];
        reader.read_exact(&mut output).unwrap();
        assert_eq!(output, samples);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn test_read_blocks_until_chunk_complete() {
        let (mut writer, mut reader) = pcm_channel(64);

        let producer = thread::spawn(move || {
            for i in 0..4i16 {
                thread::sleep(Duration::from_millis(10));
                writer.push(&[i; 4]);
            }
            writer
        });

        let mut chunk = [0i16; 16];
        reader.read_exact(&mut chunk).unwrap();
        assert_eq!(&chunk[..4], &[0; 4]);
        assert_eq!(&chunk[12..], &[3; 4]);

        drop(producer.join().unwrap());
    }

    #[test]
    fn test_push_does_not_lock_without_parked_reader() {
        let (mut writer, mut reader) = pcm_channel(64);
        let shared = Arc::clone(&writer.shared);

        {
            // The mutex is not reentrant: pushing while holding it only
            // returns if the writer skips the lock.
            let _held = shared.state.lock();
            assert_eq!(writer.push(&[3; 8]), 8);
        }

        let mut chunk = [0i16; 8];
        reader.read_exact(&mut chunk).unwrap();
        assert!(!shared.parked.load(Ordering::Relaxed));
    }

    #[test]
    fn test_overflow_is_counted() {
        let (mut writer, reader) = pcm_channel(5);

        assert_eq!(writer.push(&[7; 10]), 5);
        assert_eq!(writer.free_space(), 0);
        assert_eq!(reader.dropped(), 5);
    }

    #[test]
    fn test_failure_after_buffered_data_drained() {
        let (mut writer, mut reader) = pcm_channel(32);
        writer.push(&[1; 8]);
        writer.fault_notifier().fail("device unplugged");

        let mut chunk = [0i16; 8];
        reader.read_exact(&mut chunk).unwrap();

        let err = reader.read_exact(&mut chunk).unwrap_err();
        assert!(matches!(err, AudioError::StreamError(ref msg) if msg == "device unplugged"));
    }

    #[test]
    fn test_first_failure_wins() {
        let (writer, mut reader) = pcm_channel(8);
        let notifier = writer.fault_notifier();
        notifier.fail("first");
        notifier.fail("second");

        let mut chunk = [0i16; 4];
        let err = reader.read_exact(&mut chunk).unwrap_err();
        assert!(err.to_string().contains("first"));
    }

    #[test]
    fn test_dropping_writer_closes_queue() {
        let (mut writer, mut reader) = pcm_channel(16);
        writer.push(&[1; 2]);
        drop(writer);

        let mut chunk = [0i16; 4];
        assert!(matches!(reader.read_exact(&mut chunk), Err(AudioError::StreamClosed)));
    }

    #[test]
    fn test_chunk_larger_than_capacity_rejected() {
        let (_writer, mut reader) = pcm_channel(4);
        let mut chunk = [0i16; 8];
        assert!(matches!(reader.read_exact(&mut chunk), Err(AudioError::InvalidConfig(_))));
    }
}
