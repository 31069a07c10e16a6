//! Audio tap ring buffer
//!
//! Fixed-capacity ring of PCM16 little-endian bytes between the mixing
//! engine (single writer, real-time callback) and the capture task (single
//! reader).
//!
//! Design:
//! - Capacity = sample rate × channels × 2 bytes × window seconds, fixed at
//!   construction; the ring never grows
//! - Overwrite-oldest: a write that does not fit discards the oldest unread
//!   whole frames, so the reader always sees the freshest audio
//! - Float → PCM16 quantization happens in a writer-only scratch buffer; the
//!   ring lock is held only for the slice push/pop
//! - Every write signals `data available` for waiting readers

use crate::error::{Error, Result};
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use sonotap_common::config::AudioFormat;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Scratch pre-sized for this many samples per write
const DEFAULT_SCRATCH_SAMPLES: usize = 8192;

/// PCM16 ring buffer fed by the mixing engine
pub struct AudioTapBuffer {
    format: AudioFormat,

    /// Byte ring (lock held only for pointer bookkeeping and the slice copy)
    ring: Mutex<HeapRb<u8>>,

    capacity: usize,

    /// Writer-only quantization buffer
    scratch: Mutex<Vec<u8>>,

    data_available: Notify,

    /// Engine reports whether it is currently producing audio
    active: AtomicBool,

    /// Total bytes discarded by overwrite-oldest
    overwritten_bytes: AtomicU64,
}

impl AudioTapBuffer {
    /// Create a tap holding `window_seconds` of audio
    pub fn new(format: AudioFormat, window_seconds: u32) -> Result<Self> {
        if format.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(format.sample_rate));
        }
        if format.channels == 0 {
            return Err(Error::Config("channel count must be positive".to_string()));
        }
        if window_seconds == 0 {
            return Err(Error::Config("tap window must be at least one second".to_string()));
        }

        let capacity = format.byte_rate() * window_seconds as usize;
        debug!(
            "Creating audio tap: {} bytes ({}s @ {} Hz x {} ch)",
            capacity, window_seconds, format.sample_rate, format.channels
        );

        Ok(Self {
            format,
            ring: Mutex::new(HeapRb::new(capacity)),
            capacity,
            scratch: Mutex::new(Vec::with_capacity(DEFAULT_SCRATCH_SAMPLES * 2)),
            data_available: Notify::new(),
            active: AtomicBool::new(false),
            overwritten_bytes: AtomicU64::new(0),
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Fixed capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append interleaved float samples
    ///
    /// Samples are clamped to [-1, 1] and quantized to PCM16. When the ring
    /// is full the oldest unread frames are overwritten. Returns the number
    /// of bytes accepted into the ring.
    pub fn write(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }

        let mut scratch = self.scratch.lock();
        scratch.clear();
        for &sample in samples {
            let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            scratch.extend_from_slice(&pcm.to_le_bytes());
        }

        let frame = self.format.frame_bytes();

        // Only the newest whole frames of an oversized write can survive;
        // the cut is made on a frame boundary of the write itself
        let bytes: &[u8] = if scratch.len() > self.capacity {
            let start = (scratch.len() - self.capacity).div_ceil(frame) * frame;
            &scratch[start..]
        } else {
            &scratch[..]
        };

        let discarded = {
            let mut ring = self.ring.lock();
            let vacant = ring.vacant_len();
            let discarded = if bytes.len() > vacant {
                let overflow = bytes.len() - vacant;
                let rounded = overflow.div_ceil(frame) * frame;
                let occupied = ring.occupied_len();
                ring.skip(rounded.min(occupied))
            } else {
                0
            };
            ring.push_slice(bytes);
            discarded
        };

        let pushed = bytes.len();
        drop(scratch);

        if discarded > 0 {
            let total = self.overwritten_bytes.fetch_add(discarded as u64, Ordering::Relaxed)
                + discarded as u64;
            // Rate-limit: log roughly once per second of lost audio
            let byte_rate = self.format.byte_rate() as u64;
            if (total - discarded as u64) / byte_rate != total / byte_rate {
                warn!("Audio tap overwrote unread audio (total: {} bytes)", total);
            }
        }

        self.data_available.notify_one();
        pushed
    }

    /// Copy up to `buf.len()` bytes out; never blocks, returns 0 when empty
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.ring.lock().pop_slice(buf)
    }

    /// Bytes currently buffered
    pub fn available(&self) -> usize {
        self.ring.lock().occupied_len()
    }

    /// Drop everything buffered
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        let occupied = ring.occupied_len();
        ring.skip(occupied);
    }

    /// Wait until the next write (or return immediately if one happened
    /// since the last wait)
    pub async fn notified(&self) {
        self.data_available.notified().await;
    }

    pub fn set_active(&self, active: bool) {
        let was = self.active.swap(active, Ordering::AcqRel);
        if was != active {
            debug!(active, "Audio tap source state changed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn overwritten_bytes(&self) -> u64 {
        self.overwritten_bytes.load(Ordering::Relaxed)
    }
}

/// Decode PCM16 little-endian bytes into normalized floats
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(sample_rate: u32, channels: u16, seconds: u32) -> AudioTapBuffer {
        AudioTapBuffer::new(AudioFormat { sample_rate, channels }, seconds).unwrap()
    }

    #[test]
    fn test_capacity_is_fixed_from_format() {
        let tap = tap(44100, 2, 15);
        assert_eq!(tap.capacity(), 44100 * 2 * 2 * 15);
        assert_eq!(tap.available(), 0);
    }

    #[test]
    fn test_write_then_partial_read() {
        let tap = tap(100, 1, 1); // 200 bytes
        let written = tap.write(&[0.5; 50]);
        assert_eq!(written, 100);
        assert_eq!(tap.available(), 100);

        let mut buf = [0u8; 40];
        assert_eq!(tap.read(&mut buf), 40);
        assert_eq!(tap.available(), 60);
    }

    #[test]
    fn test_read_empty_returns_zero() {
        let tap = tap(100, 2, 1);
        let mut buf = [0u8; 16];
        assert_eq!(tap.read(&mut buf), 0);
    }

    #[test]
    fn test_samples_are_clamped_and_quantized() {
        let tap = tap(100, 1, 1);
        tap.write(&[2.0, -2.0, 0.0, 0.5]);

        let mut buf = [0u8; 8];
        assert_eq!(tap.read(&mut buf), 8);
        let values: Vec<i16> = buf
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(values, vec![32767, -32767, 0, 16384]);
    }

    #[test]
    fn test_overflow_overwrites_oldest() {
        let tap = tap(4, 1, 1); // 8 bytes = 4 samples
        tap.write(&[0.1, 0.2, 0.3, 0.4]);
        tap.write(&[0.5, 0.6]);

        assert_eq!(tap.available(), 8);
        assert_eq!(tap.overwritten_bytes(), 4);

        let mut buf = [0u8; 8];
        tap.read(&mut buf);
        let samples = pcm16_to_f32(&buf);
        assert!((samples[0] - 0.3).abs() < 1e-3);
        assert!((samples[3] - 0.6).abs() < 1e-3);
    }

    #[test]
    fn test_oversized_write_keeps_newest() {
        let tap = tap(2, 1, 1); // 4 bytes = 2 samples
        tap.write(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(tap.available(), 4);

        let mut buf = [0u8; 4];
        tap.read(&mut buf);
        let samples = pcm16_to_f32(&buf);
        assert!((samples[0] - 0.4).abs() < 1e-3);
        assert!((samples[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_oversized_odd_write_starts_on_frame() {
        let tap = tap(4, 2, 1); // 16 bytes = 4 stereo frames
        // Nine samples: left positive, right negative, trailing half frame
        let samples: Vec<f32> = (0..9).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        tap.write(&samples);

        let mut buf = [0u8; 16];
        let n = tap.read(&mut buf);
        assert_eq!(n, 14);
        let decoded = pcm16_to_f32(&buf[..n]);
        assert!(decoded[0] > 0.0);
        assert!(decoded[1] < 0.0);
        assert!(decoded[6] > 0.0);
    }

    #[test]
    fn test_overwrite_keeps_frame_alignment() {
        let tap = tap(2, 2, 1); // 8 bytes = 2 stereo frames
        tap.write(&[0.1, -0.1, 0.2, -0.2]);
        tap.write(&[0.3]); // half a frame: whole oldest frame goes

        let mut buf = [0u8; 8];
        let n = tap.read(&mut buf);
        assert_eq!(n, 6);
        let samples = pcm16_to_f32(&buf[..n]);
        assert!((samples[0] - 0.2).abs() < 1e-3);
        assert!((samples[1] + 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_clear_resets() {
        let tap = tap(100, 2, 1);
        tap.write(&[0.25; 64]);
        tap.clear();
        assert_eq!(tap.available(), 0);
        assert_eq!(tap.capacity(), 400);
    }

    #[test]
    fn test_active_flag() {
        let tap = tap(100, 2, 1);
        assert!(!tap.is_active());
        tap.set_active(true);
        assert!(tap.is_active());
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert_eq!(
            AudioTapBuffer::new(AudioFormat { sample_rate: 0, channels: 2 }, 1).err(),
            Some(Error::InvalidSampleRate(0))
        );
        assert!(AudioTapBuffer::new(AudioFormat { sample_rate: 100, channels: 2 }, 0).is_err());
    }

    #[tokio::test]
    async fn test_write_wakes_waiter() {
        let tap = std::sync::Arc::new(tap(100, 1, 1));
        let waiter = {
            let tap = std::sync::Arc::clone(&tap);
            tokio::spawn(async move {
                tap.notified().await;
                tap.available()
            })
        };
        tokio::task::yield_now().await;
        tap.write(&[0.1; 10]);
        assert_eq!(waiter.await.unwrap(), 20);
    }
}
