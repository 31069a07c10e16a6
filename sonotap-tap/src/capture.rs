//! Sample capture from the audio tap
//!
//! Pulls a requested duration of audio out of [`AudioTapBuffer`] and converts
//! it to normalized floats. Instead of spinning on a fixed interval, the loop
//! waits on the tap's data-available signal, bounded by the poll interval and
//! interruptible by cancellation.
//!
//! Capture ends when the requested byte count is reached, the requested
//! duration has elapsed, or no bytes arrived for the idle timeout. "No data"
//! (inactive source, nothing captured) is `Ok(None)`, never an error.

use crate::audio::AudioFrameBatch;
use crate::error::{Error, Result};
use crate::tap::{pcm16_to_f32, AudioTapBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const READ_CHUNK_BYTES: usize = 16 * 1024;

/// Timing knobs for [`SampleCapture`]
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    /// Longest single wait for new data
    pub poll_interval: Duration,
    /// Give up early when nothing arrives for this long
    pub idle_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(1),
        }
    }
}

pub struct SampleCapture {
    tap: Arc<AudioTapBuffer>,
    settings: CaptureSettings,
}

impl SampleCapture {
    pub fn new(tap: Arc<AudioTapBuffer>, settings: CaptureSettings) -> Self {
        Self { tap, settings }
    }

    pub fn tap(&self) -> &Arc<AudioTapBuffer> {
        &self.tap
    }

    /// Capture up to `duration` of audio
    ///
    /// Returns `Err(Error::Cancelled)` only when `cancel` fires; the partial
    /// capture is discarded in that case.
    pub async fn capture(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<AudioFrameBatch>> {
        if !self.tap.is_active() {
            debug!("Audio source inactive, nothing to capture");
            return Ok(None);
        }

        let format = self.tap.format();
        let frame_bytes = format.frame_bytes();
        let requested_frames = (duration.as_secs_f64() * format.sample_rate as f64) as usize;
        let requested = requested_frames
            .checked_mul(frame_bytes)
            .ok_or_else(|| Error::Config(format!("capture duration {:?} too long", duration)))?;
        if requested == 0 {
            return Ok(None);
        }

        let start = Instant::now();
        let deadline = start
            .checked_add(duration)
            .ok_or_else(|| Error::Config(format!("capture duration {:?} too long", duration)))?;
        let mut last_data = start;

        // A wait shorter than one poll can never observe a write
        let idle_timeout = self.settings.idle_timeout.max(self.settings.poll_interval);

        // The tap never holds more than its capacity at once
        let mut collected: Vec<u8> = Vec::with_capacity(requested.min(self.tap.capacity()));
        let mut chunk = vec![0u8; READ_CHUNK_BYTES.min(requested)];

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let want = (requested - collected.len()).min(chunk.len());
            let read = self.tap.read(&mut chunk[..want]);
            if read > 0 {
                collected.extend_from_slice(&chunk[..read]);
                last_data = Instant::now();
                if collected.len() >= requested {
                    break;
                }
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                trace!("Capture duration elapsed");
                break;
            }
            if now.duration_since(last_data) >= idle_timeout {
                debug!("No audio for {:?}, ending capture early", idle_timeout);
                break;
            }

            let wait = self.settings.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::timeout(wait, self.tap.notified()) => {}
            }
        }

        // Whole frames only
        collected.truncate(collected.len() - collected.len() % frame_bytes);
        if collected.is_empty() {
            debug!("Capture produced no audio");
            return Ok(None);
        }

        let batch = AudioFrameBatch::new(pcm16_to_f32(&collected), format);
        debug!(
            requested_secs = duration.as_secs_f64(),
            captured_secs = batch.duration_seconds(),
            "Captured audio from tap"
        );
        Ok(Some(batch))
    }
}
