//! Audio data types

use chrono::{DateTime, Utc};
use sonotap_common::config::AudioFormat;

/// Interleaved float samples captured from the tap
///
/// Ephemeral: produced per capture, never persisted.
#[derive(Debug, Clone)]
pub struct AudioFrameBatch {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub captured_at: DateTime<Utc>,
}

impl AudioFrameBatch {
    pub fn new(samples: Vec<f32>, format: AudioFormat) -> Self {
        Self {
            samples,
            sample_rate: format.sample_rate,
            channels: format.channels,
            captured_at: Utc::now(),
        }
    }

    /// Number of interleaved frames
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration actually held, in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
