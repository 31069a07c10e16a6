//! Peak/RMS level meter
//!
//! Peaks use hold-and-decay: a new peak at least as high as the held one is
//! adopted and held for `hold`; after that the held value is multiplied by
//! `decay` on every call. Decay is per call, not per unit of wall-clock
//! time, so the effective fall rate follows the callback rate.

use std::time::{Duration, Instant};

/// Silence floor for dBFS values
pub const DB_FLOOR: f32 = -96.0;

/// Peak at or above this counts as clipping
pub const CLIP_THRESHOLD: f32 = 0.999;

/// `20·log10(linear)` floored at [`DB_FLOOR`]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        return DB_FLOOR;
    }
    (20.0 * linear.log10()).max(DB_FLOOR)
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelLevel {
    held_peak: f32,
    hold_until: Option<Instant>,
    rms: f32,
}

impl ChannelLevel {
    fn update(&mut self, peak: f32, rms: f32, now: Instant, hold: Duration, decay: f32, smoothing: f32) {
        if peak >= self.held_peak {
            self.held_peak = peak;
            self.hold_until = Some(now + hold);
        } else if self.hold_until.map_or(true, |until| now >= until) {
            self.held_peak *= decay;
        }

        self.rms = self.rms * smoothing + rms * (1.0 - smoothing);
    }
}

/// Per-channel levels for a stereo stream
pub struct LevelMeter {
    hold: Duration,
    decay: f32,
    smoothing: f32,
    left: ChannelLevel,
    right: ChannelLevel,
}

/// Current meter values (linear)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub left_peak: f32,
    pub right_peak: f32,
    pub left_rms: f32,
    pub right_rms: f32,
}

impl Levels {
    pub fn mono_peak(&self) -> f32 {
        self.left_peak.max(self.right_peak)
    }

    pub fn mono_rms(&self) -> f32 {
        ((self.left_rms * self.left_rms + self.right_rms * self.right_rms) / 2.0).sqrt()
    }

    pub fn is_clipping(&self) -> bool {
        self.mono_peak() >= CLIP_THRESHOLD
    }
}

impl LevelMeter {
    pub fn new(hold: Duration, decay: f32, smoothing: f32) -> Self {
        Self {
            hold,
            decay,
            smoothing,
            left: ChannelLevel::default(),
            right: ChannelLevel::default(),
        }
    }

    /// Process interleaved stereo samples
    pub fn process(&mut self, samples: &[f32]) {
        self.process_at(samples, 2, Instant::now());
    }

    /// Process interleaved samples with an explicit clock
    ///
    /// Channel 0 feeds the left meter and channel 1 the right; mono input
    /// feeds both. An odd trailing sample in a stereo block counts for both
    /// channels. Empty input leaves the meter untouched.
    pub fn process_at(&mut self, samples: &[f32], channels: u16, now: Instant) {
        if samples.is_empty() || channels == 0 {
            return;
        }

        let mut left = Accumulator::default();
        let mut right = Accumulator::default();

        if channels == 1 {
            for &s in samples {
                left.add(s);
                right.add(s);
            }
        } else {
            let stride = channels as usize;
            let mut frames = samples.chunks_exact(stride);
            for frame in &mut frames {
                left.add(frame[0]);
                right.add(frame[1]);
            }
            if let Some(&trailing) = frames.remainder().first() {
                left.add(trailing);
                right.add(trailing);
            }
        }

        self.left.update(left.peak, left.rms(), now, self.hold, self.decay, self.smoothing);
        self.right.update(right.peak, right.rms(), now, self.hold, self.decay, self.smoothing);
    }

    pub fn levels(&self) -> Levels {
        Levels {
            left_peak: self.left.held_peak,
            right_peak: self.right.held_peak,
            left_rms: self.left.rms,
            right_rms: self.right.rms,
        }
    }

    pub fn reset(&mut self) {
        self.left = ChannelLevel::default();
        self.right = ChannelLevel::default();
    }
}

#[derive(Default)]
struct Accumulator {
    peak: f32,
    sum_squares: f32,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, sample: f32) {
        self.peak = self.peak.max(sample.abs());
        self.sum_squares += sample * sample;
        self.count += 1;
    }

    fn rms(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum_squares / self.count as f32).sqrt()
    }
}
