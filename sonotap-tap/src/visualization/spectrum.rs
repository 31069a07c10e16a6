//! FFT spectrum analyzer
//!
//! Keeps the most recent `fft_size` mono samples in a circular buffer and
//! produces normalized, smoothed magnitudes for the first N/2 bins.
//! Normalization is adaptive (relative to the frame's own peak), so the
//! output shape is stable regardless of playback volume.

use super::fft::{Complex, Fft};
use crate::error::{Error, Result};
use std::f32::consts::PI;

/// Peaks at or below this are treated as silence and not normalized
const NORMALIZE_EPSILON: f32 = 1e-10;

pub struct SpectrumAnalyzer {
    fft: Fft,
    sample_rate: u32,
    use_window: bool,
    smoothing: f32,

    /// Circular input buffer
    input: Vec<f32>,
    write_pos: usize,

    /// Precomputed Hann coefficients
    window: Vec<f32>,

    /// Pre-sized FFT work buffer
    scratch: Vec<Complex>,

    /// Smoothed magnitudes, one per bin
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, sample_rate: u32, use_window: bool, smoothing: f32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        if !(0.0..1.0).contains(&smoothing) {
            return Err(Error::Config(format!("spectrum smoothing {} outside [0, 1)", smoothing)));
        }
        let fft = Fft::new(fft_size)?;

        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (fft_size - 1) as f32).cos()))
            .collect();

        Ok(Self {
            fft,
            sample_rate,
            use_window,
            smoothing,
            input: vec![0.0; fft_size],
            write_pos: 0,
            window,
            scratch: vec![Complex::ZERO; fft_size],
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft.size()
    }

    pub fn bin_count(&self) -> usize {
        self.fft.size() / 2
    }

    /// Hz per bin
    pub fn frequency_resolution(&self) -> f32 {
        self.sample_rate as f32 / self.fft.size() as f32
    }

    /// Nyquist frequency
    pub fn max_frequency(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Append mono samples, wrapping the write pointer
    ///
    /// Non-finite samples are stored as silence.
    pub fn add_samples(&mut self, mono: &[f32]) {
        let n = self.input.len();
        for &sample in mono {
            self.input[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % n;
        }
    }

    /// Transform the current window and return smoothed magnitudes in [0, 1]
    ///
    /// Advances the smoothing state; the returned vector is an independent copy.
    pub fn magnitudes(&mut self) -> Vec<f32> {
        let n = self.input.len();

        // Chronological order starting at the oldest sample
        for i in 0..n {
            let mut sample = self.input[(self.write_pos + i) % n];
            if self.use_window {
                sample *= self.window[i];
            }
            self.scratch[i] = Complex::new(sample, 0.0);
        }

        self.fft.process(&mut self.scratch);

        let bins = n / 2;
        let scale = 2.0 / n as f32;
        let mut peak = 0.0f32;
        for bin in 0..bins {
            let magnitude = self.scratch[bin].norm() * scale;
            // reuse the real part as the per-bin magnitude
            self.scratch[bin].re = magnitude;
            peak = peak.max(magnitude);
        }

        let normalize = peak > NORMALIZE_EPSILON;
        let alpha = self.smoothing;
        for bin in 0..bins {
            let mut magnitude = self.scratch[bin].re;
            if !magnitude.is_finite() {
                magnitude = 0.0;
            }
            if normalize {
                magnitude = (magnitude / peak).min(1.0);
            }
            self.smoothed[bin] = self.smoothed[bin] * alpha + magnitude * (1.0 - alpha);
        }

        self.smoothed.clone()
    }

    /// Centre frequency of each bin
    pub fn frequencies(&self) -> Vec<f32> {
        let resolution = self.frequency_resolution();
        (0..self.bin_count()).map(|bin| bin as f32 * resolution).collect()
    }

    pub fn reset(&mut self) {
        self.input.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }
}
