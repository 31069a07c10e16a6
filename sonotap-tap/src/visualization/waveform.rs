//! Waveform display buffer
//!
//! Left and right channels share one write pointer. Until the buffers wrap,
//! only the samples actually written are returned.

pub struct WaveformAnalyzer {
    capacity: usize,
    sample_rate: u32,
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    filled: usize,
}

impl WaveformAnalyzer {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: usize, sample_rate: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            sample_rate,
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
            write_pos: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently held (≤ capacity)
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Add interleaved stereo samples
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.add_interleaved(samples, 2);
    }

    /// Add interleaved samples with `channels` channels
    ///
    /// Mono input goes to both channels, as does an odd trailing sample.
    /// Channels beyond the second are ignored.
    pub fn add_interleaved(&mut self, samples: &[f32], channels: u16) {
        match channels {
            0 => {}
            1 => {
                for &s in samples {
                    self.push(s, s);
                }
            }
            n => {
                let mut frames = samples.chunks_exact(n as usize);
                for frame in &mut frames {
                    self.push(frame[0], frame[1]);
                }
                if let Some(&trailing) = frames.remainder().first() {
                    self.push(trailing, trailing);
                }
            }
        }
    }

    fn push(&mut self, left: f32, right: f32) {
        self.left[self.write_pos] = left;
        self.right[self.write_pos] = right;
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.filled = (self.filled + 1).min(self.capacity);
    }

    /// Chronologically ordered copies of both channels
    pub fn samples(&self) -> (Vec<f32>, Vec<f32>) {
        (self.ordered(&self.left), self.ordered(&self.right))
    }

    fn ordered(&self, channel: &[f32]) -> Vec<f32> {
        if self.filled < self.capacity {
            return channel[..self.filled].to_vec();
        }
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&channel[self.write_pos..]);
        out.extend_from_slice(&channel[..self.write_pos]);
        out
    }

    /// Reduce both channels to at most `target` points
    ///
    /// Each bucket keeps whichever of its min and max has the larger
    /// magnitude, so transients survive the reduction.
    pub fn downsampled(&self, target: usize) -> (Vec<f32>, Vec<f32>) {
        let (left, right) = self.samples();
        (downsample(&left, target), downsample(&right, target))
    }

    /// Seconds of audio currently held
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.filled as f64 / self.sample_rate as f64
    }

    pub fn reset(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
    }
}

fn downsample(samples: &[f32], target: usize) -> Vec<f32> {
    if target == 0 || samples.is_empty() {
        return Vec::new();
    }
    if samples.len() <= target {
        return samples.to_vec();
    }

    (0..target)
        .map(|bucket| {
            let start = bucket * samples.len() / target;
            let end = ((bucket + 1) * samples.len() / target).max(start + 1);
            let range = &samples[start..end];
            let min = range.iter().copied().fold(f32::INFINITY, f32::min);
            let max = range.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if max.abs() >= min.abs() {
                max
            } else {
                min
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_fill_returns_written_samples_in_order() {
        let mut waveform = WaveformAnalyzer::new(8, 44100);
        waveform.add_samples(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);

        let (left, right) = waveform.samples();
        assert_eq!(left, vec![0.1, 0.2, 0.3]);
        assert_eq!(right, vec![-0.1, -0.2, -0.3]);
        assert_eq!(waveform.len(), 3);
    }

    #[test]
    fn test_wrapped_buffer_is_chronological() {
        let mut waveform = WaveformAnalyzer::new(4, 44100);
        let samples: Vec<f32> = (1..=6).flat_map(|i| [i as f32, -(i as f32)]).collect();
        waveform.add_samples(&samples);

        let (left, right) = waveform.samples();
        assert_eq!(left, vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(right, vec![-3.0, -4.0, -5.0, -6.0]);
    }

    #[test]
    fn test_odd_trailing_sample_goes_to_both_channels() {
        let mut waveform = WaveformAnalyzer::new(4, 44100);
        waveform.add_samples(&[0.1, 0.2, 0.9]);
        let (left, right) = waveform.samples();
        assert_eq!(left, vec![0.1, 0.9]);
        assert_eq!(right, vec![0.2, 0.9]);
    }

    #[test]
    fn test_mono_input_feeds_both_channels() {
        let mut waveform = WaveformAnalyzer::new(4, 44100);
        waveform.add_interleaved(&[0.5, -0.5], 1);
        let (left, right) = waveform.samples();
        assert_eq!(left, right);
        assert_eq!(left, vec![0.5, -0.5]);
    }

    #[test]
    fn test_downsample_keeps_extremum_per_bucket() {
        let mut waveform = WaveformAnalyzer::new(8, 44100);
        let left = [0.1, -0.9, 0.2, 0.3, 0.8, 0.1, -0.2, -0.4];
        let samples: Vec<f32> = left.iter().flat_map(|&s| [s, 0.0]).collect();
        waveform.add_samples(&samples);

        let (down, _) = waveform.downsampled(4);
        assert_eq!(down, vec![-0.9, 0.3, 0.8, -0.4]);
    }

    #[test]
    fn test_downsample_shorter_than_target_is_unchanged() {
        let mut waveform = WaveformAnalyzer::new(8, 44100);
        waveform.add_samples(&[0.1, 0.1, 0.2, 0.2]);
        let (down, _) = waveform.downsampled(16);
        assert_eq!(down, vec![0.1, 0.2]);
        assert!(waveform.downsampled(0).0.is_empty());
    }

    #[test]
    fn test_reset_and_duration() {
        let mut waveform = WaveformAnalyzer::new(1000, 1000);
        waveform.add_samples(&vec![0.5; 1000]);
        assert!((waveform.duration() - 0.5).abs() < 1e-9);

        waveform.reset();
        assert!(waveform.is_empty());
        assert!(waveform.samples().0.is_empty());
    }
}
