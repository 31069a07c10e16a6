//! Visualizer facade
//!
//! Owns one spectrum analyzer, level meter and waveform buffer behind a
//! single mutex. The mixing engine pushes samples from its callback thread;
//! the UI polls snapshots from anywhere.

use super::level::{linear_to_db, LevelMeter};
use super::spectrum::SpectrumAnalyzer;
use super::waveform::WaveformAnalyzer;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sonotap_common::config::{AudioFormat, VisualizationConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Spectrum magnitudes with their bin frequencies
#[derive(Debug, Clone, Serialize)]
pub struct SpectrumSnapshot {
    /// Normalized magnitudes in [0, 1], one per bin
    pub magnitudes: Vec<f32>,
    /// Bin centre frequencies in Hz
    pub frequencies: Vec<f32>,
    pub bin_count: usize,
    pub frequency_resolution: f32,
    pub max_frequency: f32,
    pub timestamp: DateTime<Utc>,
}

/// Peak and RMS levels, linear and dBFS
#[derive(Debug, Clone, Serialize)]
pub struct LevelSnapshot {
    pub left_peak: f32,
    pub right_peak: f32,
    pub left_rms: f32,
    pub right_rms: f32,
    pub left_peak_db: f32,
    pub right_peak_db: f32,
    pub left_rms_db: f32,
    pub right_rms_db: f32,
    pub mono_peak: f32,
    pub mono_rms: f32,
    pub is_clipping: bool,
    pub timestamp: DateTime<Utc>,
}

/// Chronologically ordered waveform samples
#[derive(Debug, Clone, Serialize)]
pub struct WaveformSnapshot {
    pub left_samples: Vec<f32>,
    pub right_samples: Vec<f32>,
    pub sample_count: usize,
    /// Seconds of audio covered by the full buffer contents
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
}

struct VisualizerState {
    spectrum: SpectrumAnalyzer,
    level: LevelMeter,
    waveform: WaveformAnalyzer,
    /// Mono downmix scratch, pre-sized to the configured max block
    mono: Vec<f32>,
}

pub struct VisualizerFacade {
    format: AudioFormat,
    state: Mutex<VisualizerState>,
    active: AtomicBool,
}

impl VisualizerFacade {
    /// Build all analyzers from configuration
    ///
    /// This is the only place visualization can fail; steady-state
    /// processing never returns an error.
    pub fn new(format: AudioFormat, config: &VisualizationConfig) -> Result<Self> {
        if format.sample_rate == 0 {
            return Err(Error::InvalidSampleRate(format.sample_rate));
        }
        if format.channels == 0 {
            return Err(Error::Config("channel count must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&config.peak_decay) {
            return Err(Error::Config(format!("peak decay {} outside [0, 1]", config.peak_decay)));
        }
        if !(0.0..1.0).contains(&config.rms_smoothing) {
            return Err(Error::Config(format!("RMS smoothing {} outside [0, 1)", config.rms_smoothing)));
        }
        if config.waveform_samples == 0 {
            return Err(Error::Config("waveform sample count must be at least 1".to_string()));
        }

        let spectrum = SpectrumAnalyzer::new(
            config.fft_size,
            format.sample_rate,
            config.use_window,
            config.spectrum_smoothing,
        )?;
        let level = LevelMeter::new(
            Duration::from_millis(config.peak_hold_ms),
            config.peak_decay,
            config.rms_smoothing,
        );
        let waveform = WaveformAnalyzer::new(config.waveform_samples, format.sample_rate);

        Ok(Self {
            format,
            state: Mutex::new(VisualizerState {
                spectrum,
                level,
                waveform,
                mono: Vec::with_capacity(config.max_block_frames),
            }),
            active: AtomicBool::new(false),
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Feed one block of interleaved samples from the audio callback
    pub fn process_samples(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let channels = self.format.channels;
        let now = Instant::now();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        // Downmix by channel averaging; a partial trailing frame is averaged
        // over the channels it has.
        state.mono.clear();
        state.mono.extend(
            samples
                .chunks(channels as usize)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );

        state.spectrum.add_samples(&state.mono);
        state.level.process_at(samples, channels, now);
        state.waveform.add_interleaved(samples, channels);
        drop(guard);

        self.active.store(true, Ordering::Release);
    }

    pub fn spectrum_data(&self) -> SpectrumSnapshot {
        let mut state = self.state.lock();
        let magnitudes = state.spectrum.magnitudes();
        SpectrumSnapshot {
            frequencies: state.spectrum.frequencies(),
            bin_count: magnitudes.len(),
            magnitudes,
            frequency_resolution: state.spectrum.frequency_resolution(),
            max_frequency: state.spectrum.max_frequency(),
            timestamp: Utc::now(),
        }
    }

    pub fn level_data(&self) -> LevelSnapshot {
        let levels = self.state.lock().level.levels();
        LevelSnapshot {
            left_peak: levels.left_peak,
            right_peak: levels.right_peak,
            left_rms: levels.left_rms,
            right_rms: levels.right_rms,
            left_peak_db: linear_to_db(levels.left_peak),
            right_peak_db: linear_to_db(levels.right_peak),
            left_rms_db: linear_to_db(levels.left_rms),
            right_rms_db: linear_to_db(levels.right_rms),
            mono_peak: levels.mono_peak(),
            mono_rms: levels.mono_rms(),
            is_clipping: levels.is_clipping(),
            timestamp: Utc::now(),
        }
    }

    pub fn waveform_data(&self) -> WaveformSnapshot {
        let state = self.state.lock();
        let (left_samples, right_samples) = state.waveform.samples();
        WaveformSnapshot {
            sample_count: left_samples.len(),
            left_samples,
            right_samples,
            duration: state.waveform.duration(),
            timestamp: Utc::now(),
        }
    }

    /// Waveform reduced to at most `target` points per channel
    pub fn waveform_downsampled(&self, target: usize) -> WaveformSnapshot {
        let state = self.state.lock();
        let (left_samples, right_samples) = state.waveform.downsampled(target);
        WaveformSnapshot {
            sample_count: left_samples.len(),
            left_samples,
            right_samples,
            duration: state.waveform.duration(),
            timestamp: Utc::now(),
        }
    }

    /// True once samples have been processed since construction or reset
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Clear all three analyzers together
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.spectrum.reset();
        state.level.reset();
        state.waveform.reset();
        self.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::sync::Arc;

    fn facade() -> VisualizerFacade {
        let config = VisualizationConfig {
            fft_size: 1024,
            waveform_samples: 256,
            ..Default::default()
        };
        VisualizerFacade::new(AudioFormat::default(), &config).unwrap()
    }

    fn stereo_sine(freq: f32, amplitude: f32, frames: usize, sample_rate: f32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = amplitude * (2.0 * PI * freq * i as f32 / sample_rate).sin();
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_inactive_until_first_block() {
        let viz = facade();
        assert!(!viz.is_active());
        viz.process_samples(&[]);
        assert!(!viz.is_active());
        viz.process_samples(&[0.1, 0.1]);
        assert!(viz.is_active());
    }

    #[test]
    fn test_sine_shows_in_all_snapshots() {
        let viz = facade();
        let block = stereo_sine(1000.0, 0.5, 2048, 44100.0);
        viz.process_samples(&block);

        let spectrum = viz.spectrum_data();
        assert_eq!(spectrum.bin_count, 512);
        assert_eq!(spectrum.frequencies.len(), 512);
        let peak_bin = spectrum
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let expected = 1000.0 / spectrum.frequency_resolution;
        assert!((peak_bin as f32 - expected).abs() <= 2.0);

        let level = viz.level_data();
        assert!((level.left_peak - 0.5).abs() < 0.01);
        assert!(level.left_peak_db < 0.0);
        assert!(!level.is_clipping);

        let waveform = viz.waveform_data();
        assert_eq!(waveform.sample_count, 256);
        assert_eq!(waveform.left_samples, waveform.right_samples);
    }

    #[test]
    fn test_downsampled_waveform() {
        let viz = facade();
        viz.process_samples(&stereo_sine(440.0, 0.5, 512, 44100.0));
        let down = viz.waveform_downsampled(32);
        assert_eq!(down.sample_count, 32);
        assert!(down.left_samples.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn test_reset_clears_everything() {
        let viz = facade();
        viz.process_samples(&stereo_sine(440.0, 0.8, 512, 44100.0));
        viz.reset();

        assert!(!viz.is_active());
        assert_eq!(viz.level_data().left_peak, 0.0);
        assert_eq!(viz.waveform_data().sample_count, 0);
        assert!(viz.spectrum_data().magnitudes.iter().all(|&m| m <= 0.01));
    }

    #[test]
    fn test_oversized_block_is_accepted() {
        let config = VisualizationConfig {
            max_block_frames: 16,
            ..Default::default()
        };
        let viz = VisualizerFacade::new(AudioFormat::default(), &config).unwrap();
        viz.process_samples(&vec![0.25; 4096]);
        assert!((viz.level_data().left_peak - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let bad_fft = VisualizationConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert_eq!(
            VisualizerFacade::new(AudioFormat::default(), &bad_fft).err(),
            Some(Error::InvalidFftSize(1000))
        );

        let no_rate = AudioFormat {
            sample_rate: 0,
            channels: 2,
        };
        assert_eq!(
            VisualizerFacade::new(no_rate, &VisualizationConfig::default()).err(),
            Some(Error::InvalidSampleRate(0))
        );
    }

    #[test]
    fn test_concurrent_push_and_poll() {
        let viz = Arc::new(facade());
        let writer = {
            let viz = Arc::clone(&viz);
            std::thread::spawn(move || {
                let block = stereo_sine(440.0, 0.5, 256, 44100.0);
                for _ in 0..200 {
                    viz.process_samples(&block);
                }
            })
        };
        for _ in 0..50 {
            let snapshot = viz.spectrum_data();
            assert!(snapshot.magnitudes.iter().all(|&m| (0.0..=1.0).contains(&m)));
            let _ = viz.level_data();
        }
        writer.join().unwrap();
        assert!(viz.is_active());
    }

    #[test]
    fn test_snapshots_serialize() {
        let viz = facade();
        viz.process_samples(&[0.5, -0.5]);
        let json = serde_json::to_value(viz.level_data()).unwrap();
        assert!(json.get("left_peak_db").is_some());
        assert!(json.get("is_clipping").is_some());
    }
}
