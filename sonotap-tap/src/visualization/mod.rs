//! Visualization engine
//!
//! Spectrum, level and waveform analyzers fed from the real-time path and
//! composed by [`VisualizerFacade`].

mod facade;
mod fft;
mod level;
mod spectrum;
mod waveform;

pub use facade::{LevelSnapshot, SpectrumSnapshot, VisualizerFacade, WaveformSnapshot};
pub use fft::{Complex, Fft};
pub use level::{linear_to_db, LevelMeter, Levels, CLIP_THRESHOLD, DB_FLOOR};
pub use spectrum::SpectrumAnalyzer;
pub use waveform::WaveformAnalyzer;
