//! # Sonotap Audio Tap Library (sonotap-tap)
//!
//! Real-time side of Sonotap: taps the mixing engine's PCM stream.
//!
//! - [`tap::AudioTapBuffer`]: fixed-capacity PCM16 ring buffer (engine writes, capture reads)
//! - [`capture::SampleCapture`]: pulls N seconds from the tap as float samples
//! - [`visualization::VisualizerFacade`]: spectrum, level meter and waveform
//!   fed synchronously from the audio callback and polled by the UI

pub mod audio;
pub mod capture;
pub mod error;
pub mod tap;
pub mod visualization;

pub use audio::AudioFrameBatch;
pub use capture::SampleCapture;
pub use error::{Error, Result};
pub use tap::AudioTapBuffer;
pub use visualization::VisualizerFacade;
