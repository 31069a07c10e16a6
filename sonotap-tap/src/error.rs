//! Error types for sonotap-tap

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// FFT size is not a power of two (or is smaller than 2)
    #[error("Invalid FFT size {0}: must be a power of two >= 2")]
    InvalidFftSize(usize),

    /// Sample rate must be positive
    #[error("Invalid sample rate {0}")]
    InvalidSampleRate(u32),

    /// Other malformed construction parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture was cancelled by a shutdown request
    #[error("Capture cancelled")]
    Cancelled,
}

/// Convenience Result type using sonotap-tap Error
pub type Result<T> = std::result::Result<T, Error>;
