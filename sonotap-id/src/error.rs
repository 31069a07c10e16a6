//! Error types for sonotap-id

use thiserror::Error;

/// Fingerprint generation errors
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("No audio samples to fingerprint")]
    EmptyInput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata lookup errors
///
/// A miss is not an error; see [`crate::lookup::LookupOutcome::NoMatch`].
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Storage error: {0}")]
    Storage(#[from] sonotap_common::Error),

    #[error("External resolver failed: {0}")]
    Resolver(String),
}

/// Errors that abandon a single identification cycle
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Capture failed: {0}")]
    Capture(#[from] sonotap_tap::Error),

    #[error("Fingerprint failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Storage error: {0}")]
    Storage(#[from] sonotap_common::Error),
}

impl SchedulerError {
    /// True when the cycle was abandoned because shutdown was requested
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SchedulerError::Capture(sonotap_tap::Error::Cancelled))
    }
}
