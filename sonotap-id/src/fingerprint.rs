//! Content fingerprinting
//!
//! [`DigestFingerprinter`] is a placeholder: it hashes a coarse sample of the
//! signal, so only bit-identical captures produce the same hash. A real
//! acoustic fingerprint (Chromaprint) can replace it behind
//! [`FingerprintAlgorithm`] without touching the scheduler.

use crate::error::FingerprintError;
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use sonotap_common::db::Fingerprint;
use sonotap_tap::AudioFrameBatch;
use std::path::Path;

/// Number of points sampled from a capture
const DIGEST_POINTS: usize = 128;

/// Bytes of the file digest kept in the hash
const FILE_DIGEST_BYTES: usize = 16;

/// Byte rate assumed when estimating file duration (44.1 kHz, stereo, 16-bit)
const ASSUMED_FILE_BYTE_RATE: f64 = 44100.0 * 2.0 * 2.0;

pub trait FingerprintAlgorithm: Send + Sync {
    /// Fingerprint captured audio
    fn fingerprint_samples(&self, batch: &AudioFrameBatch) -> Result<Fingerprint, FingerprintError>;

    /// Fingerprint a file on disk
    fn fingerprint_file(&self, path: &Path) -> Result<Fingerprint, FingerprintError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DigestFingerprinter;

impl DigestFingerprinter {
    pub fn new() -> Self {
        Self
    }
}

impl FingerprintAlgorithm for DigestFingerprinter {
    fn fingerprint_samples(&self, batch: &AudioFrameBatch) -> Result<Fingerprint, FingerprintError> {
        let samples = &batch.samples;
        if samples.is_empty() {
            return Err(FingerprintError::EmptyInput);
        }

        let stride = (samples.len() / DIGEST_POINTS).max(1);
        let points: Vec<u8> = samples
            .iter()
            .step_by(stride)
            .take(DIGEST_POINTS)
            .map(|&x| ((x + 1.0) * 127.5).clamp(0.0, 255.0) as u8)
            .collect();

        let digest = Sha256::digest(&points);
        let hash = general_purpose::STANDARD.encode(digest);

        Ok(Fingerprint::new(hash, batch.duration_seconds(), None))
    }

    fn fingerprint_file(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        let bytes = std::fs::read(path)?;
        let digest = Sha256::digest(&bytes);
        let hash = general_purpose::STANDARD.encode(&digest[..FILE_DIGEST_BYTES]);
        let duration = bytes.len() as f64 / ASSUMED_FILE_BYTE_RATE;

        Ok(Fingerprint::new(hash, duration, Some(path.display().to_string())))
    }
}
