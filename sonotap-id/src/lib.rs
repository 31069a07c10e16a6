//! # Sonotap Identification Library (sonotap-id)
//!
//! Background side of Sonotap: periodically captures audio from the tap,
//! fingerprints it, resolves metadata cache-first and records play history.
//!
//! - [`fingerprint`]: placeholder content digest behind [`fingerprint::FingerprintAlgorithm`]
//! - [`lookup`]: cache-first metadata resolution
//! - [`suppression`]: time-windowed duplicate suppression
//! - [`scheduler`]: the identification loop

pub mod error;
pub mod fingerprint;
pub mod lookup;
pub mod scheduler;
pub mod suppression;

pub use error::{FingerprintError, LookupError, SchedulerError};
pub use fingerprint::{DigestFingerprinter, FingerprintAlgorithm};
pub use lookup::{LookupOutcome, MetadataLookupService, MetadataResolver};
pub use scheduler::{CaptureSource, CycleOutcome, IdentificationScheduler};
pub use suppression::DuplicateSuppressionCache;
