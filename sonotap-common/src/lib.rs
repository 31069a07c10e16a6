//! # Sonotap Common Library
//!
//! Shared code for the Sonotap crates:
//! - Error types
//! - Bootstrap configuration (TOML) and validated component settings
//! - Domain events and the EventBus
//! - SQLite persistence: fingerprint cache, track metadata, play history
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
