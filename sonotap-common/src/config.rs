//! Bootstrap configuration
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (applied by the binary after loading)
//! 2. Explicit TOML file (`--config` / `SONOTAP_CONFIG`)
//! 3. `<config dir>/sonotap/config.toml`
//! 4. Built-in defaults (code constants)
//!
//! Library components never read files: they take the validated section
//! structs defined here.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to SQLite database file
    pub database_path: PathBuf,

    pub audio: AudioFormat,

    pub visualization: VisualizationConfig,

    pub identification: IdentificationConfig,

    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            audio: AudioFormat::default(),
            visualization: VisualizationConfig::default(),
            identification: IdentificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// PCM stream format produced by the mixing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// PCM16 bytes per second of audio
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    /// Bytes in one interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * Self::BYTES_PER_SAMPLE
    }
}

/// Visualization engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    /// FFT window size (power of two)
    pub fft_size: usize,

    /// Samples per channel kept for waveform display
    pub waveform_samples: usize,

    /// How long a new peak is held before decaying
    pub peak_hold_ms: u64,

    /// Multiplier applied to the held peak on each call after the hold expires
    pub peak_decay: f32,

    /// One-pole smoothing factor for RMS (0 = none)
    pub rms_smoothing: f32,

    /// One-pole smoothing factor for spectrum magnitudes (0 = none)
    pub spectrum_smoothing: f32,

    /// Apply a Hann window before the FFT
    pub use_window: bool,

    /// Largest callback block (frames) the mono scratch is pre-sized for
    pub max_block_frames: usize,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            waveform_samples: 1024,
            peak_hold_ms: 1500,
            peak_decay: 0.95,
            rms_smoothing: 0.8,
            spectrum_smoothing: 0.7,
            use_window: true,
            max_block_frames: 4096,
        }
    }
}

/// Identification scheduler settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentificationConfig {
    pub enabled: bool,

    /// Pause between cycles
    pub interval_secs: u64,

    /// Audio captured per cycle
    pub capture_seconds: u64,

    /// Grace delay before the first cycle
    pub startup_delay_secs: u64,

    /// Repeat identifications of the same track inside this window are suppressed
    pub duplicate_window_secs: u64,

    /// Matches below this confidence count as unidentified
    pub min_confidence: f64,

    /// Seconds of audio the tap ring buffer holds
    pub tap_window_seconds: u64,

    /// Poll interval while waiting for tap data
    pub poll_interval_ms: u64,

    /// Capture ends early when no bytes arrive for this long
    pub idle_timeout_ms: u64,

    /// Credential for external lookups (AcoustID); absent = cache only
    pub lookup_api_key: Option<String>,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            capture_seconds: 10,
            startup_delay_secs: 5,
            duplicate_window_secs: 300,
            min_confidence: 0.5,
            tap_window_seconds: 15,
            poll_interval_ms: 100,
            idle_timeout_ms: 1000,
            lookup_api_key: None,
        }
    }
}

impl IdentificationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn capture_duration(&self) -> Duration {
        Duration::from_secs(self.capture_seconds)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn duplicate_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.duplicate_window_secs as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or full EnvFilter syntax)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Load configuration from an explicit path, the user config file, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_file() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file (no validation)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Reject malformed startup configuration
    pub fn validate(&self) -> Result<()> {
        validate_audio(&self.audio)?;
        validate_visualization(&self.visualization)?;
        validate_identification(&self.identification)?;
        Ok(())
    }
}

pub fn validate_audio(audio: &AudioFormat) -> Result<()> {
    if audio.sample_rate == 0 {
        return Err(Error::Config("audio.sample_rate must be positive".to_string()));
    }
    if audio.channels == 0 {
        return Err(Error::Config("audio.channels must be positive".to_string()));
    }
    Ok(())
}

pub fn validate_visualization(viz: &VisualizationConfig) -> Result<()> {
    if viz.fft_size < 2 || !viz.fft_size.is_power_of_two() {
        return Err(Error::Config(format!(
            "visualization.fft_size must be a power of two >= 2 (got {})",
            viz.fft_size
        )));
    }
    if viz.waveform_samples == 0 {
        return Err(Error::Config("visualization.waveform_samples must be positive".to_string()));
    }
    if !(0.0..1.0).contains(&viz.rms_smoothing) || !(0.0..1.0).contains(&viz.spectrum_smoothing) {
        return Err(Error::Config("smoothing factors must be in [0, 1)".to_string()));
    }
    if !(viz.peak_decay > 0.0 && viz.peak_decay <= 1.0) {
        return Err(Error::Config("visualization.peak_decay must be in (0, 1]".to_string()));
    }
    Ok(())
}

/// Longest single capture (seconds)
pub const MAX_CAPTURE_SECONDS: u64 = 600;

/// Longest tap ring window (seconds)
pub const MAX_TAP_WINDOW_SECONDS: u64 = 3600;

pub fn validate_identification(id: &IdentificationConfig) -> Result<()> {
    if id.interval_secs == 0 || id.capture_seconds == 0 || id.tap_window_seconds == 0 {
        return Err(Error::Config(
            "identification interval, capture and tap window must be positive".to_string(),
        ));
    }
    if id.capture_seconds > MAX_CAPTURE_SECONDS {
        return Err(Error::Config(format!(
            "identification.capture_seconds must be at most {}",
            MAX_CAPTURE_SECONDS
        )));
    }
    if id.tap_window_seconds > MAX_TAP_WINDOW_SECONDS {
        return Err(Error::Config(format!(
            "identification.tap_window_seconds must be at most {}",
            MAX_TAP_WINDOW_SECONDS
        )));
    }
    if id.poll_interval_ms == 0 {
        return Err(Error::Config("identification.poll_interval_ms must be positive".to_string()));
    }
    if id.idle_timeout_ms < id.poll_interval_ms {
        return Err(Error::Config(
            "identification.idle_timeout_ms must be at least poll_interval_ms".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&id.min_confidence) {
        return Err(Error::Config("identification.min_confidence must be in [0, 1]".to_string()));
    }
    Ok(())
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sonotap").join("config.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sonotap").join("sonotap.db"))
        .unwrap_or_else(|| PathBuf::from("./sonotap_data/sonotap.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        TomlConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            database_path = "/tmp/tap.db"

            [visualization]
            fft_size = 1024

            [identification]
            interval_secs = 60
            lookup_api_key = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/tap.db"));
        assert_eq!(config.visualization.fft_size, 1024);
        assert_eq!(config.visualization.waveform_samples, 1024);
        assert_eq!(config.identification.interval(), Duration::from_secs(60));
        assert_eq!(config.identification.lookup_api_key.as_deref(), Some("abc"));
        assert_eq!(config.audio, AudioFormat::default());
    }

    #[test]
    fn test_fft_size_must_be_power_of_two() {
        let mut config = TomlConfig::default();
        config.visualization.fft_size = 1000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let mut config = TomlConfig::default();
        config.audio.sample_rate = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_oversized_capture_rejected() {
        let config = TomlConfig::from_toml_str(
            r#"
            [identification]
            capture_seconds = 9223372036854775807
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.identification.capture_seconds = MAX_CAPTURE_SECONDS;
        config.validate().unwrap();
        config.identification.tap_window_seconds = MAX_TAP_WINDOW_SECONDS + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_idle_timeout_shorter_than_poll_rejected() {
        let mut config = TomlConfig::default();
        config.identification.idle_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.identification.idle_timeout_ms = config.identification.poll_interval_ms;
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            TomlConfig::from_toml_str("database_path = ["),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = TomlConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_byte_rate() {
        let format = AudioFormat { sample_rate: 48000, channels: 2 };
        assert_eq!(format.byte_rate(), 192_000);
        assert_eq!(format.frame_bytes(), 4);
    }
}
