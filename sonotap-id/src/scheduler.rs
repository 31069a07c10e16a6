//! Identification scheduler
//!
//! One cooperative task runs cycles strictly one after another:
//! capture → fingerprint → lookup → suppression → history → event.
//!
//! A failed cycle is logged and the loop carries on after the interval.
//! Cancellation abandons the current cycle without writing anything and
//! ends the loop quietly.

use crate::error::SchedulerError;
use crate::fingerprint::FingerprintAlgorithm;
use crate::lookup::{LookupOutcome, MetadataResolver};
use crate::suppression::DuplicateSuppressionCache;
use async_trait::async_trait;
use sonotap_common::config::IdentificationConfig;
use sonotap_common::db::{PlayHistoryEntry, PlayHistoryStore, PlaySource, TrackMetadata};
use sonotap_common::events::{EventBus, TapEvent};
use sonotap_common::time;
use sonotap_tap::{AudioFrameBatch, SampleCapture};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where the scheduler gets its audio
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Whether the mixing engine is currently producing audio
    fn is_active(&self) -> bool;

    async fn capture(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> sonotap_tap::Result<Option<AudioFrameBatch>>;
}

#[async_trait]
impl CaptureSource for SampleCapture {
    fn is_active(&self) -> bool {
        self.tap().is_active()
    }

    async fn capture(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> sonotap_tap::Result<Option<AudioFrameBatch>> {
        SampleCapture::capture(self, duration, cancel).await
    }
}

/// Result of one identification cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Audio source inactive; nothing recorded
    SkippedInactive,
    /// Capture returned no audio; nothing recorded
    SkippedNoAudio,
    /// Same track identified within the suppression window; nothing recorded
    Suppressed { metadata: TrackMetadata },
    /// History row written and event emitted
    Identified {
        metadata: TrackMetadata,
        confidence: f64,
        fingerprint_id: Uuid,
    },
    /// History row written with `was_identified = false`
    Unidentified { fingerprint_id: Uuid },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::SkippedInactive => "skipped_inactive",
            CycleOutcome::SkippedNoAudio => "skipped_no_audio",
            CycleOutcome::Suppressed { .. } => "suppressed",
            CycleOutcome::Identified { .. } => "identified",
            CycleOutcome::Unidentified { .. } => "unidentified",
        }
    }

    /// True if this cycle wrote a history row
    pub fn recorded(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Identified { .. } | CycleOutcome::Unidentified { .. }
        )
    }
}

/// Timing and threshold settings
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub capture_duration: Duration,
    pub startup_delay: Duration,
    pub duplicate_window: chrono::Duration,
    /// Matches below this count as unidentified
    pub min_confidence: f64,
}

impl From<&IdentificationConfig> for SchedulerSettings {
    fn from(config: &IdentificationConfig) -> Self {
        Self {
            interval: config.interval(),
            capture_duration: config.capture_duration(),
            startup_delay: config.startup_delay(),
            duplicate_window: config.duplicate_window(),
            min_confidence: config.min_confidence,
        }
    }
}

pub struct IdentificationScheduler {
    capture: Arc<dyn CaptureSource>,
    fingerprinter: Arc<dyn FingerprintAlgorithm>,
    resolver: Arc<dyn MetadataResolver>,
    history: PlayHistoryStore,
    events: Arc<EventBus>,
    suppression: Mutex<DuplicateSuppressionCache>,
    settings: SchedulerSettings,
}

impl IdentificationScheduler {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        fingerprinter: Arc<dyn FingerprintAlgorithm>,
        resolver: Arc<dyn MetadataResolver>,
        history: PlayHistoryStore,
        events: Arc<EventBus>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            capture,
            fingerprinter,
            resolver,
            history,
            events,
            suppression: Mutex::new(DuplicateSuppressionCache::new(settings.duplicate_window)),
            settings,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run a single identification cycle
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleOutcome, SchedulerError> {
        self.suppression.lock().await.prune(time::now());

        if !self.capture.is_active() {
            debug!("Audio source inactive, skipping cycle");
            return Ok(CycleOutcome::SkippedInactive);
        }

        let Some(batch) = self.capture.capture(self.settings.capture_duration, cancel).await? else {
            debug!("No audio captured, skipping cycle");
            return Ok(CycleOutcome::SkippedNoAudio);
        };

        let fingerprint = self.fingerprinter.fingerprint_samples(&batch)?;
        let outcome = self.resolver.lookup(&fingerprint).await?;

        match outcome {
            LookupOutcome::Matched {
                metadata,
                confidence,
                fingerprint_id,
                ..
            } if confidence >= self.settings.min_confidence => {
                self.record_identified(metadata, confidence, fingerprint_id).await
            }
            LookupOutcome::Matched {
                confidence,
                fingerprint_id,
                ..
            } => {
                debug!(
                    confidence,
                    min_confidence = self.settings.min_confidence,
                    "Match below confidence threshold"
                );
                self.record_unidentified(fingerprint_id, Some(confidence)).await
            }
            LookupOutcome::NoMatch { fingerprint_id } => {
                self.record_unidentified(fingerprint_id, None).await
            }
        }
    }

    async fn record_identified(
        &self,
        metadata: TrackMetadata,
        confidence: f64,
        fingerprint_id: Uuid,
    ) -> Result<CycleOutcome, SchedulerError> {
        let key = metadata.track_key();
        let now = time::now();

        let mut suppression = self.suppression.lock().await;
        if suppression.is_suppressed(&key, now) {
            debug!(track = %key, "Duplicate identification suppressed");
            return Ok(CycleOutcome::Suppressed { metadata });
        }

        let entry = PlayHistoryEntry::identified(
            PlaySource::AudioTap,
            Some(fingerprint_id),
            metadata.id,
            confidence,
        );
        self.history.record(&entry).await?;
        // Only a play that made it into history opens a suppression window
        suppression.record(key, now);
        drop(suppression);

        info!(
            title = %metadata.title,
            artist = %metadata.artist,
            confidence,
            "Track identified"
        );
        self.events.emit_lossy(TapEvent::TrackIdentified {
            metadata: metadata.clone(),
            confidence,
            fingerprint_id,
            timestamp: now,
        });

        Ok(CycleOutcome::Identified {
            metadata,
            confidence,
            fingerprint_id,
        })
    }

    /// `confidence` is the score of a rejected match, if there was one
    async fn record_unidentified(
        &self,
        fingerprint_id: Uuid,
        confidence: Option<f64>,
    ) -> Result<CycleOutcome, SchedulerError> {
        let mut entry = PlayHistoryEntry::unidentified(PlaySource::AudioTap, Some(fingerprint_id));
        entry.confidence = confidence;
        self.history.record(&entry).await?;
        debug!(%fingerprint_id, "Play recorded without identification");
        Ok(CycleOutcome::Unidentified { fingerprint_id })
    }

    /// Run cycles until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs_f64(),
            capture_secs = self.settings.capture_duration.as_secs_f64(),
            startup_delay_secs = self.settings.startup_delay.as_secs_f64(),
            "Identification scheduler starting"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.stopped(0);
                return;
            }
            _ = tokio::time::sleep(self.settings.startup_delay) => {}
        }

        self.events.emit_lossy(TapEvent::SchedulerStarted {
            timestamp: time::now(),
        });

        let mut cycles_run = 0u64;
        loop {
            match self.run_cycle(&cancel).await {
                Ok(outcome) => {
                    cycles_run += 1;
                    debug!(outcome = outcome.label(), cycle = cycles_run, "Identification cycle complete");
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    cycles_run += 1;
                    error!(error = %e, cycle = cycles_run, "Identification cycle failed");
                    self.events.emit_lossy(TapEvent::IdentificationCycleFailed {
                        error: e.to_string(),
                        timestamp: time::now(),
                    });
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        self.stopped(cycles_run);
    }

    fn stopped(&self, cycles_run: u64) {
        info!(cycles_run, "Identification scheduler stopped");
        self.events.emit_lossy(TapEvent::SchedulerStopped {
            cycles_run,
            timestamp: time::now(),
        });
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        if self.settings.interval.is_zero() {
            warn!("Identification interval is zero, cycles will run back to back");
        }
        tokio::spawn(self.run(cancel))
    }
}
