//! End-to-end identification tests
//!
//! Real tap buffer, capture, digest fingerprinter, lookup service and
//! in-memory SQLite; only the mixing engine is simulated by writing a tone
//! straight into the tap.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use sonotap_common::config::AudioFormat;
use sonotap_common::db::{
    Database, FingerprintCache, MetadataSource, PlayHistoryStore, TrackMetadata,
};
use sonotap_common::events::{EventBus, TapEvent};
use sonotap_id::scheduler::SchedulerSettings;
use sonotap_id::{
    CycleOutcome, DigestFingerprinter, IdentificationScheduler, MetadataLookupService,
    MetadataResolver,
};
use sonotap_tap::capture::CaptureSettings;
use sonotap_tap::{AudioTapBuffer, SampleCapture};
use tokio_util::sync::CancellationToken;

const FORMAT: AudioFormat = AudioFormat {
    sample_rate: 8000,
    channels: 2,
};

struct Harness {
    db: Arc<Database>,
    tap: Arc<AudioTapBuffer>,
    lookup: Arc<MetadataLookupService>,
    events: Arc<EventBus>,
    scheduler: Arc<IdentificationScheduler>,
}

impl Harness {
    fn new() -> Self {
        let db = Arc::new(Database::in_memory());
        let tap = Arc::new(AudioTapBuffer::new(FORMAT, 2).unwrap());
        let capture = Arc::new(SampleCapture::new(Arc::clone(&tap), CaptureSettings::default()));
        let lookup = Arc::new(MetadataLookupService::new(Arc::clone(&db), None));
        let events = Arc::new(EventBus::new(16));

        let settings = SchedulerSettings {
            interval: Duration::from_millis(20),
            capture_duration: Duration::from_millis(250),
            startup_delay: Duration::ZERO,
            duplicate_window: chrono::Duration::seconds(300),
            min_confidence: 0.5,
        };
        let scheduler = Arc::new(IdentificationScheduler::new(
            capture,
            Arc::new(DigestFingerprinter::new()),
            Arc::clone(&lookup) as Arc<dyn MetadataResolver>,
            PlayHistoryStore::new(Arc::clone(&db)),
            Arc::clone(&events),
            settings,
        ));

        Self {
            db,
            tap,
            lookup,
            events,
            scheduler,
        }
    }

    /// Simulate the engine playing 250 ms of a tone
    fn play(&self, freq: f32) {
        let frames = FORMAT.sample_rate as usize / 4;
        let samples: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let s = 0.5 * (2.0 * PI * freq * i as f32 / FORMAT.sample_rate as f32).sin();
                [s, s]
            })
            .collect();
        self.tap.set_active(true);
        self.tap.write(&samples);
    }

    fn history(&self) -> PlayHistoryStore {
        PlayHistoryStore::new(Arc::clone(&self.db))
    }

    fn cache(&self) -> FingerprintCache {
        FingerprintCache::new(Arc::clone(&self.db))
    }
}

#[tokio::test]
async fn test_inactive_source_writes_no_history() {
    let h = Harness::new();
    let outcome = h.scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, CycleOutcome::SkippedInactive);
    assert_eq!(h.history().count().await.unwrap(), 0);
    assert_eq!(h.cache().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cache_miss_without_credential() {
    let h = Harness::new();
    let mut rx = h.events.subscribe();
    h.play(440.0);

    let outcome = h.scheduler.run_cycle(&CancellationToken::new()).await.unwrap();
    let CycleOutcome::Unidentified { fingerprint_id } = outcome else {
        panic!("expected unidentified, got {:?}", outcome);
    };

    // Bare fingerprint cached for later tagging
    let untagged = h.cache().list_untagged(10).await.unwrap();
    assert_eq!(untagged.len(), 1);
    assert_eq!(untagged[0].fingerprint.id, fingerprint_id);
    assert!(untagged[0].metadata.is_none());

    let history = h.history().recent(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].was_identified);
    assert_eq!(history[0].fingerprint_id, Some(fingerprint_id));
    assert!(history[0].track_metadata_id.is_none());

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_cache_hit_identifies_once_then_suppresses() {
    let h = Harness::new();
    let cancel = CancellationToken::new();

    // First play: unknown, cached bare
    h.play(440.0);
    h.scheduler.run_cycle(&cancel).await.unwrap();
    let hash = h.cache().list_untagged(1).await.unwrap()[0].fingerprint.hash.clone();

    h.lookup
        .tag_fingerprint(&hash, TrackMetadata::new("A Song", "A Band", MetadataSource::Manual))
        .await
        .unwrap();

    let mut rx = h.events.subscribe();

    // Same audio again: cache hit
    h.play(440.0);
    let outcome = h.scheduler.run_cycle(&cancel).await.unwrap();
    let CycleOutcome::Identified {
        metadata,
        confidence,
        ..
    } = outcome
    else {
        panic!("expected identified, got {:?}", outcome);
    };
    assert_eq!(metadata.title, "A Song");
    assert_eq!(confidence, 1.0);

    match rx.try_recv().unwrap() {
        TapEvent::TrackIdentified { metadata, .. } => assert_eq!(metadata.artist, "A Band"),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(rx.try_recv().is_err());

    let identified: Vec<_> = h
        .history()
        .recent(10)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.was_identified)
        .collect();
    assert_eq!(identified.len(), 1);
    assert_eq!(identified[0].track_metadata_id, Some(metadata.id));

    // Third play inside the window: suppressed, nothing new written
    h.play(440.0);
    let outcome = h.scheduler.run_cycle(&cancel).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Suppressed { .. }));
    assert!(rx.try_recv().is_err());
    assert_eq!(h.history().count().await.unwrap(), 2);

    let cached = h.cache().find_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(cached.match_count, 2);
}

#[tokio::test]
async fn test_different_audio_is_a_different_fingerprint() {
    let h = Harness::new();
    let cancel = CancellationToken::new();

    h.play(440.0);
    h.scheduler.run_cycle(&cancel).await.unwrap();
    h.play(880.0);
    h.scheduler.run_cycle(&cancel).await.unwrap();

    assert_eq!(h.cache().count().await.unwrap(), 2);
    assert_eq!(h.history().count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_statistics_after_identification() {
    let h = Harness::new();
    let cancel = CancellationToken::new();

    h.play(440.0);
    h.scheduler.run_cycle(&cancel).await.unwrap();
    let hash = h.cache().list_untagged(1).await.unwrap()[0].fingerprint.hash.clone();
    h.lookup
        .tag_fingerprint(&hash, TrackMetadata::new("Tune", "Player", MetadataSource::Manual))
        .await
        .unwrap();
    h.play(440.0);
    h.scheduler.run_cycle(&cancel).await.unwrap();

    let stats = h.history().statistics(5).await.unwrap();
    assert_eq!(stats.total_plays, 2);
    assert_eq!(stats.identified_plays, 1);
    assert_eq!(stats.unidentified_plays, 1);
    assert_eq!(stats.top_artists.len(), 1);
    assert_eq!(stats.top_artists[0].artist, "Player");
}

#[tokio::test]
async fn test_scheduler_loop_stops_on_cancel() {
    let h = Harness::new();
    let mut rx = h.events.subscribe();
    let cancel = CancellationToken::new();
    h.play(440.0);

    let handle = Arc::clone(&h.scheduler).spawn(cancel.clone());
    assert!(matches!(rx.recv().await.unwrap(), TapEvent::SchedulerStarted { .. }));

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.history().count().await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    let mut stopped = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, TapEvent::SchedulerStopped { .. }) {
            stopped = true;
        }
    }
    assert!(stopped);
}
