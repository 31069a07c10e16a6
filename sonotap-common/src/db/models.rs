//! Persisted domain models
//!
//! Plain data carried between the stores, the lookup service and the
//! scheduler. Row mapping lives with each store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Where a piece of track metadata came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    Cache,
    Manual,
    FileTag,
    External,
    Fingerprinting,
}

impl MetadataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataSource::Cache => "cache",
            MetadataSource::Manual => "manual",
            MetadataSource::FileTag => "file_tag",
            MetadataSource::External => "external",
            MetadataSource::Fingerprinting => "fingerprinting",
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache" => Ok(MetadataSource::Cache),
            "manual" => Ok(MetadataSource::Manual),
            "file_tag" => Ok(MetadataSource::FileTag),
            "external" => Ok(MetadataSource::External),
            "fingerprinting" => Ok(MetadataSource::Fingerprinting),
            other => Err(Error::InvalidInput(format!("unknown metadata source '{}'", other))),
        }
    }
}

/// How a play was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaySource {
    /// Identified from the mixing engine's output tap
    AudioTap,
    /// Recorded from a known local file
    File,
    /// Entered by hand
    Manual,
}

impl PlaySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaySource::AudioTap => "audio_tap",
            PlaySource::File => "file",
            PlaySource::Manual => "manual",
        }
    }
}

impl fmt::Display for PlaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaySource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio_tap" => Ok(PlaySource::AudioTap),
            "file" => Ok(PlaySource::File),
            "manual" => Ok(PlaySource::Manual),
            other => Err(Error::InvalidInput(format!("unknown play source '{}'", other))),
        }
    }
}

/// Content fingerprint, immutable once generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub id: Uuid,
    /// Base64 content hash (cache key)
    pub hash: String,
    /// Seconds of audio the hash covers
    pub duration: f64,
    pub created_at: DateTime<Utc>,
    /// File path or stream label the audio came from
    pub source_ref: Option<String>,
}

impl Fingerprint {
    pub fn new(hash: String, duration: f64, source_ref: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hash,
            duration,
            created_at: Utc::now(),
            source_ref,
        }
    }
}

/// Fingerprint as stored in the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFingerprint {
    pub fingerprint: Fingerprint,
    /// AcoustID track id
    pub external_id: Option<String>,
    /// MusicBrainz recording id
    pub external_recording_id: Option<String>,
    pub metadata: Option<TrackMetadata>,
    pub match_count: i64,
    pub last_matched_at: Option<DateTime<Utc>>,
}

/// Descriptive track data, upserted by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: Uuid,
    pub fingerprint_id: Option<Uuid>,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<i32>,
    /// Seconds
    pub duration: Option<f64>,
    pub musicbrainz_recording_id: Option<String>,
    pub source: MetadataSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, source: MetadataSource) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fingerprint_id: None,
            title: title.into(),
            artist: artist.into(),
            album: None,
            album_artist: None,
            genre: None,
            year: None,
            track_number: None,
            duration: None,
            musicbrainz_recording_id: None,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint_id: Uuid) -> Self {
        self.fingerprint_id = Some(fingerprint_id);
        self
    }

    /// Key used for duplicate suppression: `title|artist`, trimmed and case-folded
    pub fn track_key(&self) -> String {
        format!(
            "{}|{}",
            self.title.trim().to_lowercase(),
            self.artist.trim().to_lowercase()
        )
    }
}

/// One observed play, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayHistoryEntry {
    pub id: Uuid,
    pub played_at: DateTime<Utc>,
    pub source: PlaySource,
    pub fingerprint_id: Option<Uuid>,
    pub track_metadata_id: Option<Uuid>,
    pub confidence: Option<f64>,
    pub was_identified: bool,
}

impl PlayHistoryEntry {
    pub fn identified(
        source: PlaySource,
        fingerprint_id: Option<Uuid>,
        track_metadata_id: Uuid,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            played_at: Utc::now(),
            source,
            fingerprint_id,
            track_metadata_id: Some(track_metadata_id),
            confidence: Some(confidence),
            was_identified: true,
        }
    }

    pub fn unidentified(source: PlaySource, fingerprint_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            played_at: Utc::now(),
            source,
            fingerprint_id,
            track_metadata_id: None,
            confidence: None,
            was_identified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistPlays {
    pub artist: String,
    pub plays: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPlays {
    pub title: String,
    pub artist: String,
    pub plays: i64,
}

/// Play history aggregates, computed at query time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayStatistics {
    pub total_plays: i64,
    pub identified_plays: i64,
    pub unidentified_plays: i64,
    pub plays_by_source: Vec<(PlaySource, i64)>,
    pub top_artists: Vec<ArtistPlays>,
    pub top_tracks: Vec<TrackPlays>,
    pub first_play: Option<DateTime<Utc>>,
    pub last_play: Option<DateTime<Utc>>,
}
