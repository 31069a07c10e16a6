//! Cache-first metadata lookup
//!
//! Resolution order for a fingerprint:
//! 1. exact hash hit in the fingerprint cache with metadata attached
//! 2. no lookup credential configured: cache the bare fingerprint, no match
//! 3. delegate to the [`ExternalResolver`] and cache whatever it returns
//!
//! A miss is a normal outcome ([`LookupOutcome::NoMatch`]), never an error.

use crate::error::LookupError;
use async_trait::async_trait;
use sonotap_common::db::{
    Database, Fingerprint, FingerprintCache, MetadataSource, TrackMetadata, TrackMetadataStore,
};
use sonotap_common::{time, Error};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Confidence reported for exact cache hits
pub const CACHE_HIT_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Matched {
        metadata: TrackMetadata,
        /// 0.0 to 1.0
        confidence: f64,
        source: MetadataSource,
        /// Canonical cache id (may differ from the looked-up fingerprint's id)
        fingerprint_id: Uuid,
    },
    NoMatch {
        fingerprint_id: Uuid,
    },
}

impl LookupOutcome {
    pub fn fingerprint_id(&self) -> Uuid {
        match self {
            LookupOutcome::Matched { fingerprint_id, .. } | LookupOutcome::NoMatch { fingerprint_id } => {
                *fingerprint_id
            }
        }
    }
}

/// Result returned by an external fingerprint service
#[derive(Debug, Clone)]
pub struct ExternalMatch {
    /// AcoustID track id
    pub external_id: String,
    /// MusicBrainz recording id
    pub recording_id: Option<String>,
    pub metadata: TrackMetadata,
    /// 0.0 to 1.0
    pub score: f64,
}

/// External resolution service (AcoustID/MusicBrainz)
#[async_trait]
pub trait ExternalResolver: Send + Sync {
    async fn resolve(
        &self,
        fingerprint: &Fingerprint,
        api_key: &str,
    ) -> Result<Option<ExternalMatch>, LookupError>;
}

/// Resolver that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct StubExternalResolver;

#[async_trait]
impl ExternalResolver for StubExternalResolver {
    async fn resolve(
        &self,
        fingerprint: &Fingerprint,
        _api_key: &str,
    ) -> Result<Option<ExternalMatch>, LookupError> {
        debug!(hash = %fingerprint.hash, "External lookup not available");
        Ok(None)
    }
}

/// Seam used by the scheduler, so tests can inject failing resolvers
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<LookupOutcome, LookupError>;
}

pub struct MetadataLookupService {
    cache: FingerprintCache,
    metadata: TrackMetadataStore,
    api_key: Option<String>,
    external: Arc<dyn ExternalResolver>,
}

impl MetadataLookupService {
    /// Service using [`StubExternalResolver`]
    ///
    /// An empty or whitespace-only `api_key` counts as not configured.
    pub fn new(db: Arc<Database>, api_key: Option<String>) -> Self {
        Self::with_resolver(db, api_key, Arc::new(StubExternalResolver))
    }

    pub fn with_resolver(
        db: Arc<Database>,
        api_key: Option<String>,
        external: Arc<dyn ExternalResolver>,
    ) -> Self {
        Self {
            cache: FingerprintCache::new(Arc::clone(&db)),
            metadata: TrackMetadataStore::new(db),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            external,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Result<LookupOutcome, LookupError> {
        if let Some(cached) = self.cache.find_by_hash(&fingerprint.hash).await? {
            if let Some(metadata) = cached.metadata {
                self.cache.record_match(cached.fingerprint.id).await?;
                debug!(
                    title = %metadata.title,
                    artist = %metadata.artist,
                    matches = cached.match_count + 1,
                    "Fingerprint cache hit"
                );
                return Ok(LookupOutcome::Matched {
                    metadata,
                    confidence: CACHE_HIT_CONFIDENCE,
                    source: MetadataSource::Cache,
                    fingerprint_id: cached.fingerprint.id,
                });
            }
        }

        let Some(api_key) = self.api_key.as_deref() else {
            let stored = self.cache.store(fingerprint, None, None).await?;
            debug!(hash = %fingerprint.hash, "No match and no lookup credential, cached bare fingerprint");
            return Ok(LookupOutcome::NoMatch {
                fingerprint_id: stored.fingerprint.id,
            });
        };

        match self.external.resolve(fingerprint, api_key).await? {
            Some(found) => {
                let stored = self
                    .cache
                    .store(fingerprint, Some(&found.external_id), found.recording_id.as_deref())
                    .await?;

                let mut metadata = found.metadata;
                metadata.fingerprint_id = Some(stored.fingerprint.id);
                metadata.source = MetadataSource::External;
                if metadata.musicbrainz_recording_id.is_none() {
                    metadata.musicbrainz_recording_id = found.recording_id;
                }
                let metadata = self.metadata.upsert(&metadata).await?;

                info!(
                    title = %metadata.title,
                    artist = %metadata.artist,
                    score = found.score,
                    "External lookup matched"
                );
                Ok(LookupOutcome::Matched {
                    metadata,
                    confidence: found.score,
                    source: MetadataSource::External,
                    fingerprint_id: stored.fingerprint.id,
                })
            }
            None => {
                let stored = self.cache.store(fingerprint, None, None).await?;
                Ok(LookupOutcome::NoMatch {
                    fingerprint_id: stored.fingerprint.id,
                })
            }
        }
    }

    /// Attach metadata to a cached fingerprint by hash
    ///
    /// Later lookups of the same hash become cache hits. Re-tagging an
    /// already tagged fingerprint overwrites its metadata in place.
    pub async fn tag_fingerprint(
        &self,
        hash: &str,
        metadata: TrackMetadata,
    ) -> Result<TrackMetadata, LookupError> {
        let cached = self
            .cache
            .find_by_hash(hash)
            .await?
            .ok_or_else(|| Error::NotFound(format!("fingerprint with hash {}", hash)))?;

        let mut metadata = metadata;
        if let Some(existing) = cached.metadata {
            metadata.id = existing.id;
            metadata.created_at = existing.created_at;
        }
        metadata.fingerprint_id = Some(cached.fingerprint.id);
        metadata.source = MetadataSource::Manual;
        metadata.updated_at = time::now();

        let stored = self.metadata.upsert(&metadata).await?;
        info!(
            hash,
            title = %stored.title,
            artist = %stored.artist,
            "Fingerprint tagged"
        );
        Ok(stored)
    }
}

#[async_trait]
impl MetadataResolver for MetadataLookupService {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<LookupOutcome, LookupError> {
        MetadataLookupService::lookup(self, fingerprint).await
    }
}
