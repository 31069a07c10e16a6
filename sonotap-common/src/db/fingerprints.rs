//! Fingerprint cache
//!
//! `hash` is unique. Storing a hash that already exists merges into the
//! existing row: its id is kept, and external ids are only filled in where
//! the stored value is still NULL.

use super::metadata::load_by_fingerprint;
use super::models::{CachedFingerprint, Fingerprint};
use super::{parse_uuid, Database};
use crate::time;
use crate::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, hash, duration, external_id, external_recording_id, source_ref,
           created_at, last_matched_at, match_count
    FROM fingerprint_cache
"#;

#[derive(Clone)]
pub struct FingerprintCache {
    db: Arc<Database>,
}

impl FingerprintCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a fingerprint or merge into the row with the same hash
    ///
    /// Returns the stored row (with the canonical id, which differs from
    /// `fingerprint.id` when the hash was already cached).
    pub async fn store(
        &self,
        fingerprint: &Fingerprint,
        external_id: Option<&str>,
        external_recording_id: Option<&str>,
    ) -> Result<CachedFingerprint> {
        let pool = self.db.pool().await?;

        sqlx::query(
            r#"
            INSERT INTO fingerprint_cache (
                id, hash, duration, external_id, external_recording_id, source_ref,
                created_at, last_matched_at, match_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, 0)
            ON CONFLICT(hash) DO UPDATE SET
                external_id = COALESCE(fingerprint_cache.external_id, excluded.external_id),
                external_recording_id = COALESCE(fingerprint_cache.external_recording_id, excluded.external_recording_id),
                source_ref = COALESCE(fingerprint_cache.source_ref, excluded.source_ref)
            "#,
        )
        .bind(fingerprint.id.to_string())
        .bind(&fingerprint.hash)
        .bind(fingerprint.duration)
        .bind(external_id)
        .bind(external_recording_id)
        .bind(&fingerprint.source_ref)
        .bind(time::to_db(&fingerprint.created_at))
        .execute(pool)
        .await?;

        debug!(hash = %fingerprint.hash, "Fingerprint stored");

        load_by_hash(pool, &fingerprint.hash)
            .await?
            .ok_or_else(|| Error::Internal(format!("fingerprint {} missing after store", fingerprint.hash)))
    }

    /// Exact hash lookup, with linked metadata if any
    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<CachedFingerprint>> {
        let pool = self.db.pool().await?;
        load_by_hash(pool, hash).await
    }

    /// Lookup by AcoustID id
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<CachedFingerprint>> {
        let pool = self.db.pool().await?;
        let row = sqlx::query(&format!("{} WHERE external_id = ? LIMIT 1", SELECT_COLUMNS))
            .bind(external_id)
            .fetch_optional(pool)
            .await?;

        match row {
            Some(row) => Ok(Some(with_metadata(pool, row_to_cached(&row)?).await?)),
            None => Ok(None),
        }
    }

    /// Bump match count and last-matched timestamp
    pub async fn record_match(&self, id: Uuid) -> Result<()> {
        let pool = self.db.pool().await?;
        let result = sqlx::query(
            "UPDATE fingerprint_cache SET match_count = match_count + 1, last_matched_at = ? WHERE id = ?",
        )
        .bind(time::to_db(&time::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("fingerprint {}", id)));
        }
        Ok(())
    }

    /// Cached fingerprints with no metadata attached, newest first
    ///
    /// These are the candidates for manual tagging.
    pub async fn list_untagged(&self, limit: i64) -> Result<Vec<CachedFingerprint>> {
        let pool = self.db.pool().await?;
        let rows = sqlx::query(&format!(
            r#"{} WHERE NOT EXISTS (
                SELECT 1 FROM track_metadata m WHERE m.fingerprint_id = fingerprint_cache.id
            )
            ORDER BY created_at DESC LIMIT ?"#,
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_cached).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let pool = self.db.pool().await?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM fingerprint_cache")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

async fn load_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<CachedFingerprint>> {
    let row = sqlx::query(&format!("{} WHERE hash = ?", SELECT_COLUMNS))
        .bind(hash)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(with_metadata(pool, row_to_cached(&row)?).await?)),
        None => Ok(None),
    }
}

async fn with_metadata(pool: &SqlitePool, mut cached: CachedFingerprint) -> Result<CachedFingerprint> {
    cached.metadata = load_by_fingerprint(pool, cached.fingerprint.id).await?;
    Ok(cached)
}

fn row_to_cached(row: &SqliteRow) -> Result<CachedFingerprint> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");

    Ok(CachedFingerprint {
        fingerprint: Fingerprint {
            id: parse_uuid(&id)?,
            hash: row.get("hash"),
            duration: row.get("duration"),
            created_at: time::from_db(&created_at)?,
            source_ref: row.get("source_ref"),
        },
        external_id: row.get("external_id"),
        external_recording_id: row.get("external_recording_id"),
        metadata: None,
        match_count: row.get("match_count"),
        last_matched_at: time::from_db_opt(row.get("last_matched_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MetadataSource, TrackMetadata};
    use crate::db::TrackMetadataStore;

    fn db() -> Arc<Database> {
        Arc::new(Database::in_memory())
    }

    #[tokio::test]
    async fn test_same_hash_merges_into_one_row() {
        let cache = FingerprintCache::new(db());

        let first = Fingerprint::new("aGFzaA==".to_string(), 10.0, None);
        let second = Fingerprint::new("aGFzaA==".to_string(), 10.0, Some("tap".to_string()));

        let stored_first = cache.store(&first, None, None).await.unwrap();
        let stored_second = cache.store(&second, Some("acoustid-1"), None).await.unwrap();

        assert_eq!(cache.count().await.unwrap(), 1);
        assert_eq!(stored_second.fingerprint.id, stored_first.fingerprint.id);
        assert_eq!(stored_second.fingerprint.id, first.id);
        assert_eq!(stored_second.external_id.as_deref(), Some("acoustid-1"));
        assert_eq!(stored_second.fingerprint.source_ref.as_deref(), Some("tap"));
    }

    #[tokio::test]
    async fn test_merge_does_not_overwrite_external_ids() {
        let cache = FingerprintCache::new(db());
        let fp = Fingerprint::new("Zm9v".to_string(), 5.0, None);

        cache.store(&fp, Some("original"), Some("rec-1")).await.unwrap();
        let merged = cache.store(&fp, Some("replacement"), Some("rec-2")).await.unwrap();

        assert_eq!(merged.external_id.as_deref(), Some("original"));
        assert_eq!(merged.external_recording_id.as_deref(), Some("rec-1"));
    }

    #[tokio::test]
    async fn test_record_match_increments() {
        let cache = FingerprintCache::new(db());
        let stored = cache
            .store(&Fingerprint::new("YmFy".to_string(), 5.0, None), None, None)
            .await
            .unwrap();
        assert_eq!(stored.match_count, 0);
        assert!(stored.last_matched_at.is_none());

        cache.record_match(stored.fingerprint.id).await.unwrap();
        cache.record_match(stored.fingerprint.id).await.unwrap();

        let reloaded = cache.find_by_hash("YmFy").await.unwrap().unwrap();
        assert_eq!(reloaded.match_count, 2);
        assert!(reloaded.last_matched_at.is_some());
    }

    #[tokio::test]
    async fn test_record_match_unknown_id_is_not_found() {
        let cache = FingerprintCache::new(db());
        assert!(matches!(
            cache.record_match(Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_hash_attaches_metadata() {
        let db = db();
        let cache = FingerprintCache::new(Arc::clone(&db));
        let tracks = TrackMetadataStore::new(Arc::clone(&db));

        let stored = cache
            .store(&Fingerprint::new("YmF6".to_string(), 8.0, None), None, None)
            .await
            .unwrap();
        assert!(stored.metadata.is_none());
        assert_eq!(cache.list_untagged(10).await.unwrap().len(), 1);

        tracks
            .upsert(
                &TrackMetadata::new("Halcyon", "Orbital", MetadataSource::Manual)
                    .with_fingerprint(stored.fingerprint.id),
            )
            .await
            .unwrap();

        let hit = cache.find_by_hash("YmF6").await.unwrap().unwrap();
        assert_eq!(hit.metadata.unwrap().title, "Halcyon");
        assert!(cache.list_untagged(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_external_id() {
        let cache = FingerprintCache::new(db());
        cache
            .store(&Fingerprint::new("cXV4".to_string(), 3.0, None), Some("ext-9"), None)
            .await
            .unwrap();

        assert!(cache.find_by_external_id("ext-9").await.unwrap().is_some());
        assert!(cache.find_by_external_id("ext-0").await.unwrap().is_none());
    }
}
