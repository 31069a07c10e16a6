//! Track metadata store
//!
//! Rows are upserted by id: inserting an existing id overwrites the mutable
//! fields and bumps `updated_at`, leaving `created_at` untouched.

use super::models::TrackMetadata;
use super::{parse_uuid, parse_uuid_opt, Database};
use crate::time;
use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, fingerprint_id, title, artist, album, album_artist, genre, year,
           track_number, duration, musicbrainz_recording_id, source, created_at, updated_at
    FROM track_metadata
"#;

#[derive(Clone)]
pub struct TrackMetadataStore {
    db: Arc<Database>,
}

impl TrackMetadataStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or update by id; returns the stored row
    pub async fn upsert(&self, metadata: &TrackMetadata) -> Result<TrackMetadata> {
        let pool = self.db.pool().await?;
        let now = time::now();

        sqlx::query(
            r#"
            INSERT INTO track_metadata (
                id, fingerprint_id, title, artist, album, album_artist, genre, year,
                track_number, duration, musicbrainz_recording_id, source, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                fingerprint_id = excluded.fingerprint_id,
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                album_artist = excluded.album_artist,
                genre = excluded.genre,
                year = excluded.year,
                track_number = excluded.track_number,
                duration = excluded.duration,
                musicbrainz_recording_id = excluded.musicbrainz_recording_id,
                source = excluded.source,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(metadata.id.to_string())
        .bind(metadata.fingerprint_id.map(|id| id.to_string()))
        .bind(&metadata.title)
        .bind(&metadata.artist)
        .bind(&metadata.album)
        .bind(&metadata.album_artist)
        .bind(&metadata.genre)
        .bind(metadata.year)
        .bind(metadata.track_number)
        .bind(metadata.duration)
        .bind(&metadata.musicbrainz_recording_id)
        .bind(metadata.source.as_str())
        .bind(time::to_db(&metadata.created_at))
        .bind(time::to_db(&now))
        .execute(pool)
        .await?;

        self.get(metadata.id).await?.ok_or_else(|| {
            crate::Error::Internal(format!("metadata {} missing after upsert", metadata.id))
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<TrackMetadata>> {
        let pool = self.db.pool().await?;
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;

        row.as_ref().map(row_to_metadata).transpose()
    }

    /// Most recently updated metadata linked to a fingerprint
    pub async fn find_by_fingerprint(&self, fingerprint_id: Uuid) -> Result<Option<TrackMetadata>> {
        let pool = self.db.pool().await?;
        load_by_fingerprint(pool, fingerprint_id).await
    }

    /// Exact artist/title match, case-insensitive
    pub async fn find_by_artist_title(&self, artist: &str, title: &str) -> Result<Vec<TrackMetadata>> {
        let pool = self.db.pool().await?;
        let rows = sqlx::query(&format!(
            "{} WHERE artist = ? COLLATE NOCASE AND title = ? COLLATE NOCASE ORDER BY updated_at DESC",
            SELECT_COLUMNS
        ))
        .bind(artist)
        .bind(title)
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_metadata).collect()
    }

    /// Substring search over title, artist and album
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<TrackMetadata>> {
        let pool = self.db.pool().await?;
        let pattern = format!("%{}%", query);
        let rows = sqlx::query(&format!(
            "{} WHERE title LIKE ?1 OR artist LIKE ?1 OR album LIKE ?1 ORDER BY artist, title LIMIT ?2",
            SELECT_COLUMNS
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_metadata).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let pool = self.db.pool().await?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM track_metadata")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

pub(crate) async fn load_by_fingerprint(
    pool: &SqlitePool,
    fingerprint_id: Uuid,
) -> Result<Option<TrackMetadata>> {
    let row = sqlx::query(&format!(
        "{} WHERE fingerprint_id = ? ORDER BY updated_at DESC LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(fingerprint_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_metadata).transpose()
}

fn row_to_metadata(row: &SqliteRow) -> Result<TrackMetadata> {
    let id: String = row.get("id");
    let source: String = row.get("source");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(TrackMetadata {
        id: parse_uuid(&id)?,
        fingerprint_id: parse_uuid_opt(row.get("fingerprint_id"))?,
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
        album_artist: row.get("album_artist"),
        genre: row.get("genre"),
        year: row.get("year"),
        track_number: row.get("track_number"),
        duration: row.get("duration"),
        musicbrainz_recording_id: row.get("musicbrainz_recording_id"),
        source: source.parse()?,
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}
