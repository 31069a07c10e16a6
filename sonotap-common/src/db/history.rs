//! Play history store
//!
//! Append-only: rows are inserted and never updated. The only deletions are
//! the explicit clearing operations. Statistics are computed at query time
//! with grouped aggregation; nothing is materialized.

use super::models::{ArtistPlays, PlayHistoryEntry, PlaySource, PlayStatistics, TrackPlays};
use super::{parse_uuid, parse_uuid_opt, Database};
use crate::time;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;
use tracing::info;

const SELECT_COLUMNS: &str = r#"
    SELECT id, track_metadata_id, fingerprint_id, played_at, source, confidence, was_identified
    FROM play_history
"#;

#[derive(Clone)]
pub struct PlayHistoryStore {
    db: Arc<Database>,
}

impl PlayHistoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn record(&self, entry: &PlayHistoryEntry) -> Result<()> {
        let pool = self.db.pool().await?;

        sqlx::query(
            r#"
            INSERT INTO play_history (
                id, track_metadata_id, fingerprint_id, played_at, source, confidence, was_identified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.track_metadata_id.map(|id| id.to_string()))
        .bind(entry.fingerprint_id.map(|id| id.to_string()))
        .bind(time::to_db(&entry.played_at))
        .bind(entry.source.as_str())
        .bind(entry.confidence)
        .bind(entry.was_identified)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Newest entries first
    pub async fn recent(&self, limit: i64) -> Result<Vec<PlayHistoryEntry>> {
        let pool = self.db.pool().await?;
        let rows = sqlx::query(&format!("{} ORDER BY played_at DESC LIMIT ?", SELECT_COLUMNS))
            .bind(limit)
            .fetch_all(pool)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Entries with `from <= played_at < to`, oldest first
    pub async fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PlayHistoryEntry>> {
        let pool = self.db.pool().await?;
        let rows = sqlx::query(&format!(
            "{} WHERE played_at >= ? AND played_at < ? ORDER BY played_at ASC",
            SELECT_COLUMNS
        ))
        .bind(time::to_db(&from))
        .bind(time::to_db(&to))
        .fetch_all(pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let pool = self.db.pool().await?;
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM play_history")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Totals, per-source counts and top artists/tracks
    pub async fn statistics(&self, top_n: i64) -> Result<PlayStatistics> {
        let pool = self.db.pool().await?;

        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(was_identified), 0) AS identified,
                   MIN(played_at) AS first_play,
                   MAX(played_at) AS last_play
            FROM play_history
            "#,
        )
        .fetch_one(pool)
        .await?;

        let total_plays: i64 = totals.get("total");
        let identified_plays: i64 = totals.get("identified");

        let by_source = sqlx::query(
            "SELECT source, COUNT(*) AS plays FROM play_history GROUP BY source ORDER BY plays DESC, source ASC",
        )
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| -> Result<(PlaySource, i64)> {
            let source: String = row.get("source");
            Ok((source.parse::<PlaySource>()?, row.get::<i64, _>("plays")))
        })
        .collect::<Result<Vec<_>>>()?;

        let top_artists = sqlx::query(
            r#"
            SELECT m.artist AS artist, COUNT(*) AS plays
            FROM play_history h
            JOIN track_metadata m ON m.id = h.track_metadata_id
            WHERE h.was_identified = 1
            GROUP BY m.artist
            ORDER BY plays DESC, m.artist ASC
            LIMIT ?
            "#,
        )
        .bind(top_n)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| ArtistPlays {
            artist: row.get("artist"),
            plays: row.get("plays"),
        })
        .collect();

        let top_tracks = sqlx::query(
            r#"
            SELECT m.title AS title, m.artist AS artist, COUNT(*) AS plays
            FROM play_history h
            JOIN track_metadata m ON m.id = h.track_metadata_id
            WHERE h.was_identified = 1
            GROUP BY m.title, m.artist
            ORDER BY plays DESC, m.title ASC
            LIMIT ?
            "#,
        )
        .bind(top_n)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| TrackPlays {
            title: row.get("title"),
            artist: row.get("artist"),
            plays: row.get("plays"),
        })
        .collect();

        Ok(PlayStatistics {
            total_plays,
            identified_plays,
            unidentified_plays: total_plays - identified_plays,
            plays_by_source: by_source,
            top_artists,
            top_tracks,
            first_play: time::from_db_opt(totals.get("first_play"))?,
            last_play: time::from_db_opt(totals.get("last_play"))?,
        })
    }

    /// Delete every entry; returns rows removed
    pub async fn clear_all(&self) -> Result<u64> {
        let pool = self.db.pool().await?;
        let removed = sqlx::query("DELETE FROM play_history")
            .execute(pool)
            .await?
            .rows_affected();
        info!(removed, "Play history cleared");
        Ok(removed)
    }

    /// Delete entries played before `cutoff`; returns rows removed
    pub async fn clear_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let pool = self.db.pool().await?;
        let removed = sqlx::query("DELETE FROM play_history WHERE played_at < ?")
            .bind(time::to_db(&cutoff))
            .execute(pool)
            .await?
            .rows_affected();
        info!(removed, cutoff = %cutoff, "Play history pruned");
        Ok(removed)
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<PlayHistoryEntry> {
    let id: String = row.get("id");
    let played_at: String = row.get("played_at");
    let source: String = row.get("source");

    Ok(PlayHistoryEntry {
        id: parse_uuid(&id)?,
        played_at: time::from_db(&played_at)?,
        source: source.parse()?,
        fingerprint_id: parse_uuid_opt(row.get("fingerprint_id"))?,
        track_metadata_id: parse_uuid_opt(row.get("track_metadata_id"))?,
        confidence: row.get("confidence"),
        was_identified: row.get("was_identified"),
    })
}
