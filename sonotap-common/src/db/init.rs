//! Database initialization
//!
//! Opens the single shared connection and creates tables and indexes.
//! Every statement is idempotent (`IF NOT EXISTS`).

use super::DbLocation;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

pub(super) async fn init_database(location: &DbLocation) -> Result<SqlitePool> {
    let url = match location {
        DbLocation::File(path) => {
            let newly_created = !path.exists();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            if newly_created {
                info!("Creating new database: {}", path.display());
            } else {
                info!("Opening existing database: {}", path.display());
            }
            format!("sqlite://{}?mode=rwc", path.display())
        }
        DbLocation::Memory => "sqlite::memory:".to_string(),
    };

    // One connection: an in-memory database only exists on the connection
    // that created it, and the store is not write-concurrent anyway.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(&url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;
    if matches!(location, DbLocation::File(_)) {
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    }

    create_fingerprint_cache_table(&pool).await?;
    create_track_metadata_table(&pool).await?;
    create_play_history_table(&pool).await?;
    create_indexes(&pool).await?;

    info!("Database schema ready");
    Ok(pool)
}

async fn create_fingerprint_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprint_cache (
            id TEXT PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            duration REAL NOT NULL,
            external_id TEXT,
            external_recording_id TEXT,
            source_ref TEXT,
            created_at TEXT NOT NULL,
            last_matched_at TEXT,
            match_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_track_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_metadata (
            id TEXT PRIMARY KEY,
            fingerprint_id TEXT REFERENCES fingerprint_cache(id) ON DELETE SET NULL,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT,
            album_artist TEXT,
            genre TEXT,
            year INTEGER,
            track_number INTEGER,
            duration REAL,
            musicbrainz_recording_id TEXT,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_play_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS play_history (
            id TEXT PRIMARY KEY,
            track_metadata_id TEXT REFERENCES track_metadata(id) ON DELETE SET NULL,
            fingerprint_id TEXT REFERENCES fingerprint_cache(id) ON DELETE SET NULL,
            played_at TEXT NOT NULL,
            source TEXT NOT NULL,
            confidence REAL,
            was_identified INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_fingerprint_cache_external_id ON fingerprint_cache(external_id)",
        "CREATE INDEX IF NOT EXISTS idx_track_metadata_fingerprint ON track_metadata(fingerprint_id)",
        "CREATE INDEX IF NOT EXISTS idx_track_metadata_artist_title ON track_metadata(artist, title)",
        "CREATE INDEX IF NOT EXISTS idx_play_history_played_at ON play_history(played_at)",
        "CREATE INDEX IF NOT EXISTS idx_play_history_source ON play_history(source)",
    ];

    // hash is indexed by its UNIQUE constraint
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
