//! SQLite persistence
//!
//! One shared connection, created on first use. Schema creation is guarded by
//! an async `OnceCell`, so concurrent first callers race to a single
//! initialization and everyone else waits for its result.

mod init;

pub mod fingerprints;
pub mod history;
pub mod metadata;
pub mod models;

pub use fingerprints::FingerprintCache;
pub use history::PlayHistoryStore;
pub use metadata::TrackMetadataStore;
pub use models::{
    ArtistPlays, CachedFingerprint, Fingerprint, MetadataSource, PlayHistoryEntry, PlaySource,
    PlayStatistics, TrackMetadata, TrackPlays,
};

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    Memory,
}

/// Lazily-initialized database handle shared by all stores
pub struct Database {
    location: DbLocation,
    pool: OnceCell<SqlitePool>,
}

impl Database {
    /// Database backed by a file (created with its parent directory if missing)
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            location: DbLocation::File(path.as_ref().to_path_buf()),
            pool: OnceCell::new(),
        }
    }

    /// Private in-memory database (lives as long as this handle)
    pub fn in_memory() -> Self {
        Self {
            location: DbLocation::Memory,
            pool: OnceCell::new(),
        }
    }

    pub fn location(&self) -> &DbLocation {
        &self.location
    }

    /// Connection pool, running schema creation exactly once on first call
    pub async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| init::init_database(&self.location))
            .await
    }

    /// True once the schema has been created
    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Close the connection if it was ever opened
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}

pub(crate) fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| Error::InvalidInput(format!("bad uuid '{}': {}", text, e)))
}

pub(crate) fn parse_uuid_opt(text: Option<String>) -> Result<Option<Uuid>> {
    text.as_deref().map(parse_uuid).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pool_initializes_once_under_concurrency() {
        let db = Arc::new(Database::in_memory());
        assert!(!db.is_initialized());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                let pool = db.pool().await.unwrap();
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'play_history'",
                )
                .fetch_one(pool)
                .await
                .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
        assert!(db.is_initialized());
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tap.db");
        let db = Database::open(&path);
        db.pool().await.unwrap();
        assert!(path.exists());
        db.close().await;
    }

    #[test]
    fn test_parse_uuid_errors_are_invalid_input() {
        assert!(matches!(parse_uuid("nope"), Err(Error::InvalidInput(_))));
        assert_eq!(parse_uuid_opt(None).unwrap(), None);
    }
}
