//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-width RFC 3339 text (millisecond precision,
//! `Z` suffix) so lexical ordering in SQLite matches chronological ordering.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn from_db(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("bad timestamp '{}': {}", text, e)))
}

/// Parse an optional stored timestamp
pub fn from_db_opt(text: Option<String>) -> Result<Option<DateTime<Utc>>> {
    text.as_deref().map(from_db).transpose()
}
