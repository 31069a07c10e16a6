//! Duplicate suppression
//!
//! Remembers when each track key was last recorded. A repeat within the
//! window is suppressed, and a suppressed repeat does not extend the window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug)]
pub struct DuplicateSuppressionCache {
    window: Duration,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl DuplicateSuppressionCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True if `key` was recorded less than one window before `now`
    pub fn is_suppressed(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.last_seen
            .get(key)
            .is_some_and(|&last| now - last < self.window)
    }

    /// Mark `key` as seen at `now`
    pub fn record(&mut self, key: impl Into<String>, now: DateTime<Utc>) {
        self.last_seen.insert(key.into(), now);
    }

    /// Drop entries older than twice the window
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = self.window * 2;
        let before = self.last_seen.len();
        self.last_seen.retain(|_, last| now - *last < horizon);
        let removed = before - self.last_seen.len();
        if removed > 0 {
            trace!(removed, "Pruned suppression entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
