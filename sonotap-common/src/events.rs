//! Event types and EventBus
//!
//! Domain events are delivered over a tokio broadcast channel. Subscribers
//! receive events emitted after they subscribe; slow subscribers lose the
//! oldest events once the channel capacity is exceeded.

use crate::db::TrackMetadata;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Sonotap event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TapEvent {
    /// A track was identified from the audio tap (not suppressed as a duplicate)
    TrackIdentified {
        metadata: TrackMetadata,
        /// Match confidence (0.0 to 1.0)
        confidence: f64,
        /// Cached fingerprint the match came from
        fingerprint_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An identification cycle failed; the scheduler continues with the next one
    IdentificationCycleFailed {
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scheduler loop started (after the startup delay)
    SchedulerStarted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scheduler loop exited on cancellation
    SchedulerStopped {
        cycles_run: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TapEvent {
    /// Event type name (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            TapEvent::TrackIdentified { .. } => "TrackIdentified",
            TapEvent::IdentificationCycleFailed { .. } => "IdentificationCycleFailed",
            TapEvent::SchedulerStarted { .. } => "SchedulerStarted",
            TapEvent::SchedulerStopped { .. } => "SchedulerStopped",
        }
    }
}

/// Broadcast bus for [`TapEvent`]s
pub struct EventBus {
    tx: broadcast::Sender<TapEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TapEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: TapEvent) -> Result<usize, broadcast::error::SendError<TapEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: TapEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).is_err() {
            trace!(event_type, "No subscribers for event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
