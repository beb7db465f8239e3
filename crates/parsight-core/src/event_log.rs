//! Append-only ordered event log
//!
//! The single source of truth for replay. Events are appended by the
//! recorder (single writer) and read by the player and UI shells (multiple
//! readers); no event is ever mutated or removed except by `clear`.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::protocol::DebugEvent;

/// Shared handle to the ordered event log of one session.
///
/// Clone-able: all clones observe the same underlying sequence. The lock is
/// held only for O(1) appends and reads, so readers never stall the
/// ingestion path for long.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<DebugEvent>>>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log pre-populated with the events of a recorded session
    pub fn from_events(events: Vec<DebugEvent>) -> Self {
        Self {
            events: Arc::new(RwLock::new(events)),
        }
    }

    /// Append an event; returns its log index, which is the event's
    /// identity for replay purposes
    pub async fn append(&self, event: DebugEvent) -> usize {
        let mut events = self.events.write().await;
        events.push(event);
        events.len() - 1
    }

    /// Get the event at `index`, if appended
    pub async fn get(&self, index: usize) -> Option<DebugEvent> {
        self.events.read().await.get(index).cloned()
    }

    /// Number of events appended so far; defines the maximum replay index
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Remove all events. Only called when a new session starts.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }

    /// Copy of the full sequence (for persistence and replay)
    pub async fn snapshot(&self) -> Vec<DebugEvent> {
        self.events.read().await.clone()
    }
}
