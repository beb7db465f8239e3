//! Recorded debug sessions
//!
//! A finished (or in-progress) recording captured as a value: the full
//! ordered event sequence plus identification and timing metadata. This is
//! the unit of persistence and of offline replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_log::EventLog;
use crate::protocol::DebugEvent;

/// A complete recorded debug session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedDebugSession {
    pub id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub events: Vec<DebugEvent>,
    pub metadata: SessionMetadata,
}

/// Session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Remote recognizer address the session was recorded from
    pub address: String,
    pub port: u16,

    /// Total event count
    pub event_count: usize,

    /// Session duration in milliseconds
    pub duration_ms: Option<u64>,

    /// Custom tags for filtering and organization
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RecordedDebugSession {
    /// Build an event log for replaying this session
    pub fn to_log(&self) -> EventLog {
        EventLog::from_events(self.events.clone())
    }

    /// Whether the recognizer ended the session explicitly
    pub fn terminated_cleanly(&self) -> bool {
        matches!(self.events.last(), Some(DebugEvent::Terminate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(events: Vec<DebugEvent>) -> RecordedDebugSession {
        let count = events.len();
        RecordedDebugSession {
            id: "session-1".to_string(),
            name: "amber-grammar".to_string(),
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            events,
            metadata: SessionMetadata {
                address: "localhost".to_string(),
                port: 49100,
                event_count: count,
                duration_ms: Some(12),
                tags: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_to_log_preserves_order() {
        let events = vec![
            DebugEvent::EnterRule { rule: "expr".to_string(), line: 1, char_position: 0 },
            DebugEvent::ExitRule { rule: "expr".to_string() },
            DebugEvent::Terminate,
        ];
        let session = session(events.clone());
        let log = session.to_log();
        assert_eq!(log.snapshot().await, events);
    }

    #[test]
    fn test_terminated_cleanly() {
        assert!(session(vec![DebugEvent::Terminate]).terminated_cleanly());
        assert!(!session(vec![DebugEvent::Mark { level: 0 }]).terminated_cleanly());
        assert!(!session(vec![]).terminated_cleanly());
    }

    #[test]
    fn test_serde_round_trip() {
        let original = session(vec![DebugEvent::Mark { level: 1 }, DebugEvent::Terminate]);
        let json = serde_json::to_string(&original).unwrap();
        let restored: RecordedDebugSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, original.id);
        assert_eq!(restored.events, original.events);
    }
}
