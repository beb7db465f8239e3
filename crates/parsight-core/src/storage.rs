//! Storage layer for session recordings using sled
//!
//! This module provides sled-based persistence for recorded sessions,
//! allowing sessions to be saved, loaded, and queried efficiently for
//! later offline replay.

use crate::error::{AppError, Result};
use crate::session::RecordedDebugSession;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::PathBuf;
use std::sync::Arc;

/// Default database location under the platform data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parsight")
        .join("sessions")
}

/// Session storage using sled embedded database
pub struct SessionStorage {
    db: Arc<Db>,
}

impl SessionStorage {
    /// Create a new session storage
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let db = sled::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open sled database: {e}")))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Save a recorded session
    pub async fn save_session(&self, session: &RecordedDebugSession) -> Result<()> {
        let sessions_tree = self
            .db
            .open_tree("sessions")
            .map_err(|e| AppError::Storage(format!("Failed to open sessions tree: {e}")))?;

        let session_bytes = serde_json::to_vec(session).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize session: {e}"))
        })?;

        sessions_tree
            .insert(session.id.as_bytes(), session_bytes)
            .map_err(|e| AppError::Storage(format!("Failed to insert session: {e}")))?;

        // Also store metadata in index tree for efficient listing
        let index_tree = self
            .db
            .open_tree("session_index")
            .map_err(|e| AppError::Storage(format!("Failed to open index tree: {e}")))?;

        let info = SessionInfo {
            id: session.id.clone(),
            name: session.name.clone(),
            started_at_micros: session.started_at.timestamp_micros().max(0) as u64,
            ended_at_micros: session
                .ended_at
                .map(|t| t.timestamp_micros().max(0) as u64),
            event_count: session.metadata.event_count,
            duration_ms: session.metadata.duration_ms,
            address: session.metadata.address.clone(),
            port: session.metadata.port,
            tags: session.metadata.tags.clone(),
        };

        let info_bytes = serde_json::to_vec(&info)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize index: {e}")))?;

        // Use inverted timestamp as key prefix for newest-first listing
        let key = format!("{:016x}:{}", u64::MAX - info.started_at_micros, session.id);
        index_tree
            .insert(key.as_bytes(), info_bytes)
            .map_err(|e| AppError::Storage(format!("Failed to insert index: {e}")))?;

        self.db
            .flush_async()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to flush database: {e}")))?;

        tracing::info!("Saved session {} to sled database", session.id);
        Ok(())
    }

    /// Load a recorded session by ID
    pub async fn load_session(&self, session_id: &str) -> Result<RecordedDebugSession> {
        let sessions_tree = self
            .db
            .open_tree("sessions")
            .map_err(|e| AppError::Storage(format!("Failed to open sessions tree: {e}")))?;

        let session_bytes = sessions_tree
            .get(session_id.as_bytes())
            .map_err(|e| AppError::Storage(format!("Failed to get session: {e}")))?
            .ok_or_else(|| AppError::Storage(format!("Session not found: {session_id}")))?;

        let session: RecordedDebugSession =
            serde_json::from_slice(&session_bytes).map_err(|e| {
                AppError::Serialization(format!("Failed to deserialize session: {e}"))
            })?;

        Ok(session)
    }

    /// List all recorded sessions (sorted by start time, newest first)
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let index_tree = self
            .db
            .open_tree("session_index")
            .map_err(|e| AppError::Storage(format!("Failed to open index tree: {e}")))?;

        let mut sessions = Vec::new();
        let mut seen_ids = std::collections::HashSet::new();

        for item in index_tree.iter() {
            let (_key, value) = item
                .map_err(|e| AppError::Storage(format!("Failed to iterate sessions: {e}")))?;

            let info: SessionInfo = serde_json::from_slice(&value).map_err(|e| {
                AppError::Serialization(format!("Failed to deserialize index: {e}"))
            })?;

            // Deduplicate by session ID
            if seen_ids.insert(info.id.clone()) {
                sessions.push(info);
            }
        }

        Ok(sessions)
    }

    /// List sessions with filtering
    pub async fn list_sessions_filtered(&self, filter: &SessionFilter) -> Result<Vec<SessionInfo>> {
        let all_sessions = self.list_sessions().await?;

        let filtered: Vec<SessionInfo> = all_sessions
            .into_iter()
            .filter(|session| {
                if let Some(ref address) = filter.address {
                    if &session.address != address {
                        return false;
                    }
                }

                // Session must have ALL specified tags
                for tag in &filter.tags {
                    if !session.tags.contains(tag) {
                        return false;
                    }
                }

                true
            })
            .collect();

        Ok(filtered)
    }

    /// Delete a recorded session
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let sessions_tree = self
            .db
            .open_tree("sessions")
            .map_err(|e| AppError::Storage(format!("Failed to open sessions tree: {e}")))?;

        sessions_tree
            .remove(session_id.as_bytes())
            .map_err(|e| AppError::Storage(format!("Failed to remove session: {e}")))?;

        let index_tree = self
            .db
            .open_tree("session_index")
            .map_err(|e| AppError::Storage(format!("Failed to open index tree: {e}")))?;

        // Find and remove index entry
        let mut key_to_remove = None;
        for item in index_tree.iter() {
            let (key, value) =
                item.map_err(|e| AppError::Storage(format!("Failed to iterate index: {e}")))?;

            let info: SessionInfo = serde_json::from_slice(&value).map_err(|e| {
                AppError::Serialization(format!("Failed to deserialize index: {e}"))
            })?;

            if info.id == session_id {
                key_to_remove = Some(key.to_vec());
                break;
            }
        }

        if let Some(key) = key_to_remove {
            index_tree
                .remove(key)
                .map_err(|e| AppError::Storage(format!("Failed to remove index: {e}")))?;
        }

        self.db
            .flush_async()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to flush database: {e}")))?;

        tracing::info!("Deleted session {}", session_id);
        Ok(())
    }

    /// Add tags to a session
    pub async fn add_session_tags(&self, session_id: &str, tags: Vec<String>) -> Result<()> {
        let mut session = self.load_session(session_id).await?;

        for tag in tags {
            if !session.metadata.tags.contains(&tag) {
                session.metadata.tags.push(tag);
            }
        }

        self.save_session(&session).await?;

        tracing::info!("Added tags to session {}", session_id);
        Ok(())
    }

    /// Remove tags from a session
    pub async fn remove_session_tags(&self, session_id: &str, tags: Vec<String>) -> Result<()> {
        let mut session = self.load_session(session_id).await?;

        session.metadata.tags.retain(|t| !tags.contains(t));

        self.save_session(&session).await?;

        tracing::info!("Removed tags from session {}", session_id);
        Ok(())
    }

    /// Get all unique tags across all sessions
    pub async fn get_all_tags(&self) -> Result<Vec<String>> {
        let sessions = self.list_sessions().await?;
        let mut all_tags: Vec<String> = sessions.into_iter().flat_map(|s| s.tags).collect();

        all_tags.sort();
        all_tags.dedup();

        Ok(all_tags)
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let sessions_tree = self
            .db
            .open_tree("sessions")
            .map_err(|e| AppError::Storage(format!("Failed to open sessions tree: {e}")))?;

        let session_count = sessions_tree.len();
        let db_size = self
            .db
            .size_on_disk()
            .map_err(|e| AppError::Storage(format!("Failed to get database size: {e}")))?;

        Ok(StorageStats {
            session_count,
            size_bytes: db_size,
        })
    }
}

/// Session information for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub started_at_micros: u64,
    pub ended_at_micros: Option<u64>,
    pub event_count: usize,
    pub duration_ms: Option<u64>,
    pub address: String,
    pub port: u16,
    /// Custom tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub session_count: usize,
    pub size_bytes: u64,
}

/// Filter for querying sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    /// Filter by recognizer address
    #[serde(default)]
    pub address: Option<String>,
    /// Filter by tags (sessions must have ALL specified tags)
    #[serde(default)]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DebugEvent;
    use crate::session::SessionMetadata;
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_session(id: &str, name: &str, tags: Vec<String>) -> RecordedDebugSession {
        let events = vec![
            DebugEvent::EnterRule { rule: "expr".to_string(), line: 1, char_position: 0 },
            DebugEvent::ExitRule { rule: "expr".to_string() },
            DebugEvent::Terminate,
        ];
        RecordedDebugSession {
            id: id.to_string(),
            name: name.to_string(),
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            metadata: SessionMetadata {
                address: "localhost".to_string(),
                port: 49100,
                event_count: events.len(),
                duration_ms: Some(5),
                tags,
            },
            events,
        }
    }

    #[tokio::test]
    async fn test_storage_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(temp_dir.path().to_path_buf()).unwrap();

        let session = create_test_session("session-1", "amber-grammar", vec![]);
        storage.save_session(&session).await.unwrap();

        let loaded = storage.load_session("session-1").await.unwrap();
        assert_eq!(loaded.id, "session-1");
        assert_eq!(loaded.name, "amber-grammar");
        assert_eq!(loaded.events.len(), 3);
        assert!(loaded.terminated_cleanly());
    }

    #[tokio::test]
    async fn test_storage_list_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(temp_dir.path().to_path_buf()).unwrap();

        storage
            .save_session(&create_test_session("s1", "first", vec![]))
            .await
            .unwrap();
        storage
            .save_session(&create_test_session("s2", "second", vec![]))
            .await
            .unwrap();

        let sessions = storage.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_storage_delete_session() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(temp_dir.path().to_path_buf()).unwrap();

        let session = create_test_session("session-1", "test", vec![]);
        storage.save_session(&session).await.unwrap();

        storage.delete_session("session-1").await.unwrap();

        assert!(storage.load_session("session-1").await.is_err());
        assert!(storage.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_filter_by_tags() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(temp_dir.path().to_path_buf()).unwrap();

        storage
            .save_session(&create_test_session("s1", "first", vec!["expr".to_string()]))
            .await
            .unwrap();
        storage
            .save_session(&create_test_session("s2", "second", vec!["json".to_string()]))
            .await
            .unwrap();

        let filter = SessionFilter {
            tags: vec!["expr".to_string()],
            ..Default::default()
        };

        let filtered = storage.list_sessions_filtered(&filter).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "s1");
    }

    #[tokio::test]
    async fn test_storage_add_remove_tags() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(temp_dir.path().to_path_buf()).unwrap();

        let session = create_test_session("session-1", "test", vec![]);
        storage.save_session(&session).await.unwrap();

        storage
            .add_session_tags("session-1", vec!["tag1".to_string(), "tag2".to_string()])
            .await
            .unwrap();

        let loaded = storage.load_session("session-1").await.unwrap();
        assert!(loaded.metadata.tags.contains(&"tag1".to_string()));

        storage
            .remove_session_tags("session-1", vec!["tag1".to_string()])
            .await
            .unwrap();

        let loaded = storage.load_session("session-1").await.unwrap();
        assert!(!loaded.metadata.tags.contains(&"tag1".to_string()));
        assert!(loaded.metadata.tags.contains(&"tag2".to_string()));

        let tags = storage.get_all_tags().await.unwrap();
        assert_eq!(tags, vec!["tag2"]);
    }
}
