//! In-memory session store
//!
//! Volatile and cleared on restart, and only visible to one process.
//! Uses Moka with per-entry expiry taken from each record.
//!
//! Meant for development and tests. Moka bounds the cache by entry count,
//! and once it is full it evicts live sessions, which logs those users out.
//! Production deployments use the Redis store.

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::time::{Duration, Instant};

use super::models::{SessionRecord, StoredSession};
use super::session_store::{SessionStore, generate_session_id};
use crate::error::AppError;

/// Evicts each entry when its record expires
struct RecordExpiry;

impl Expiry<String, SessionRecord> for RecordExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &SessionRecord,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.remaining())
    }
}

/// Entry bound used by [`MemorySessionStore::default`]
pub const DEFAULT_MAX_SESSIONS: u64 = 100_000;

/// Session store held in process memory
pub struct MemorySessionStore {
    /// Session ID -> SessionRecord
    sessions: Cache<String, SessionRecord>,
}

impl MemorySessionStore {
    /// Create a store holding at most `max_sessions` entries
    ///
    /// Past that bound moka evicts entries before they expire.
    pub fn new(max_sessions: u64) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .expire_after(RecordExpiry)
            .build();

        Self { sessions }
    }

    /// Insert a pre-built record under a chosen id, replacing any previous one
    pub async fn insert_record(&self, session_id: impl Into<String>, record: SessionRecord) {
        self.sessions.insert(session_id.into(), record).await;
    }
}

/// Development-only capacity: live sessions beyond
/// [`DEFAULT_MAX_SESSIONS`] are evicted early, logging those users out.
impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, external_id: &str, ttl: Duration) -> Result<String, AppError> {
        let session_id = generate_session_id();
        let record = SessionRecord::new(external_id, ttl);

        let entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert(record)
            .await;
        if !entry.is_fresh() {
            return Err(AppError::session_store("session id collision"));
        }

        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, AppError> {
        let Some(record) = self.sessions.get(session_id).await else {
            return Ok(None);
        };

        if record.is_expired() {
            self.sessions.invalidate(session_id).await;
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        self.sessions.invalidate(session_id).await;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StoredSession>, AppError> {
        let mut sessions: Vec<StoredSession> = self
            .sessions
            .iter()
            .filter(|(_, record)| !record.is_expired())
            .map(|(session_id, record)| StoredSession {
                session_id: session_id.to_string(),
                record,
            })
            .collect();

        sessions.sort_by(|a, b| a.record.created_at.cmp(&b.record.created_at));
        Ok(sessions)
    }
}
