//! Session store contract
//!
//! Maps an opaque session id to a [`SessionRecord`] with a time-to-live.
//! Backends live in `memory_store` and `redis_store`.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use std::time::Duration;

use super::models::{SessionRecord, StoredSession};
use crate::error::AppError;

/// Random bytes behind every session id
const SESSION_ID_BYTES: usize = 32;

/// Server-side session persistence
///
/// `get` must never return a record whose `expires_at` has passed, even if
/// the backend has not evicted it yet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session for `external_id` and return its id.
    async fn create(&self, external_id: &str, ttl: Duration) -> Result<String, AppError>;

    /// Look up a live session. `None` when unknown, deleted or expired.
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, AppError>;

    /// Remove a session. Removing an unknown id succeeds.
    async fn delete(&self, session_id: &str) -> Result<(), AppError>;

    /// Snapshot of every live session, for operator diagnostics.
    async fn list_all(&self) -> Result<Vec<StoredSession>, AppError>;
}

/// Generate an unguessable session id (256 bits, URL-safe base64)
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// First characters of a session id, safe to put in logs
pub fn redact_session_id(session_id: &str) -> &str {
    let end = session_id
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(session_id.len());
    &session_id[..end]
}
