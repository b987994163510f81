//! Redis session store
//!
//! Each session is one JSON value written with `SET NX EX`, so Redis
//! evicts it on its own once the TTL runs out. Reads still check
//! `expires_at` and reject payloads that do not match [`SessionRecord`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::models::{SessionRecord, StoredSession};
use super::session_store::{SessionStore, generate_session_id, redact_session_id};
use crate::error::AppError;

/// Keys fetched per `SCAN` round trip
const SCAN_BATCH: usize = 100;

/// Session store backed by Redis
///
/// The connection manager is created lazily on first use and then shared
/// by every request. A dropped connection fails the call that hit it and
/// is re-established in the background for the following calls.
pub struct RedisSessionStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    key_prefix: String,
}

impl RedisSessionStore {
    /// Create a store for `url`. No connection is made until the first call.
    pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            key_prefix: key_prefix.into(),
        })
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}sess:{}", self.key_prefix, session_id)
    }

    fn session_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.key_prefix)?.strip_prefix("sess:")
    }

    async fn connection(&self) -> Result<ConnectionManager, AppError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let connection = ConnectionManager::new(self.client.clone()).await?;
                tracing::info!("Connected to Redis session store");
                Ok::<_, redis::RedisError>(connection)
            })
            .await?;

        Ok(connection.clone())
    }

    /// Every key under our session prefix, walked with `SCAN`
    async fn session_keys(&self, conn: &mut ConnectionManager) -> Result<Vec<String>, AppError> {
        let pattern = format!("{}sess:*", self.key_prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;
            keys.extend(batch);

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

/// Decode a stored payload, treating malformed or expired entries as absent
fn decode_record(session_id: &str, raw: &str) -> Option<SessionRecord> {
    let record = match serde_json::from_str::<SessionRecord>(raw) {
        Ok(record) => record,
        Err(error) => {
            tracing::warn!(
                session = %redact_session_id(session_id),
                %error,
                "Ignoring malformed session payload"
            );
            return None;
        }
    };

    if record.is_expired() {
        return None;
    }

    Some(record)
}

/// Redis wants whole seconds; round up so a session never outlives its record
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, external_id: &str, ttl: Duration) -> Result<String, AppError> {
        let mut conn = self.connection().await?;
        let session_id = generate_session_id();
        let record = SessionRecord::new(external_id, ttl);
        let payload =
            serde_json::to_string(&record).map_err(|e| AppError::Internal(e.into()))?;

        let stored: Option<String> = redis::cmd("SET")
            .arg(self.session_key(&session_id))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;

        if stored.is_none() {
            return Err(AppError::session_store("session id collision"));
        }

        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, AppError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.session_key(session_id)).await?;

        Ok(raw.and_then(|raw| decode_record(session_id, &raw)))
    }

    async fn delete(&self, session_id: &str) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let _: usize = conn.del(self.session_key(session_id)).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<StoredSession>, AppError> {
        let mut conn = self.connection().await?;
        let keys = self.session_keys(&mut conn).await?;

        let mut sessions = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(session_id) = self.session_id_from_key(&key) else {
                continue;
            };
            // Keys can expire between KEYS and GET
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(record) = raw.and_then(|raw| decode_record(session_id, &raw)) {
                sessions.push(StoredSession {
                    session_id: session_id.to_string(),
                    record,
                });
            }
        }

        sessions.sort_by(|a, b| a.record.created_at.cmp(&b.record.created_at));
        Ok(sessions)
    }
}
