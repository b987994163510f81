//! Data models
//!
//! Rust structs representing stored entities. Timestamps use chrono.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Profile
// =============================================================================

/// Identity returned by the provider for one successful callback
///
/// Never persisted; only the [`UserRecord`] derived from it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable id assigned by the provider (`sub`)
    pub external_id: String,
    pub display_name: String,
    /// Everything the provider sent, untouched
    #[serde(default)]
    pub raw_attributes: serde_json::Map<String, serde_json::Value>,
}

impl Profile {
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            raw_attributes: serde_json::Map::new(),
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// A user known to the application
///
/// Keyed by the identity provider's stable id. Created once on first
/// login and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub external_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Session
// =============================================================================

/// Payload kept in the session store under a session id
///
/// Unknown fields are rejected so that entries written by anything else
/// under our key prefix never deserialize into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRecord {
    pub external_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(external_id: impl Into<String>, ttl: std::time::Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            external_id: external_id.into(),
            created_at,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self) -> std::time::Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

/// One entry of a session store enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSession {
    pub session_id: String,
    #[serde(flatten)]
    pub record: SessionRecord,
}
