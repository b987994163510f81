//! Data layer module
//!
//! Handles all persistence:
//! - User directory (SQLite)
//! - Session store (Redis or in-memory)

mod database;
mod memory_store;
mod models;
mod redis_store;
mod session_store;

pub use database::{Database, UserDirectory};
pub use memory_store::{DEFAULT_MAX_SESSIONS, MemorySessionStore};
pub use models::*;
pub use redis_store::RedisSessionStore;
pub use session_store::{SessionStore, generate_session_id, redact_session_id};

#[cfg(test)]
pub(crate) use database::MockUserDirectory;
#[cfg(test)]
pub(crate) use session_store::MockSessionStore;
