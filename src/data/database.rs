//! SQLite-backed user directory
//!
//! All user record access goes through this module.
//! Uses SQLx with embedded migrations.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

use super::models::*;
use crate::error::AppError;

/// Lookup and create-if-absent of user records
///
/// Implementations must make `create_if_absent` atomic per external id:
/// two concurrent first logins for the same id end with one record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>, AppError>;

    /// Return the existing record for `profile.external_id`, or insert one.
    ///
    /// An existing record is returned unchanged; its display name is
    /// never overwritten.
    async fn create_if_absent(&self, profile: &Profile) -> Result<UserRecord, AppError>;
}

/// Database connection pool wrapper.
///
/// Built once at startup and shared through `AppState`.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if needed) the SQLite file and run migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(AppError::user_directory)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn user_count(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl UserDirectory for Database {
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>, AppError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT external_id, display_name, created_at FROM users WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_if_absent(&self, profile: &Profile) -> Result<UserRecord, AppError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (external_id, display_name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(external_id) DO NOTHING
            "#,
        )
        .bind(&profile.external_id)
        .bind(&profile.display_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        let user = self
            .get_by_external_id(&profile.external_id)
            .await?
            .ok_or_else(|| {
                AppError::user_directory(format!(
                    "user {} missing right after insert",
                    profile.external_id
                ))
            })?;

        if inserted {
            tracing::info!(external_id = %user.external_id, "User record created");
        } else {
            tracing::debug!(external_id = %user.external_id, "User record already present");
        }

        Ok(user)
    }
}
