//! Session lifecycle
//!
//! Drives a browser client between three states:
//!
//! ```text
//!  Anonymous ──login──▶ Authenticating ──valid callback──▶ Authenticated
//!      ▲                      │                                 │
//!      └──── any failure ─────┘◀── logout / expired session ────┘
//! ```
//!
//! Nothing is cached in memory: "Authenticated" is re-derived from the
//! session store on every request.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::provider::{CallbackPayload, ProfileResolver};
use super::session::generate_csrf_state;
use crate::data::{SessionStore, StoredSession, UserDirectory, UserRecord, redact_session_id};
use crate::error::AppError;
use crate::metrics::{LOGINS_TOTAL, LOGOUTS_TOTAL, SESSION_LOOKUPS_TOTAL, STORE_ERRORS_TOTAL};

/// Where to send the browser to start a login
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub url: String,
    /// CSRF state the callback must echo back
    pub state: String,
}

/// Result of a completed login
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub session_id: String,
    pub user: UserRecord,
    pub ttl: Duration,
}

/// The authenticated entity behind a valid session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub external_id: String,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

/// What happened to the store side of a logout
///
/// The client cookie is cleared regardless.
#[derive(Debug)]
pub enum LogoutOutcome {
    /// The request carried no usable session cookie
    NoSession,
    Deleted,
    StoreFailed(AppError),
}

/// Orchestrates login, per-request validation and logout
pub struct SessionManager {
    resolver: Arc<dyn ProfileResolver>,
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionStore>,
    session_ttl: Duration,
    store_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        resolver: Arc<dyn ProfileResolver>,
        users: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionStore>,
        session_ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            users,
            sessions,
            session_ttl,
            store_timeout,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Anonymous → Authenticating
    ///
    /// Only produces the redirect; no server-side state changes.
    pub fn begin_login(&self) -> LoginRedirect {
        let state = generate_csrf_state();
        let url = self.resolver.authorization_url(&state);
        LoginRedirect { url, state }
    }

    /// Authenticating → Authenticated
    ///
    /// # Steps
    /// 1. Check the CSRF state against the one issued by `begin_login`
    /// 2. Resolve the callback into a profile
    /// 3. Create the user record if absent (awaited)
    /// 4. Create the session, last, so no session exists without a user
    ///
    /// # Errors
    /// Any failure leaves no session behind; the caller returns the client
    /// to Anonymous.
    pub async fn complete_login(
        &self,
        callback: &CallbackPayload,
        expected_state: Option<&str>,
    ) -> Result<EstablishedSession, AppError> {
        let result = self.establish(callback, expected_state).await;

        match &result {
            Ok(established) => {
                LOGINS_TOTAL.with_label_values(&["success"]).inc();
                tracing::info!(
                    external_id = %established.user.external_id,
                    session = %redact_session_id(&established.session_id),
                    "Login completed"
                );
            }
            Err(error) => {
                LOGINS_TOTAL.with_label_values(&[error.kind()]).inc();
                tracing::warn!(%error, "Login failed");
            }
        }

        result
    }

    async fn establish(
        &self,
        callback: &CallbackPayload,
        expected_state: Option<&str>,
    ) -> Result<EstablishedSession, AppError> {
        verify_state(callback.state.as_deref(), expected_state)?;

        let profile = self.resolver.resolve(callback).await?;

        let user = self
            .bounded("user directory", self.users.create_if_absent(&profile))
            .await?;

        let session_id = self
            .bounded(
                "session store",
                self.sessions.create(&user.external_id, self.session_ttl),
            )
            .await?;

        Ok(EstablishedSession {
            session_id,
            user,
            ttl: self.session_ttl,
        })
    }

    /// Re-validate a session for the current request
    ///
    /// `Ok(None)` means Anonymous: the session is unknown, expired, or
    /// points at a user the directory no longer knows.
    pub async fn current_principal(&self, session_id: &str) -> Result<Option<Principal>, AppError> {
        let record = self
            .bounded("session store", self.sessions.get(session_id))
            .await?;

        let Some(record) = record.filter(|record| !record.is_expired()) else {
            SESSION_LOOKUPS_TOTAL.with_label_values(&["absent"]).inc();
            return Ok(None);
        };

        let user = self
            .bounded(
                "user directory",
                self.users.get_by_external_id(&record.external_id),
            )
            .await?;

        let Some(user) = user else {
            SESSION_LOOKUPS_TOTAL.with_label_values(&["orphaned"]).inc();
            tracing::warn!(
                external_id = %record.external_id,
                session = %redact_session_id(session_id),
                "Session references an unknown user"
            );
            return Ok(None);
        };

        SESSION_LOOKUPS_TOTAL.with_label_values(&["valid"]).inc();
        Ok(Some(Principal {
            external_id: user.external_id,
            display_name: user.display_name,
            expires_at: record.expires_at,
        }))
    }

    /// Authenticated → Anonymous
    ///
    /// Deleting from the store is best effort; the caller clears the cookie
    /// whatever the outcome.
    pub async fn logout(&self, session_id: Option<&str>) -> LogoutOutcome {
        let Some(session_id) = session_id else {
            LOGOUTS_TOTAL.with_label_values(&["skipped"]).inc();
            return LogoutOutcome::NoSession;
        };

        match self
            .bounded("session store", self.sessions.delete(session_id))
            .await
        {
            Ok(()) => {
                LOGOUTS_TOTAL.with_label_values(&["deleted"]).inc();
                tracing::info!(session = %redact_session_id(session_id), "Session deleted");
                LogoutOutcome::Deleted
            }
            Err(error) => {
                LOGOUTS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::warn!(
                    %error,
                    session = %redact_session_id(session_id),
                    "Session delete failed; clearing client cookie anyway"
                );
                LogoutOutcome::StoreFailed(error)
            }
        }
    }

    /// Every live session, for operators
    pub async fn list_sessions(&self) -> Result<Vec<StoredSession>, AppError> {
        self.bounded("session store", self.sessions.list_all()).await
    }

    /// Run a store call under the configured timeout
    async fn bounded<T>(
        &self,
        store: &'static str,
        call: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        let result = match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::StoreUnavailable {
                store,
                detail: format!("timed out after {} ms", self.store_timeout.as_millis()),
            }),
        };

        if let Err(AppError::StoreUnavailable { store, .. }) = &result {
            STORE_ERRORS_TOTAL.with_label_values(&[store]).inc();
        }

        result
    }
}

fn verify_state(received: Option<&str>, expected: Option<&str>) -> Result<(), AppError> {
    match (received, expected) {
        (Some(received), Some(expected)) if !expected.is_empty() && received == expected => Ok(()),
        (_, None) => Err(AppError::AuthExchange(
            "no login in progress for this client".to_string(),
        )),
        _ => Err(AppError::AuthExchange("CSRF state mismatch".to_string())),
    }
}
