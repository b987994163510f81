//! Error types for oauthgate
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//!
//! A missing or expired session is not an error: lookups return `Option`
//! and the caller decides what an absent session means.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// The identity provider rejected the callback or sent something unusable
    #[error("Authorization exchange failed: {0}")]
    AuthExchange(String),

    /// A backing store (session store or user directory) could not be reached
    #[error("{store} unavailable: {detail}")]
    StoreUnavailable {
        store: &'static str,
        detail: String,
    },

    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn session_store(detail: impl ToString) -> Self {
        AppError::StoreUnavailable {
            store: "session store",
            detail: detail.to_string(),
        }
    }

    pub fn user_directory(detail: impl ToString) -> Self {
        AppError::StoreUnavailable {
            store: "user directory",
            detail: detail.to_string(),
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AuthExchange(_) => "auth_exchange",
            AppError::StoreUnavailable { .. } => "store_unavailable",
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::user_directory(err)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::user_directory(err)
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::session_store(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::AuthExchange(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to an HTML failure page
    ///
    /// Internal details stay in the logs; the page only carries a
    /// generic message for the status.
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Page not found"),
            AppError::Unauthorized | AppError::AuthExchange(_) => {
                (StatusCode::UNAUTHORIZED, "Authentication required")
            }
            AppError::StoreUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "The service is temporarily unavailable. Please try again later.",
            ),
            AppError::Config(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();

        let body = Html(format!(
            "<!DOCTYPE html>\n<html>\n<head><title>Error - oauthgate</title></head>\n<body>\n<h1>{}</h1>\n<p>{}</p>\n<a href=\"/\">Back to start</a>\n</body>\n</html>\n",
            status.as_u16(),
            message
        ));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
