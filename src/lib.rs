//! oauthgate - A minimal OAuth2 sign-in web app with server-side sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Landing / profile pages                                  │
//! │  - OAuth login, callback, logout                            │
//! │  - Operator diagnostics, health, metrics                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Session Lifecycle                        │
//! │  - Profile resolution against the provider                  │
//! │  - Login / per-request validation / logout                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - User directory (SQLite, sqlx)                            │
//! │  - Session store (Redis, or in-memory moka)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: Page, diagnostics and metrics handlers
//! - `auth`: OAuth flow, session lifecycle, extractors
//! - `data`: User directory and session stores
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use auth::{GoogleProfileResolver, ProfileResolver, SessionManager};
use data::{Database, MemorySessionStore, RedisSessionStore, SessionStore};

/// Upper bound for a whole request, provider round trip included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is an `Arc` built once at
/// startup.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Login, validation and logout over the injected stores
    pub sessions: Arc<SessionManager>,

    /// User directory connection pool
    pub db: Arc<Database>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to the SQLite user directory (runs migrations)
    /// 2. Build the session store chosen by `session_store.url`
    /// 3. Build the provider client
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to the user directory
        let db = Database::connect(&config.database.path).await?;
        let users = db.user_count().await?;
        tracing::info!(users, path = %config.database.path.display(), "User directory connected");

        // 2. Session store
        let sessions: Arc<dyn SessionStore> = match config.session_store.backend()? {
            config::SessionStoreBackend::Redis(url) => {
                tracing::info!(key_prefix = %config.session_store.key_prefix, "Using Redis session store");
                Arc::new(RedisSessionStore::new(
                    &url,
                    config.session_store.key_prefix.clone(),
                )?)
            }
            config::SessionStoreBackend::Memory => {
                tracing::warn!(
                    max_sessions = data::DEFAULT_MAX_SESSIONS,
                    "Using in-memory session store; sessions are lost on restart and evicted past capacity"
                );
                Arc::new(MemorySessionStore::default())
            }
        };

        // 3. Provider client
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("oauthgate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;
        let resolver = Arc::new(GoogleProfileResolver::from_config(&config, http_client)?);

        tracing::info!("Application state initialized successfully");

        Ok(Self::from_parts(config, resolver, Arc::new(db), sessions))
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: config::AppConfig,
        resolver: Arc<dyn ProfileResolver>,
        db: Arc<Database>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let manager = SessionManager::new(
            resolver,
            db.clone(),
            sessions,
            config.session_ttl(),
            config.session_store.timeout(),
        );

        Self {
            config: Arc::new(config),
            sessions: Arc::new(manager),
            db,
        }
    }

    /// Release the user directory pool
    pub async fn shutdown(&self) {
        self.db.close().await;
        tracing::info!("User directory closed");
    }
}

/// Build the Axum router with all routes
///
/// Routes:
/// - GET /health - Liveness
/// - GET /, /profile - Pages
/// - GET /auth/provider, /auth/provider/callback, /logout - Login flow
/// - GET /diagnostics/sessions - Operator-only
/// - GET /metrics - Prometheus
/// - anything else - Static files
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::pages_router())
        .merge(auth::auth_router())
        .merge(api::operator_router(state.clone()))
        .merge(api::metrics_router())
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
