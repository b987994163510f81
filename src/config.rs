//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub session_store: SessionStoreConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public domain, optionally with port (e.g., "login.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    /// Directory served for paths no route claims
    pub static_dir: PathBuf,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://login.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// OAuth provider and session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    ///
    /// Defaults to `{base_url}/auth/provider/callback`.
    pub callback_url: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// Cookie signing key (32+ bytes)
    pub session_secret: String,
    /// Session lifetime in seconds (default: 3600)
    pub session_ttl_seconds: i64,
}

/// Session store connection
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStoreConfig {
    /// `redis://host:port[/db]`, `rediss://...` or `memory://`
    pub url: String,
    /// Prefix for every key written to the store
    pub key_prefix: String,
    /// Upper bound for a single store call, in milliseconds
    pub timeout_ms: u64,
}

/// Session store backend selected by [`SessionStoreConfig::url`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreBackend {
    Redis(String),
    Memory,
}

impl SessionStoreConfig {
    pub fn backend(&self) -> Result<SessionStoreBackend, crate::error::AppError> {
        let url = self.url.trim();
        if url.starts_with("redis://") || url.starts_with("rediss://") {
            Ok(SessionStoreBackend::Redis(url.to_string()))
        } else if url == "memory://" || url == "memory" {
            Ok(SessionStoreBackend::Memory)
        } else {
            Err(crate::error::AppError::Config(format!(
                "session_store.url has an unsupported scheme: {url}"
            )))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// User directory configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Operator-only diagnostics
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DiagnosticsConfig {
    /// Bearer token required by `/diagnostics/*`; the routes are disabled when unset
    pub operator_token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!("oauthgate={},tower_http=debug", self.level.trim())
    }

    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (OAUTHGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.domain", "localhost:3000")?
            .set_default("server.protocol", "http")?
            .set_default("server.static_dir", "public")?
            .set_default(
                "auth.authorize_url",
                "https://accounts.google.com/o/oauth2/v2/auth",
            )?
            .set_default("auth.token_url", "https://oauth2.googleapis.com/token")?
            .set_default(
                "auth.userinfo_url",
                "https://openidconnect.googleapis.com/v1/userinfo",
            )?
            .set_default("auth.session_ttl_seconds", 3600)?
            .set_default("session_store.url", "redis://127.0.0.1:6379")?
            .set_default("session_store.key_prefix", "oauthgate:")?
            .set_default("session_store.timeout_ms", 2000)?
            .set_default("database.path", "data/users.db")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (OAUTHGATE__*)
            .add_source(
                Environment::with_prefix("OAUTHGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Redirect URI sent to the provider
    pub fn callback_url(&self) -> String {
        self.auth
            .callback_url
            .clone()
            .unwrap_or_else(|| format!("{}/auth/provider/callback", self.server.base_url()))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.session_ttl_seconds.max(0) as u64)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_ttl_seconds <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.session_store.timeout_ms == 0 {
            return Err(crate::error::AppError::Config(
                "session_store.timeout_ms must be greater than 0".to_string(),
            ));
        }

        self.session_store.backend()?;

        let callback_url = self.callback_url();
        url::Url::parse(&callback_url).map_err(|e| {
            crate::error::AppError::Config(format!(
                "auth.callback_url is not a valid URL ({callback_url}): {e}"
            ))
        })?;

        match self.logging.level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(crate::error::AppError::Config(format!(
                    "logging.level must be one of trace, debug, info, warn, error (got {other:?})"
                )));
            }
        }

        if !matches!(
            self.logging.format.trim().to_ascii_lowercase().as_str(),
            "pretty" | "json"
        ) {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\" (got {:?})",
                self.logging.format
            )));
        }

        if self.should_use_secure_cookies() && !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
