//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use oauthgate::auth::GoogleProfileResolver;
use oauthgate::data::{Database, MemorySessionStore, SessionStore};
use oauthgate::{AppState, config};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Authorization code the fake provider accepts
pub const GOOD_CODE: &str = "good-code";

/// Bearer token guarding operator routes in tests
pub const OPERATOR_TOKEN: &str = "op-token";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub provider_addr: String,
    pub state: AppState,
    pub sessions: Arc<MemorySessionStore>,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance with diagnostics enabled
    pub async fn new() -> Self {
        Self::with_operator_token(Some(OPERATOR_TOKEN)).await
    }

    pub async fn with_operator_token(operator_token: Option<&str>) -> Self {
        let sessions = Arc::new(MemorySessionStore::default());
        Self::start(operator_token, sessions.clone(), sessions).await
    }

    /// Serve with `store` as the session store. `sessions` is the memory
    /// store it ultimately writes to, kept for direct inspection.
    pub async fn with_session_store(
        sessions: Arc<MemorySessionStore>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self::start(Some(OPERATOR_TOKEN), sessions, store).await
    }

    async fn start(
        operator_token: Option<&str>,
        sessions: Arc<MemorySessionStore>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        oauthgate::metrics::init_metrics();

        // Create temporary directory for test database and static files
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("users.db");
        let static_dir = temp_dir.path().join("public");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("hello.txt"), "static hello").unwrap();

        let provider_addr = spawn_fake_provider().await;
        let config = test_config(db_path, static_dir, &provider_addr, operator_token);

        let db = Arc::new(Database::connect(&config.database.path).await.unwrap());
        let resolver = Arc::new(
            GoogleProfileResolver::from_config(&config, reqwest::Client::new()).unwrap(),
        );
        let state = AppState::from_parts(config, resolver, db, store);

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = oauthgate::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            provider_addr,
            state,
            sessions,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET with an optional `Cookie` header
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("cookie", cookie);
        }
        request.send().await.unwrap()
    }

    /// Run the login flow against the fake provider and return the
    /// `sid=...` cookie pair
    pub async fn login(&self) -> String {
        let response = self.get("/auth/provider", None).await;
        let state = state_param(&response);
        let state_cookie = set_cookie_value(&response, "oauth_state").unwrap();

        let response = self
            .get(
                &format!("/auth/provider/callback?code={GOOD_CODE}&state={state}"),
                Some(&format!("oauth_state={state_cookie}")),
            )
            .await;
        assert_eq!(location(&response), "/profile");

        let sid = set_cookie_value(&response, "sid").unwrap();
        format!("sid={sid}")
    }
}

pub fn test_config(
    db_path: PathBuf,
    static_dir: PathBuf,
    provider_addr: &str,
    operator_token: Option<&str>,
) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            domain: "localhost:3000".to_string(),
            protocol: "http".to_string(),
            static_dir,
        },
        auth: config::AuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            callback_url: None,
            authorize_url: format!("{provider_addr}/authorize"),
            token_url: format!("{provider_addr}/token"),
            userinfo_url: format!("{provider_addr}/userinfo"),
            session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
            session_ttl_seconds: 3600,
        },
        session_store: config::SessionStoreConfig {
            url: "memory://".to_string(),
            key_prefix: "oauthgate-test:".to_string(),
            timeout_ms: 2000,
        },
        database: config::DatabaseConfig { path: db_path },
        diagnostics: config::DiagnosticsConfig {
            operator_token: operator_token.map(str::to_string),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Provider stand-in: accepts [`GOOD_CODE`] and reports user ext-42 "Ada"
async fn spawn_fake_provider() -> String {
    async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
        if form.get("code").map(String::as_str) != Some(GOOD_CODE)
            || form.get("client_secret").map(String::as_str) != Some("test-client-secret")
        {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_grant"})),
            )
                .into_response();
        }
        Json(json!({"access_token": "at-ext-42", "token_type": "Bearer"})).into_response()
    }

    async fn userinfo(headers: HeaderMap) -> Response {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer at-ext-42");
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!({"sub": "ext-42", "name": "Ada"})).into_response()
    }

    let app = Router::new()
        .route("/token", post(token))
        .route("/userinfo", get(userinfo));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// `Location` header of a redirect
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// Full `Set-Cookie` header for `name`, if the response sets it
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .map(str::to_string)
}

/// Value of a cookie set by the response, `None` when absent or emptied
pub fn set_cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let header = set_cookie_header(response, name)?;
    let pair = header.split(';').next()?;
    let (_, value) = pair.split_once('=')?;
    (!value.is_empty()).then(|| value.to_string())
}

/// `state` query parameter of the provider redirect
pub fn state_param(response: &reqwest::Response) -> String {
    let location = url::Url::parse(&location(response)).unwrap();
    location
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state parameter")
}
