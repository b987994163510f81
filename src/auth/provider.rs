//! Identity provider client
//!
//! Builds the authorization redirect and turns a provider callback into a
//! normalized [`Profile`]. Google is the default provider; the endpoints
//! come from configuration.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::config::AppConfig;
use crate::data::Profile;
use crate::error::AppError;

/// Scope requested from the provider
const PROFILE_SCOPE: &str = "profile";

/// Query parameters the provider sends to the callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackPayload {
    /// Authorization code
    pub code: Option<String>,
    /// CSRF state token echoed back by the provider
    pub state: Option<String>,
    /// Set instead of `code` when the user or provider aborted
    pub error: Option<String>,
}

/// Exchanges provider callbacks for profiles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// URL the browser is sent to when login starts
    fn authorization_url(&self, state: &str) -> String;

    /// Turn a callback into a profile.
    ///
    /// # Errors
    /// [`AppError::AuthExchange`] when the provider reports an error, rejects
    /// the code, answers with something unparseable, or omits the user id.
    async fn resolve(&self, callback: &CallbackPayload) -> Result<Profile, AppError>;
}

/// Token response from the provider's token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// OAuth2 authorization-code client for Google (or any compatible provider)
pub struct GoogleProfileResolver {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_url: Url,
    token_url: Url,
    userinfo_url: Url,
    http: reqwest::Client,
}

impl GoogleProfileResolver {
    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Result<Self, AppError> {
        let parse = |name: &str, raw: &str| {
            Url::parse(raw)
                .map_err(|e| AppError::Config(format!("auth.{name} is not a valid URL: {e}")))
        };

        Ok(Self {
            client_id: config.auth.client_id.clone(),
            client_secret: config.auth.client_secret.clone(),
            redirect_uri: config.callback_url(),
            authorize_url: parse("authorize_url", &config.auth.authorize_url)?,
            token_url: parse("token_url", &config.auth.token_url)?,
            userinfo_url: parse("userinfo_url", &config.auth.userinfo_url)?,
            http,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let response = ensure_success(response, "token exchange").await?;
        let token = response.json::<TokenResponse>().await?;

        if let Some(token_type) = token.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(AppError::AuthExchange(format!(
                    "unsupported token type: {token_type}"
                )));
            }
        }

        Ok(token)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<Value, AppError> {
        let response = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = ensure_success(response, "userinfo request").await?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl ProfileResolver for GoogleProfileResolver {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", PROFILE_SCOPE)
            .append_pair("prompt", "select_account")
            .append_pair("state", state);
        url.into()
    }

    async fn resolve(&self, callback: &CallbackPayload) -> Result<Profile, AppError> {
        if let Some(error) = callback.error.as_deref() {
            return Err(AppError::AuthExchange(format!(
                "provider returned error: {error}"
            )));
        }

        let code = callback
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                AppError::AuthExchange("callback is missing the authorization code".to_string())
            })?;

        let token = self.exchange_code(code).await?;
        let userinfo = self.fetch_userinfo(&token.access_token).await?;
        profile_from_userinfo(userinfo)
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::AuthExchange(format!(
        "{operation} failed with status {status}: {body}"
    )))
}

/// Normalize a userinfo document into a [`Profile`]
///
/// The external id comes from `sub` (OpenID Connect) or `id` (legacy
/// endpoints). The display name falls back to given/family name and then
/// to the external id.
pub fn profile_from_userinfo(userinfo: Value) -> Result<Profile, AppError> {
    let Value::Object(attributes) = userinfo else {
        return Err(AppError::AuthExchange(
            "userinfo response is not a JSON object".to_string(),
        ));
    };

    let external_id = ["sub", "id"]
        .iter()
        .find_map(|key| attributes.get(*key).and_then(id_string))
        .ok_or_else(|| {
            AppError::AuthExchange("userinfo response has no user id".to_string())
        })?;

    let display_name = display_name(&attributes).unwrap_or_else(|| external_id.clone());

    Ok(Profile {
        external_id,
        display_name,
        raw_attributes: attributes,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn display_name(attributes: &Map<String, Value>) -> Option<String> {
    let text = |key: &str| {
        attributes
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(name) = text("name") {
        return Some(name.to_string());
    }

    let parts: Vec<&str> = [text("given_name"), text("family_name")]
        .into_iter()
        .flatten()
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Json, Router, http::HeaderMap, routing::{get, post}};
    use serde_json::json;
    use std::collections::HashMap;

    fn resolver_with_endpoints(base: &str) -> GoogleProfileResolver {
        let mut config = crate::config::tests::valid_config();
        config.auth.token_url = format!("{base}/token");
        config.auth.userinfo_url = format!("{base}/userinfo");
        GoogleProfileResolver::from_config(&config, reqwest::Client::new()).unwrap()
    }

    fn callback(code: &str) -> CallbackPayload {
        CallbackPayload {
            code: Some(code.to_string()),
            state: Some("state".to_string()),
            error: None,
        }
    }

    /// Serve a fake provider on an ephemeral port and return its base URL
    async fn spawn_provider() -> String {
        async fn token(Form(form): Form<HashMap<String, String>>) -> axum::response::Response {
            use axum::response::IntoResponse;
            if form.get("code").map(String::as_str) != Some("good-code")
                || form.get("client_secret").map(String::as_str) != Some("google-client-secret")
            {
                return (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant"})),
                )
                    .into_response();
            }
            Json(json!({"access_token": "at-123", "token_type": "Bearer", "expires_in": 3599}))
                .into_response()
        }

        async fn userinfo(headers: HeaderMap) -> axum::response::Response {
            use axum::response::IntoResponse;
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer at-123");
            if !authorized {
                return axum::http::StatusCode::UNAUTHORIZED.into_response();
            }
            Json(json!({"sub": "ext-42", "name": "Ada", "locale": "en"})).into_response()
        }

        let app = Router::new()
            .route("/token", post(token))
            .route("/userinfo", get(userinfo));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn authorization_url_requests_profile_and_account_chooser() {
        let resolver = resolver_with_endpoints("http://127.0.0.1:1");
        let url = Url::parse(&resolver.authorization_url("csrf-token")).unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "google-client-id");
        assert_eq!(
            query["redirect_uri"],
            "http://localhost:3000/auth/provider/callback"
        );
        assert_eq!(query["scope"], "profile");
        assert_eq!(query["prompt"], "select_account");
        assert_eq!(query["state"], "csrf-token");
    }

    #[test]
    fn profile_prefers_sub_and_name() {
        let profile = profile_from_userinfo(json!({
            "sub": "ext-42",
            "id": "legacy",
            "name": "Ada",
            "picture": "https://example.com/ada.png"
        }))
        .unwrap();

        assert_eq!(profile.external_id, "ext-42");
        assert_eq!(profile.display_name, "Ada");
        assert_eq!(profile.raw_attributes["picture"], "https://example.com/ada.png");
    }

    #[test]
    fn profile_falls_back_to_id_and_name_parts() {
        let profile = profile_from_userinfo(json!({
            "id": 1234567890,
            "given_name": "Ada",
            "family_name": "Lovelace"
        }))
        .unwrap();

        assert_eq!(profile.external_id, "1234567890");
        assert_eq!(profile.display_name, "Ada Lovelace");
    }

    #[test]
    fn profile_without_name_uses_external_id() {
        let profile = profile_from_userinfo(json!({"sub": "ext-7", "name": "  "})).unwrap();
        assert_eq!(profile.display_name, "ext-7");
    }

    #[test]
    fn profile_without_id_is_rejected() {
        let error = profile_from_userinfo(json!({"name": "Ada", "sub": ""})).unwrap_err();
        assert!(matches!(error, AppError::AuthExchange(msg) if msg.contains("no user id")));

        let error = profile_from_userinfo(json!(["ext-42"])).unwrap_err();
        assert!(matches!(error, AppError::AuthExchange(_)));
    }

    #[tokio::test]
    async fn provider_error_is_rejected_without_network() {
        let resolver = resolver_with_endpoints("http://127.0.0.1:1");
        let payload = CallbackPayload {
            error: Some("access_denied".to_string()),
            ..CallbackPayload::default()
        };

        let error = resolver.resolve(&payload).await.unwrap_err();
        assert!(matches!(error, AppError::AuthExchange(msg) if msg.contains("access_denied")));
    }

    #[tokio::test]
    async fn missing_code_is_rejected_without_network() {
        let resolver = resolver_with_endpoints("http://127.0.0.1:1");
        let error = resolver.resolve(&callback("")).await.unwrap_err();
        assert!(matches!(error, AppError::AuthExchange(msg) if msg.contains("authorization code")));
    }

    #[tokio::test]
    async fn resolve_exchanges_code_and_reads_userinfo() {
        let base = spawn_provider().await;
        let resolver = resolver_with_endpoints(&base);

        let profile = resolver.resolve(&callback("good-code")).await.unwrap();

        assert_eq!(profile.external_id, "ext-42");
        assert_eq!(profile.display_name, "Ada");
        assert_eq!(profile.raw_attributes["locale"], "en");
    }

    #[tokio::test]
    async fn rejected_code_is_an_exchange_error() {
        let base = spawn_provider().await;
        let resolver = resolver_with_endpoints(&base);

        let error = resolver.resolve(&callback("stale-code")).await.unwrap_err();
        assert!(matches!(error, AppError::AuthExchange(msg) if msg.contains("status 400")));
    }
}
