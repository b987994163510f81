//! OAuth login flow
//!
//! Implements the OAuth 2.0 authorization code flow against the configured
//! provider, plus logout.

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;

use super::lifecycle::LogoutOutcome;
use super::middleware::session_id_from_jar;
use super::provider::CallbackPayload;
use super::session::{
    OAUTH_STATE_COOKIE, SESSION_COOKIE, oauth_state_cookie, removal_cookie, session_cookie,
    sign_session_id,
};
use crate::AppState;
use crate::error::AppError;

/// Create authentication router
///
/// Routes:
/// - GET /auth/provider - Redirect to the provider
/// - GET /auth/provider/callback - OAuth callback
/// - GET /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/provider", get(provider_redirect))
        .route("/auth/provider/callback", get(provider_callback))
        .route("/logout", get(logout))
}

// =============================================================================
// Provider OAuth
// =============================================================================

/// GET /auth/provider
///
/// Redirects the user to the provider's authorization page.
///
/// # Steps
/// 1. Generate CSRF state token
/// 2. Store state in cookie
/// 3. Redirect with client_id, redirect_uri, scope, prompt, state
async fn provider_redirect(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let login = state.sessions.begin_login();
    let secure = state.config.should_use_secure_cookies();

    tracing::debug!("Redirecting to identity provider");

    (
        jar.add(oauth_state_cookie(login.state, secure)),
        Redirect::to(&login.url),
    )
}

/// GET /auth/provider/callback
///
/// Handles the OAuth callback from the provider.
///
/// # Steps
/// 1. Take the CSRF state cookie (always cleared)
/// 2. Complete the login: profile, user record, session
/// 3. Set the session cookie and redirect to /profile
///
/// A rejected exchange sends the client back to `/`; an unreachable store
/// renders the failure page.
async fn provider_callback(
    State(state): State<AppState>,
    Query(callback): Query<CallbackPayload>,
    jar: CookieJar,
) -> Response {
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_owned());
    let jar = jar.remove(removal_cookie(OAUTH_STATE_COOKIE));

    let established = match state
        .sessions
        .complete_login(&callback, expected_state.as_deref())
        .await
    {
        Ok(established) => established,
        Err(AppError::AuthExchange(_)) => return (jar, Redirect::to("/")).into_response(),
        Err(error) => return (jar, error).into_response(),
    };

    let cookie_value =
        match sign_session_id(&established.session_id, &state.config.auth.session_secret) {
            Ok(value) => value,
            Err(error) => {
                state
                    .sessions
                    .logout(Some(&established.session_id))
                    .await;
                return (jar, error).into_response();
            }
        };

    let secure = state.config.should_use_secure_cookies();
    let jar = jar.add(session_cookie(cookie_value, established.ttl, secure));

    (jar, Redirect::to("/profile")).into_response()
}

// =============================================================================
// Logout
// =============================================================================

/// GET /logout
///
/// Deletes the server-side session (best effort) and always clears the
/// session cookie before redirecting to `/`.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let session_id = session_id_from_jar(&jar, &state.config.auth.session_secret);

    if let LogoutOutcome::StoreFailed(error) = state.sessions.logout(session_id.as_deref()).await {
        tracing::debug!(%error, "Logout continued without store-side delete");
    }

    (
        jar.remove(removal_cookie(SESSION_COOKIE)),
        Redirect::to("/"),
    )
}
