//! Request authentication
//!
//! Extractors that re-derive the principal from the session cookie on
//! every request, and the gate for operator-only routes.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use sha2::{Digest, Sha256};

use super::lifecycle::Principal;
use super::session::{SESSION_COOKIE, expired_cookie, verify_signed_session_id};
use crate::AppState;
use crate::error::AppError;

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Session id from a correctly signed `sid` cookie
pub(crate) fn session_id_from_jar(jar: &CookieJar, secret: &str) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| verify_signed_session_id(cookie.value(), secret))
}

fn session_id_from_headers(headers: &HeaderMap, secret: &str) -> Option<String> {
    session_id_from_jar(&CookieJar::from_headers(headers), secret)
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    CookieJar::from_headers(headers).get(SESSION_COOKIE).is_some()
}

/// Extractor for the current authenticated user
///
/// Anonymous requests are redirected to `/`; a stale cookie is cleared
/// on the way.
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(principal): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", principal.display_name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

/// Why [`CurrentUser`] could not be extracted
#[derive(Debug)]
pub enum AuthRejection {
    Anonymous { stale_cookie: bool },
    Failed(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Anonymous { stale_cookie: true } => (
                CookieJar::new().add(expired_cookie(SESSION_COOKIE)),
                Redirect::to("/"),
            )
                .into_response(),
            AuthRejection::Anonymous { stale_cookie: false } => Redirect::to("/").into_response(),
            AuthRejection::Failed(error) => error.into_response(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeUser(principal) = MaybeUser::from_request_parts(parts, state)
            .await
            .map_err(AuthRejection::Failed)?;

        principal.map(CurrentUser).ok_or_else(|| AuthRejection::Anonymous {
            stale_cookie: has_session_cookie(&parts.headers),
        })
    }
}

/// Optional current user extractor
///
/// `None` when not authenticated. A failing session store is still an
/// error, not an anonymous request.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>().cloned() {
            return Ok(MaybeUser(Some(principal)));
        }

        let app_state = AppState::from_ref(state);
        let Some(session_id) =
            session_id_from_headers(&parts.headers, &app_state.config.auth.session_secret)
        else {
            return Ok(MaybeUser(None));
        };

        let principal = app_state.sessions.current_principal(&session_id).await?;
        if let Some(principal) = &principal {
            parts.extensions.insert(principal.clone());
        }

        Ok(MaybeUser(principal))
    }
}

/// Middleware guarding operator-only routes
///
/// Routes are hidden (404) unless `diagnostics.operator_token` is set, and
/// then require `Authorization: Bearer <token>`.
///
/// # Usage
/// ```ignore
/// let operator_routes = Router::new()
///     .route("/diagnostics/sessions", get(list_sessions))
///     .route_layer(middleware::from_fn_with_state(state, require_operator));
/// ```
pub async fn require_operator(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.diagnostics.operator_token.as_deref() else {
        return Err(AppError::NotFound);
    };

    let presented = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    // Compare digests so the comparison time does not depend on the token
    if Sha256::digest(presented.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        tracing::warn!("Rejected operator request with a wrong token");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
