//! Session cookie handling
//!
//! The cookie carries only the session id, signed with HMAC-SHA256 so a
//! forged or truncated value is rejected before the store is queried.
//! The session store remains the source of truth for validity.

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Cookie holding the signed session id
pub const SESSION_COOKIE: &str = "sid";

/// Cookie holding the CSRF state while the provider round trip is in flight
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Lifetime of the CSRF state cookie
const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

fn mac_for(secret: &str) -> Result<HmacSha256, AppError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session secret: {e}")))
}

/// Sign a session id for the cookie
///
/// Token format: `{session_id}.{base64(hmac_sha256(session_id))}`
pub fn sign_session_id(session_id: &str, secret: &str) -> Result<String, AppError> {
    let mut mac = mac_for(secret)?;
    mac.update(session_id.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", session_id, signature_b64))
}

/// Verify a signed cookie value and return the session id
///
/// Returns `None` for anything malformed or signed with another secret.
pub fn verify_signed_session_id(value: &str, secret: &str) -> Option<String> {
    let (session_id, signature_b64) = value.rsplit_once('.')?;
    if session_id.is_empty() {
        return None;
    }

    let signature = general_purpose::URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
    let mut mac = mac_for(secret).ok()?;
    mac.update(session_id.as_bytes());
    mac.verify_slice(&signature).ok()?;

    Some(session_id.to_string())
}

/// Generate a random CSRF state token
pub fn generate_csrf_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Session cookie: HttpOnly, whole site, lives as long as the session
pub fn session_cookie(value: String, max_age: std::time::Duration, secure: bool) -> Cookie<'static> {
    let max_age = time::Duration::seconds(i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX));
    Cookie::build((SESSION_COOKIE, value))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Short-lived cookie remembering the CSRF state for the callback
pub fn oauth_state_cookie(state: String, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, state))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(OAUTH_STATE_MAX_AGE_SECS))
        .build()
}

/// Cookie matching `name` on the paths we set it, for use with `CookieJar::remove`
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

/// Already-expired cookie for `name`
///
/// `CookieJar::remove` only emits a removal for cookies the request carried;
/// this one can be added to any jar.
pub fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = removal_cookie(name);
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn signed_id_round_trips() {
        let signed = sign_session_id("abc_DEF-123", SECRET).unwrap();
        assert!(signed.starts_with("abc_DEF-123."));
        assert_eq!(
            verify_signed_session_id(&signed, SECRET).as_deref(),
            Some("abc_DEF-123")
        );
    }

    #[test]
    fn tampered_or_foreign_values_are_rejected() {
        let signed = sign_session_id("session-a", SECRET).unwrap();
        let (_, signature) = signed.rsplit_once('.').unwrap();

        assert_eq!(
            verify_signed_session_id(&format!("session-b.{signature}"), SECRET),
            None
        );
        assert_eq!(
            verify_signed_session_id(&signed, "another-secret-another-secret-xx"),
            None
        );
        assert_eq!(verify_signed_session_id("session-a", SECRET), None);
        assert_eq!(verify_signed_session_id(".abc", SECRET), None);
        assert_eq!(verify_signed_session_id("session-a.!!!", SECRET), None);
    }

    #[test]
    fn session_cookie_is_http_only_with_ttl() {
        let cookie = session_cookie("v".to_string(), std::time::Duration::from_secs(3600), false);
        let header = cookie.to_string();

        assert!(header.starts_with("sid=v"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=3600"));
        assert!(!header.contains("Secure"));

        let secure = session_cookie("v".to_string(), std::time::Duration::from_secs(60), true);
        assert!(secure.to_string().contains("Secure"));
    }

    #[test]
    fn expired_cookie_clears_value() {
        let header = expired_cookie(SESSION_COOKIE).to_string();
        assert!(header.starts_with("sid=;"));
        assert!(header.contains("Max-Age=0"));
        assert!(header.contains("Path=/"));
    }

    #[test]
    fn csrf_states_differ() {
        assert_ne!(generate_csrf_state(), generate_csrf_state());
        assert_eq!(generate_csrf_state().len(), 32);
    }
}
