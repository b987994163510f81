//! OAuth authentication
//!
//! Handles:
//! - Provider OAuth flow and profile resolution
//! - Session lifecycle (login, validation, logout)
//! - Authentication extractors and the operator gate

mod lifecycle;
mod middleware;
mod oauth;
mod provider;
pub mod session;

pub use lifecycle::{EstablishedSession, LoginRedirect, LogoutOutcome, Principal, SessionManager};
pub use middleware::{AuthRejection, CurrentUser, MaybeUser, require_operator};
pub use oauth::auth_router;
pub use provider::{CallbackPayload, GoogleProfileResolver, ProfileResolver, profile_from_userinfo};
pub use session::{SESSION_COOKIE, sign_session_id, verify_signed_session_id};
