//! Operator diagnostics
//!
//! Mounted behind [`require_operator`](crate::auth::require_operator).

use axum::{Json, Router, extract::State, routing::get};

use crate::AppState;
use crate::data::StoredSession;
use crate::error::AppError;

/// Create diagnostics router
///
/// Routes:
/// - GET /diagnostics/sessions - Live sessions snapshot
pub fn diagnostics_router() -> Router<AppState> {
    Router::new().route("/diagnostics/sessions", get(list_sessions))
}

/// GET /diagnostics/sessions
async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<StoredSession>>, AppError> {
    let sessions = state.sessions.list_sessions().await?;
    tracing::info!(count = sessions.len(), "Listed live sessions for operator");
    Ok(Json(sessions))
}
