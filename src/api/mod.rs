//! HTTP handlers
//!
//! - `pages`: landing and profile pages
//! - `diagnostics`: operator-only session listing
//! - `metrics`: Prometheus exposition

mod diagnostics;
mod metrics;
mod pages;

use axum::{Router, middleware};

use crate::AppState;
use crate::auth::require_operator;

pub use metrics::metrics_router;
pub use pages::pages_router;

/// Operator-only routes, gated by `diagnostics.operator_token`
pub fn operator_router(state: AppState) -> Router<AppState> {
    diagnostics::diagnostics_router()
        .route_layer(middleware::from_fn_with_state(state, require_operator))
}
