//! Server-rendered pages
//!
//! Display names come from the identity provider, so they are escaped
//! before they reach the markup.

use axum::{Router, response::Html, routing::get};

use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};

/// Create pages router
///
/// Routes:
/// - GET / - Landing page
/// - GET /profile - Profile page (authenticated)
pub fn pages_router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/profile", get(profile))
}

fn layout(body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>oauthgate</title>\n\
         <link rel=\"stylesheet\" href=\"/stylesheets/style.css\">\n</head>\n\
         <body>\n{body}\n</body>\n</html>\n"
    ))
}

/// GET /
async fn landing(MaybeUser(principal): MaybeUser) -> Html<String> {
    match principal {
        Some(principal) => layout(&format!(
            "<p>Hello {} <a href=\"/logout\">Logout</a></p>",
            html_escape::encode_text(&principal.display_name)
        )),
        None => layout(
            "<p>Hello Anonymous</p>\n<p><a href=\"/auth/provider\">Login with Google</a></p>",
        ),
    }
}

/// GET /profile
async fn profile(CurrentUser(principal): CurrentUser) -> Html<String> {
    layout(&format!(
        "<p>Hello {}<br> <a href=\"/logout\">Logout</a></p>",
        html_escape::encode_text(&principal.display_name)
    ))
}
