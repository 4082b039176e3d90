use crate::{session::Session, ServerState};

use axum::{extract::State, response::Redirect};
use tower_cookies::Cookies;
use tracing::info;

/// Clear the local session, and end the identity provider's session too when
/// logout propagation is enabled and the provider supports it.
#[axum::debug_handler(state = ServerState)]
pub async fn logout_handler(State(state): State<ServerState>, cookies: Cookies) -> Redirect {
    let base_url = &state.config.base_url;

    let Some(session) = Session::load(&cookies, &state) else {
        return Redirect::to(base_url.as_str());
    };
    Session::clear(&cookies, &state);

    let claims = session.claims().unwrap_or_default();
    info!(
        "user {} logged out",
        claims.subject().unwrap_or("without subject")
    );

    let end_session = state
        .config
        .oidc
        .idp_logout
        .then(|| state.oidc.end_session_url(&session.id_token, base_url))
        .flatten();

    match end_session {
        Some(url) => Redirect::to(url.as_str()),
        None => Redirect::to(base_url.as_str()),
    }
}
