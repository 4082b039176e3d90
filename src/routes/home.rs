//! The greeting page for an authenticated user.

use crate::{error::HttpError, session::Authenticated, template::HomePage, ServerState};

use axum::{extract::State, response::Html};

#[axum::debug_handler(state = ServerState)]
pub async fn home_handler(
    State(state): State<ServerState>,
    Authenticated { claims, .. }: Authenticated,
) -> Result<Html<String>, HttpError> {
    let page = HomePage::new(&claims, &state.config.service_url);

    page.render_file(&state.config.template)
        .await
        .map(Html)
        .map_err(|_| HttpError::Internal("Failed to render page"))
}
