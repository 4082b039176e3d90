use std::collections::HashMap;

use crate::{
    error::HttpError,
    session::{is_local_path, start_login},
    ServerState,
};

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use tower_cookies::Cookies;

/// Start a login, returning to `returnTo` afterwards. Anything other than a
/// local path returns to the home page instead.
#[axum::debug_handler(state = ServerState)]
pub async fn login_handler(
    State(state): State<ServerState>,
    cookies: Cookies,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, HttpError> {
    let return_to = params
        .get("returnTo")
        .map(|s| s.as_str())
        .filter(|s| is_local_path(s))
        .unwrap_or("/");

    start_login(&cookies, &state, return_to)
}
