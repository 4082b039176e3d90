//! A route for handling the OIDC callback.

use std::collections::HashMap;

use crate::session::{Session, Transaction};
use crate::{error::HttpError, ServerState};

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use openidconnect::{Nonce, PkceCodeVerifier};
use tower_cookies::Cookies;
use tracing::{error, info};

/// A handler for receiving the authorization code from the identity
/// provider.
#[axum::debug_handler(state = ServerState)]
pub async fn callback_handler(
    State(state): State<ServerState>,
    cookies: Cookies,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Redirect, HttpError> {
    if let Some(err) = params.get("error") {
        error!(
            "identity provider returned an error: {} {}",
            err,
            params
                .get("error_description")
                .map(|s| s.as_str())
                .unwrap_or_default()
        );
        return Err(HttpError::BadRequest("Login failed"));
    }

    let transaction = Transaction::take(&cookies, &state)
        .ok_or(HttpError::BadRequest("Missing login transaction"))?;

    let returned_state = params
        .get("state")
        .ok_or(HttpError::BadRequest("No state parameter provided"))?;

    if *returned_state != transaction.state {
        error!("state parameter does not match the login transaction");
        return Err(HttpError::BadRequest("State checking failed"));
    }

    let code = params
        .get("code")
        .ok_or(HttpError::BadRequest("No code parameter provided"))?;

    let login = state
        .oidc
        .exchange(
            code,
            PkceCodeVerifier::new(transaction.code_verifier),
            &Nonce::new(transaction.nonce),
        )
        .await
        .map_err(|_| HttpError::BadRequest("Failed to complete login"))?;

    info!(
        "user {} logged in",
        login.claims.subject().unwrap_or("without subject")
    );

    Session::new(login.id_token).store(&cookies, &state)?;

    Ok(Redirect::to(&transaction.return_to))
}
