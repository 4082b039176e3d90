mod callback;
mod health;
mod home;
mod login;
mod logout;

use crate::ServerState;
use callback::callback_handler;
use health::health_handler;
use home::home_handler;
use login::login_handler;
use logout::logout_handler;

use axum::routing::{get, Router};

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/login", get(login_handler))
        .route("/callback", get(callback_handler))
        .route("/logout", get(logout_handler))
}
