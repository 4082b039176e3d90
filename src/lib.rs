//! # oidc-sample
//!
//! A small web application demonstrating OpenID Connect login.
//!
//! ## About
//!
//! Visitors are sent to the configured identity provider to log in with the
//! authorization code flow. Once they return, the home page greets them with
//! the claims from their verified ID token. The session lives entirely in an
//! encrypted cookie; nothing is persisted on the server.

pub mod claims;
pub mod config;
pub mod error;
pub mod logging;
pub mod oidc;
mod routes;
pub mod session;
pub mod shutdown;
pub mod template;

#[cfg(test)]
mod testing;

pub use routes::routes;

use std::sync::Arc;

use axum::{extract::Request, Router};
use tower::ServiceBuilder;
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::{
    services::ServeDir,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::{info_span, Level};

/// Attached to every log line.
pub const SERVICE_NAME: &str = "sample-oidc-client-app";

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<config::Config>,
    pub oidc: Arc<oidc::Provider>,

    // Encrypts the session and login transaction cookies
    pub key: Key,
}

impl ServerState {
    pub fn new(config: config::Config, oidc: oidc::Provider) -> Self {
        let key = session::cookie_key(&config.oidc.client_secret);

        Self {
            config: Arc::new(config),
            oidc: Arc::new(oidc),
            key,
        }
    }
}

/// The full application: routes, static files and middleware.
pub fn app(state: ServerState) -> Router {
    let public = ServeDir::new(&state.config.public_dir).append_index_html_on_directories(false);

    routes()
        .fallback_service(public)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request| {
                            info_span!(
                                "request",
                                service = SERVICE_NAME,
                                method = %request.method(),
                                uri = %request.uri()
                            )
                        })
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(CookieManagerLayer::new()),
        )
}
