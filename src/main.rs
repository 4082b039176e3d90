//! oidc-sample serves a greeting page to users authenticated with OpenID
//! Connect.
//!
//! All configuration is read from the environment, see [`Config`].

use std::net::SocketAddr;

use oidc_sample::{
    app, config::Config, logging, oidc::Provider, shutdown, ServerState, SERVICE_NAME,
};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::try_env().context("invalid configuration")?;

    let (filter, rejected) = match logging::filter(&config.log_level) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(logging::DEFAULT_FILTER), Some(e)),
    };

    tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_env_filter(filter)
        .init();

    if let Some(e) = rejected {
        warn!(
            service = SERVICE_NAME,
            "ignoring SERVICE_LOG_LEVEL {:?} ({}), logging at {}",
            config.log_level,
            e,
            logging::DEFAULT_FILTER
        );
    }

    let span = info_span!("server", service = SERVICE_NAME);

    async move {
        let oidc = Provider::discover(&config)
            .await
            .context("unable to set up OIDC")?;

        let addr = SocketAddr::new(config.ip, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("unable to listen on {}", addr))?;

        let state = ServerState::new(config, oidc);

        info!("Server listening on port {}", addr.port());
        axum::serve(listener, app(state))
            .with_graceful_shutdown(shutdown::signal())
            .await
            .context("server unexpectedly stopped")
    }
    .instrument(span)
    .await
}
