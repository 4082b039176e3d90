//! Log filter selection.

use thiserror::Error;
use tracing_subscriber::{filter::ParseError, EnvFilter};

/// The filter used when the configured one is rejected.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown log level {0:?}")]
    UnknownLevel(String),
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),
}

/// Build the log filter for a configured level.
///
/// Besides `tracing` directives this accepts the npm level names (`http`,
/// `verbose`, `silly`). A single bare word must be a level: `EnvFilter` would
/// otherwise read it as a target name and silently drop everything else.
pub fn filter(level: &str) -> Result<EnvFilter, Error> {
    let level = level.trim();

    let directive = match level.to_ascii_lowercase().as_str() {
        "silly" => "trace",
        "verbose" | "http" => "debug",
        "warning" => "warn",
        "trace" | "debug" | "info" | "warn" | "error" | "off" => level,
        _ if level.contains(&['=', ',', '['][..]) => level,
        _ => return Err(Error::UnknownLevel(level.to_string())),
    };

    Ok(EnvFilter::try_new(directive)?)
}
