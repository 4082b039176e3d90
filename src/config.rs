//! Process configuration, read once from the environment at startup.

use std::env;
use std::net::{IpAddr, Ipv6Addr};
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

const DEFAULT_ADDR: IpAddr = IpAddr::V6(Ipv6Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 3000;

const DEFAULT_SCOPE: &str = "openid profile email User.Read";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PUBLIC_DIR: &str = "public";
const DEFAULT_TEMPLATE: &str = "templates/index.html";

/// Errors while reading the configuration.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {0} is not a valid URL")]
    InvalidUrl(&'static str),
    #[error("environment variable {0} is not a valid port")]
    InvalidPort(&'static str),
    #[error("environment variable {0} is not a boolean")]
    InvalidBool(&'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub ip: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// The externally visible base URL exactly as it was configured.
    pub service_url: String,
    pub base_url: Url,
    pub public_dir: PathBuf,
    pub template: PathBuf,
    pub oidc: OidcConfig,
}

#[derive(Clone, Debug)]
pub struct OidcConfig {
    pub issuer: Url,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    /// Whether logging out also ends the session at the identity provider.
    pub idp_logout: bool,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn try_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup. Empty
    /// values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let required = |key: &'static str| get(key).ok_or(Error::Missing(key));

        let port = match get("SERVICE_PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| Error::InvalidPort("SERVICE_PORT"))?,
            None => DEFAULT_PORT,
        };

        let service_url = required("SERVICE_URL")?;
        let base_url = Url::parse(&service_url).map_err(|_| Error::InvalidUrl("SERVICE_URL"))?;
        let issuer = Url::parse(&required("OIDC_ISSUER")?)
            .map_err(|_| Error::InvalidUrl("OIDC_ISSUER"))?;

        let idp_logout = match get("OIDC_IDP_LOGOUT") {
            Some(value) => parse_bool(&value).ok_or(Error::InvalidBool("OIDC_IDP_LOGOUT"))?,
            None => true,
        };

        Ok(Self {
            ip: DEFAULT_ADDR,
            port,
            log_level: get("SERVICE_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            service_url,
            base_url,
            public_dir: get("SERVICE_PUBLIC_DIR")
                .unwrap_or_else(|| DEFAULT_PUBLIC_DIR.to_string())
                .into(),
            template: get("SERVICE_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string())
                .into(),
            oidc: OidcConfig {
                issuer,
                client_id: required("OIDC_CLIENT_ID")?,
                client_secret: required("OIDC_CLIENT_SECRET")?,
                scope: get("OIDC_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
                idp_logout,
            },
        })
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    /// An absolute URL for a path under the service's base URL.
    pub fn url_for(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base, path.trim_start_matches('/')));
        url.set_query(None);
        url.set_fragment(None);

        url
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
