//! Rendering of the home page template.

use std::path::Path;

use minijinja::{context, AutoEscape, Environment, Value};
use thiserror::Error;
use tracing::error;

use crate::claims::IdentityClaims;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to read template: {0}")]
    Read(#[from] std::io::Error),
    #[error("unable to render template: {0}")]
    Render(#[from] minijinja::Error),
}

/// The values substituted into the home page.
#[derive(Clone, Debug, PartialEq)]
pub struct HomePage {
    pub display_name: String,
    pub preferred_username: String,
    pub parsed_id_token: String,
    pub service_url: String,
}

impl HomePage {
    pub fn new(claims: &IdentityClaims, service_url: &str) -> Self {
        Self {
            display_name: claims.display_name().to_string(),
            preferred_username: claims.preferred_username().unwrap_or_default().to_string(),
            parsed_id_token: claims.to_pretty_json(),
            service_url: service_url.to_string(),
        }
    }

    /// Substitute the page values into a template. Claim values are HTML
    /// escaped; the service URL comes from configuration and is inserted as
    /// is.
    pub fn render(&self, template: &str) -> Result<String, Error> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);

        Ok(env.render_str(
            template,
            context! {
                displayName => &self.display_name,
                preferredUsername => &self.preferred_username,
                parsedIdToken => &self.parsed_id_token,
                serviceUrl => Value::from_safe_string(self.service_url.clone()),
            },
        )?)
    }

    /// Read a template from disk and render it.
    pub async fn render_file(&self, path: &Path) -> Result<String, Error> {
        let template = tokio::fs::read_to_string(path).await.map_err(|e| {
            error!("error reading template {}: {}", path.display(), e);
            e
        })?;

        self.render(&template).map_err(|e| {
            error!("error rendering template {}: {}", path.display(), e);
            e
        })
    }
}
