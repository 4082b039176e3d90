//! Helper functions for performing the OIDC flow.

use crate::claims::IdentityClaims;
use crate::config::Config;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use openidconnect::{
    core::{
        CoreAuthDisplay, CoreAuthenticationFlow, CoreClaimName, CoreClaimType, CoreClient,
        CoreClientAuthMethod, CoreGrantType, CoreIdToken, CoreJsonWebKey, CoreJsonWebKeyType,
        CoreJsonWebKeyUse, CoreJweContentEncryptionAlgorithm, CoreJweKeyManagementAlgorithm,
        CoreJwsSigningAlgorithm, CoreResponseMode, CoreResponseType, CoreSubjectIdentifierType,
    },
    reqwest::async_http_client,
    AdditionalProviderMetadata, AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl,
    Nonce, PkceCodeChallenge, PkceCodeVerifier, ProviderMetadata, RedirectUrl, Scope,
    TokenResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;
use url::Url;

/// Errors while setting up OIDC.
#[derive(Error, Clone, Debug)]
pub enum SetupError {
    #[error("invalid issuer url")]
    InvalidIssuer,
    #[error("invalid end session url")]
    InvalidEndSession,
    #[error("error during OIDC discovery")]
    DiscoveryError,
}

/// Errors while completing a login.
#[derive(Error, Clone, Debug)]
pub enum Error {
    #[error("failed to exchange authorization code")]
    ExchangeError,
    #[error("token response did not include an id token")]
    MissingIdToken,
    #[error("id token failed verification")]
    InvalidIdToken,
    #[error("id token payload could not be decoded")]
    MalformedIdToken,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct EndSessionProviderMetadata {
    end_session_endpoint: Option<String>,
}

impl AdditionalProviderMetadata for EndSessionProviderMetadata {}

type DiscoveredProviderMetadata = ProviderMetadata<
    EndSessionProviderMetadata,
    CoreAuthDisplay,
    CoreClientAuthMethod,
    CoreClaimName,
    CoreClaimType,
    CoreGrantType,
    CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm,
    CoreJwsSigningAlgorithm,
    CoreJsonWebKeyType,
    CoreJsonWebKeyUse,
    CoreJsonWebKey,
    CoreResponseMode,
    CoreResponseType,
    CoreSubjectIdentifierType,
>;

/// An in-progress authorization request.
pub struct AuthRequest {
    pub url: Url,
    pub state: CsrfToken,
    pub nonce: Nonce,
    pub code_verifier: PkceCodeVerifier,
}

/// The verified result of a completed login.
#[derive(Clone, Debug)]
pub struct Login {
    pub id_token: String,
    pub claims: IdentityClaims,
}

/// An OIDC client for the configured identity provider.
#[derive(Clone, Debug)]
pub struct Provider {
    client: CoreClient,
    client_id: ClientId,
    end_session: Option<Url>,
    scopes: Vec<Scope>,
    signing_algs: Vec<CoreJwsSigningAlgorithm>,
}

impl Provider {
    /// Wrap an already configured client. `openid` in `scope` is implied.
    ///
    /// ID tokens are expected to be signed with RS256 and the provider is
    /// assumed not to support RP-initiated logout until told otherwise.
    pub fn new(client: CoreClient, client_id: ClientId, scope: &str) -> Self {
        let scopes = scope
            .split_whitespace()
            .filter(|scope| *scope != "openid")
            .map(|scope| Scope::new(scope.to_string()))
            .collect();

        Self {
            client,
            client_id,
            end_session: None,
            scopes,
            signing_algs: vec![CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256],
        }
    }

    pub fn with_end_session(mut self, end_session: Option<Url>) -> Self {
        self.end_session = end_session;

        self
    }

    /// Set the algorithms ID tokens may be signed with. `none` is never
    /// accepted.
    pub fn with_signing_algs<I>(mut self, algs: I) -> Self
    where
        I: IntoIterator<Item = CoreJwsSigningAlgorithm>,
    {
        let algs: Vec<_> = algs
            .into_iter()
            .filter(|alg| *alg != CoreJwsSigningAlgorithm::None)
            .collect();

        if !algs.is_empty() {
            self.signing_algs = algs;
        }

        self
    }

    /// Discover the identity provider's endpoints and build a client for it.
    pub async fn discover(config: &Config) -> Result<Self, SetupError> {
        let issuer_url = IssuerUrl::new(config.oidc.issuer.to_string()).map_err(|e| {
            error!("error setting up issuer url: {}", e);
            SetupError::InvalidIssuer
        })?;

        let provider_metadata =
            DiscoveredProviderMetadata::discover_async(issuer_url, async_http_client)
                .await
                .map_err(|e| {
                    error!("failed OIDC discovery: {}", e);
                    SetupError::DiscoveryError
                })?;

        let end_session = provider_metadata
            .additional_metadata()
            .end_session_endpoint
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| {
                error!("provider returned an invalid end session url: {}", e);
                SetupError::InvalidEndSession
            })?;

        let signing_algs = provider_metadata
            .id_token_signing_alg_values_supported()
            .clone();

        let redirect_url = config.url_for("callback");
        let client_id = ClientId::new(config.oidc.client_id.clone());

        let client = CoreClient::from_provider_metadata(
            provider_metadata,
            client_id.clone(),
            Some(ClientSecret::new(config.oidc.client_secret.clone())),
        )
        .set_redirect_uri(RedirectUrl::from_url(redirect_url));

        Ok(Self::new(client, client_id, &config.oidc.scope)
            .with_end_session(end_session)
            .with_signing_algs(signing_algs))
    }

    /// Start an authorization code request with a fresh state, nonce and PKCE
    /// challenge.
    pub fn authorize(&self) -> AuthRequest {
        let (challenge, code_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, state, nonce) = self
            .scopes
            .iter()
            .fold(
                self.client.authorize_url(
                    CoreAuthenticationFlow::AuthorizationCode,
                    CsrfToken::new_random,
                    Nonce::new_random,
                ),
                |request, scope| request.add_scope(scope.clone()),
            )
            .set_pkce_challenge(challenge)
            .url();

        AuthRequest {
            url,
            state,
            nonce,
            code_verifier,
        }
    }

    /// Exchange an authorization code and verify the returned ID token.
    pub async fn exchange(
        &self,
        code: &str,
        code_verifier: PkceCodeVerifier,
        nonce: &Nonce,
    ) -> Result<Login, Error> {
        let token_response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(code_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                error!("error exchanging authorization code: {}", e);
                Error::ExchangeError
            })?;

        let id_token = token_response.id_token().ok_or_else(|| {
            error!("token response is missing an id token");
            Error::MissingIdToken
        })?;

        self.verify(id_token, nonce)
    }

    /// Verify an ID token and extract the identity claims from it.
    pub fn verify(&self, id_token: &CoreIdToken, nonce: &Nonce) -> Result<Login, Error> {
        id_token
            .claims(
                &self
                    .client
                    .id_token_verifier()
                    .set_allowed_algs(self.signing_algs.iter().cloned()),
                nonce,
            )
            .map_err(|e| {
                error!("id token verification failed: {}", e);
                Error::InvalidIdToken
            })?;

        let id_token = id_token.to_string();
        let payload = decode_payload(&id_token)?;

        Ok(Login {
            id_token,
            claims: IdentityClaims::from_id_token(payload),
        })
    }

    /// Where to send the browser after the local session has been cleared.
    ///
    /// Returns [`None`] if the provider does not support RP-initiated
    /// logout.
    pub fn end_session_url(&self, id_token: &str, post_logout_redirect: &Url) -> Option<Url> {
        let mut url = self.end_session.clone()?;

        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token)
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("post_logout_redirect_uri", post_logout_redirect.as_str());

        Some(url)
    }
}

/// Decode the claims of an ID token without verifying it. Only use this on
/// tokens that already passed [`Provider::verify`].
pub fn decode_payload(id_token: &str) -> Result<Map<String, Value>, Error> {
    let payload = id_token.split('.').nth(1).ok_or(Error::MalformedIdToken)?;
    let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        error!("id token payload is not base64: {}", e);
        Error::MalformedIdToken
    })?;

    serde_json::from_slice(&payload).map_err(|e| {
        error!("id token payload is not a JSON object: {}", e);
        Error::MalformedIdToken
    })
}
