//! Fixtures shared by the unit tests.

use crate::config::Config;
use crate::error::HttpError;
use crate::oidc::Provider;
use crate::session::{Session, Transaction, SESSION_COOKIE, TRANSACTION_COOKIE};
use crate::ServerState;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use openidconnect::{
    core::{
        CoreClient, CoreHmacKey, CoreIdToken, CoreIdTokenClaims, CoreJsonWebKeySet,
        CoreJwsSigningAlgorithm,
    },
    Audience, AuthUrl, ClientId, ClientSecret, EmptyAdditionalClaims, EndUserName,
    EndUserUsername, IssuerUrl, Nonce, RedirectUrl, StandardClaims, SubjectIdentifier, TokenUrl,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_cookies::{cookie::CookieJar, Cookie, CookieManagerLayer, Cookies};
use url::Url;

pub const ISSUER: &str = "https://login.example.com";
pub const AUTHORIZATION_ENDPOINT: &str = "https://login.example.com/authorize";
pub const END_SESSION_ENDPOINT: &str = "https://login.example.com/logout";
pub const SERVICE_URL: &str = "https://app.example.com";
pub const CLIENT_ID: &str = "client";
pub const CLIENT_SECRET: &str = "a client secret long enough for HS256";

pub fn config_with(vars: &[(&str, &str)]) -> Config {
    let lookup = |key: &str| {
        vars.iter()
            .rev()
            .chain(
                [
                    ("OIDC_ISSUER", ISSUER),
                    ("SERVICE_URL", SERVICE_URL),
                    ("OIDC_CLIENT_ID", CLIENT_ID),
                    ("OIDC_CLIENT_SECRET", CLIENT_SECRET),
                ]
                .iter(),
            )
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    };

    Config::from_lookup(lookup).expect("load test config")
}

/// A client for the test provider that exchanges codes at `token_url`.
pub fn client_with(token_url: &str) -> CoreClient {
    CoreClient::new(
        ClientId::new(CLIENT_ID.to_string()),
        Some(ClientSecret::new(CLIENT_SECRET.to_string())),
        IssuerUrl::new(ISSUER.to_string()).expect("issuer url"),
        AuthUrl::new(AUTHORIZATION_ENDPOINT.to_string()).expect("authorization url"),
        Some(TokenUrl::new(token_url.to_string()).expect("token url")),
        None,
        CoreJsonWebKeySet::new(Vec::new()),
    )
    .set_redirect_uri(
        RedirectUrl::new(format!("{}/callback", SERVICE_URL)).expect("redirect url"),
    )
}

pub fn client() -> CoreClient {
    client_with(&format!("{}/token", ISSUER))
}

/// A provider that accepts ID tokens signed with the client secret.
pub fn provider_with(client: CoreClient) -> Provider {
    Provider::new(
        client,
        ClientId::new(CLIENT_ID.to_string()),
        "openid profile email User.Read",
    )
    .with_end_session(Some(
        Url::parse(END_SESSION_ENDPOINT).expect("end session url"),
    ))
    .with_signing_algs([CoreJwsSigningAlgorithm::HmacSha256])
}

pub fn provider() -> Provider {
    provider_with(client())
}

pub fn state_with(vars: &[(&str, &str)]) -> ServerState {
    ServerState::new(config_with(vars), provider())
}

pub fn state() -> ServerState {
    state_with(&[])
}

/// A state whose provider exchanges codes at `token_url`.
pub fn state_with_token_url(token_url: &str) -> ServerState {
    ServerState::new(config_with(&[]), provider_with(client_with(token_url)))
}

/// An unsigned token carrying `claims`, for sessions that skip verification.
pub fn id_token(claims: &Value) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// An ID token for Alice issued by the test provider, signed with the client
/// secret.
pub fn signed_id_token(nonce: &str) -> CoreIdToken {
    let now = chrono::Utc::now();

    let claims = CoreIdTokenClaims::new(
        IssuerUrl::new(ISSUER.to_string()).expect("issuer url"),
        vec![Audience::new(CLIENT_ID.to_string())],
        now + chrono::Duration::seconds(3600),
        now,
        StandardClaims::new(SubjectIdentifier::new("abc123".to_string()))
            .set_name(Some(EndUserName::new("Alice".to_string()).into()))
            .set_preferred_username(Some(EndUserUsername::new(
                "alice@example.com".to_string(),
            ))),
        EmptyAdditionalClaims {},
    )
    .set_nonce(Some(Nonce::new(nonce.to_string())));

    CoreIdToken::new(
        claims,
        &CoreHmacKey::new(CLIENT_SECRET.as_bytes().to_vec()),
        CoreJwsSigningAlgorithm::HmacSha256,
        None,
        None,
    )
    .expect("sign id token")
}

/// Serve a token endpoint on localhost that answers every code exchange with
/// `id_token`. Returns the endpoint's URL.
pub async fn token_endpoint(id_token: String) -> String {
    let app = Router::new().route(
        "/token",
        post(move || {
            let id_token = id_token.clone();
            async move {
                Json(json!({
                    "access_token": "access-token",
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "id_token": id_token,
                }))
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind token endpoint");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await });

    format!("http://{}/token", addr)
}

/// Run `store` against a cookie jar and return the response carrying the
/// resulting Set-Cookie headers.
async fn mint<F>(state: &ServerState, store: F) -> Response<Body>
where
    F: FnOnce(&Cookies, &ServerState) -> Result<(), HttpError> + Clone + Send + Sync + 'static,
{
    let app = Router::new()
        .route(
            "/",
            get(
                move |State(state): State<ServerState>, cookies: Cookies| async move {
                    store(&cookies, &state)
                },
            ),
        )
        .with_state(state.clone())
        .layer(CookieManagerLayer::new());

    app.oneshot(Request::get("/").body(Body::empty()).expect("build request"))
        .await
        .expect("mint cookies")
}

/// Store `session` without going through the identity provider, returning
/// a Cookie header carrying it.
pub async fn store_session(state: &ServerState, session: Session) -> String {
    let response = mint(state, move |cookies, state| session.store(cookies, state)).await;

    cookie_header(&response, SESSION_COOKIE).expect("session cookie set")
}

/// Log in as a user with `claims`, returning a Cookie header carrying the
/// session.
pub async fn session_cookie(state: &ServerState, claims: Value) -> String {
    store_session(state, Session::new(id_token(&claims))).await
}

/// The `name=value` pair of a pending login transaction's cookie.
pub async fn transaction_cookie(state: &ServerState, transaction: Transaction) -> String {
    let response = mint(state, move |cookies, state| transaction.store(cookies, state)).await;

    set_cookie(&response, TRANSACTION_COOKIE).expect("transaction cookie set")
}

fn set_cookie_pairs(response: &Response<Body>) -> impl Iterator<Item = &str> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
}

/// The `name=value` pair of a cookie set by a response.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookie_pairs(response)
        .find(|pair| pair.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

/// A Cookie header for every non-empty cookie a response set under `name`,
/// including `name.0`, `name.1`, ... chunks.
pub fn cookie_header(response: &Response<Body>, name: &str) -> Option<String> {
    let pairs: Vec<_> = set_cookie_pairs(response)
        .filter(|pair| match pair.split_once('=') {
            Some((cookie, value)) => {
                !value.is_empty()
                    && (cookie == name
                        || cookie
                            .strip_prefix(name)
                            .and_then(|rest| rest.strip_prefix('.'))
                            .is_some_and(|index| index.parse::<usize>().is_ok()))
            }
            None => false,
        })
        .collect();

    (!pairs.is_empty()).then(|| pairs.join("; "))
}

/// Every Set-Cookie header of a response, in full.
pub fn set_cookie_headers(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Decrypt the value of a private cookie from its `name=value` pair.
pub fn decrypt(state: &ServerState, pair: &str) -> Option<String> {
    let cookie = Cookie::parse(pair.to_string()).ok()?;
    let name = cookie.name().to_string();

    let mut jar = CookieJar::new();
    jar.add_original(cookie);

    jar.private(&state.key)
        .get(&name)
        .map(|cookie| cookie.value().to_string())
}
