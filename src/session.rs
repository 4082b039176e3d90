//! Encrypted cookie sessions and the login guard.
//!
//! Both the in-flight authorization request and the authenticated session
//! are kept client-side in private (encrypted and authenticated) cookies, so
//! nothing is stored by the server between requests.

use crate::claims::IdentityClaims;
use crate::error::HttpError;
use crate::oidc::decode_payload;
use crate::ServerState;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use blake2::{Blake2b512, Digest};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tower_cookies::{cookie::SameSite, Cookie, Cookies, Key};
use tracing::{debug, error};

pub const SESSION_COOKIE: &str = "appSession";
pub const TRANSACTION_COOKIE: &str = "auth_verification";

/// How long a session stays valid without being used.
pub const ROLLING_DURATION: Duration = Duration::days(1);
/// How long a session stays valid after the login, however often it is used.
pub const ABSOLUTE_DURATION: Duration = Duration::days(7);
/// How long a login may take between leaving for the identity provider and
/// coming back.
pub const TRANSACTION_DURATION: Duration = Duration::hours(1);

// Plaintext bytes per cookie. Encryption and base64 grow this by roughly a
// third, which keeps each Set-Cookie header well under 4096 bytes.
const CHUNK_SIZE: usize = 2600;

/// Derive the cookie encryption key from the client secret.
pub fn cookie_key(secret: &str) -> Key {
    let digest = Blake2b512::new()
        .chain_update(b"sample-oidc-client-app cookie key")
        .chain_update(secret.as_bytes())
        .finalize();

    // a BLAKE2b-512 digest is exactly the 64 bytes Key::from requires
    Key::from(digest.as_slice())
}

/// Is this a path on this site, as opposed to something a browser would
/// treat as another origin?
pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// An authorization request that has been sent to the identity provider and
/// is waiting for the callback.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub return_to: String,
}

impl Transaction {
    pub fn store(&self, cookies: &Cookies, state: &ServerState) -> Result<(), HttpError> {
        store(TRANSACTION_COOKIE, self, TRANSACTION_DURATION, cookies, state)
    }

    /// Read and remove the pending transaction.
    pub fn take(cookies: &Cookies, state: &ServerState) -> Option<Self> {
        let transaction = load(TRANSACTION_COOKIE, cookies, state);
        clear(TRANSACTION_COOKIE, cookies, state);

        transaction
    }
}

/// An authenticated user's session. Only the verified ID token is kept; the
/// identity claims are read back out of it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Session {
    pub id_token: String,
    /// Unix time of the login.
    pub created_at: i64,
    /// Unix time of the last request made with this session.
    pub last_seen: i64,
}

impl Session {
    pub fn new(id_token: String) -> Self {
        let now = now();

        Self {
            id_token,
            created_at: now,
            last_seen: now,
        }
    }

    /// Sessions end after [`ROLLING_DURATION`] without use, or
    /// [`ABSOLUTE_DURATION`] after the login regardless of use.
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.last_seen > ROLLING_DURATION.whole_seconds()
            || now - self.created_at > ABSOLUTE_DURATION.whole_seconds()
    }

    /// The identity claims of the session's ID token.
    pub fn claims(&self) -> Option<IdentityClaims> {
        decode_payload(&self.id_token)
            .ok()
            .map(IdentityClaims::from_id_token)
    }

    pub fn store(&self, cookies: &Cookies, state: &ServerState) -> Result<(), HttpError> {
        let remaining = Duration::seconds(
            self.created_at + ABSOLUTE_DURATION.whole_seconds() - self.last_seen,
        );

        store(
            SESSION_COOKIE,
            self,
            remaining.min(ROLLING_DURATION),
            cookies,
            state,
        )
    }

    pub fn load(cookies: &Cookies, state: &ServerState) -> Option<Self> {
        load(SESSION_COOKIE, cookies, state)
    }

    pub fn clear(cookies: &Cookies, state: &ServerState) {
        clear(SESSION_COOKIE, cookies, state)
    }
}

/// The current Unix time in seconds.
pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn chunk_name(name: &str, index: usize) -> String {
    format!("{}.{}", name, index)
}

// Splits on char boundaries so every chunk stays valid UTF-8.
fn split_chunks(value: &str, size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = value;

    while rest.len() > size {
        let mut end = size;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }

        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks.push(rest);

    chunks
}

/// Store a value in a private cookie. Values too large for one cookie are
/// split over `name.0`, `name.1`, ... instead.
fn store<T: Serialize>(
    name: &'static str,
    value: &T,
    max_age: Duration,
    cookies: &Cookies,
    state: &ServerState,
) -> Result<(), HttpError> {
    let value = serde_json::to_string(value).map_err(|e| {
        error!("error serializing {} cookie: {}", name, e);
        HttpError::Internal("Failed to store session")
    })?;

    // drop chunks left over from a previous, larger value
    clear(name, cookies, state);

    let build = |name: String, value: String| {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(state.config.secure_cookies())
            .same_site(SameSite::Lax)
            .max_age(max_age)
            .build()
    };

    let private = cookies.private(&state.key);
    let chunks = split_chunks(&value, CHUNK_SIZE);

    if chunks.len() == 1 {
        private.add(build(name.to_string(), value.clone()));
    } else {
        for (index, chunk) in chunks.into_iter().enumerate() {
            private.add(build(chunk_name(name, index), chunk.to_string()));
        }
    }

    Ok(())
}

fn load<T: DeserializeOwned>(
    name: &'static str,
    cookies: &Cookies,
    state: &ServerState,
) -> Option<T> {
    let private = cookies.private(&state.key);

    // private cookies that fail to decrypt are treated as absent
    let value = match private.get(name) {
        Some(cookie) => cookie.value().to_string(),
        None => {
            let mut value = String::new();
            for index in 0.. {
                match private.get(&chunk_name(name, index)) {
                    Some(chunk) => value.push_str(chunk.value()),
                    None => break,
                }
            }

            value
        }
    };

    if value.is_empty() {
        return None;
    }

    serde_json::from_str(&value)
        .map_err(|e| debug!("ignoring malformed {} cookie: {}", name, e))
        .ok()
}

fn clear(name: &'static str, cookies: &Cookies, state: &ServerState) {
    let private = cookies.private(&state.key);
    let remove = |name: String| {
        private.remove(Cookie::build((name, "")).path("/").build());
    };

    if cookies.get(name).is_some() {
        remove(name.to_string());
    }

    let mut index = 0;
    while cookies.get(&chunk_name(name, index)).is_some() {
        remove(chunk_name(name, index));
        index += 1;
    }
}

/// Send the browser to the identity provider, remembering where to return
/// to once the login completes.
pub fn start_login(
    cookies: &Cookies,
    state: &ServerState,
    return_to: &str,
) -> Result<Redirect, HttpError> {
    let request = state.oidc.authorize();

    Transaction {
        state: request.state.secret().clone(),
        nonce: request.nonce.secret().clone(),
        code_verifier: request.code_verifier.secret().clone(),
        return_to: return_to.to_string(),
    }
    .store(cookies, state)?;

    Ok(Redirect::to(request.url.as_str()))
}

/// An extractor that only succeeds for requests with a live session. Other
/// requests are redirected to the identity provider and return to the
/// requested path afterwards.
///
/// Every successful extraction extends the session's rolling lifetime.
pub struct Authenticated {
    pub session: Session,
    pub claims: IdentityClaims,
}

#[async_trait]
impl FromRequestParts<ServerState> for Authenticated {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        if let Some(mut session) = Session::load(&cookies, state) {
            let now = now();

            if session.is_expired(now) {
                debug!("session expired");
                Session::clear(&cookies, state);
            } else if let Some(claims) = session.claims() {
                session.last_seen = now;
                session
                    .store(&cookies, state)
                    .map_err(IntoResponse::into_response)?;

                return Ok(Self { session, claims });
            }
        }

        let return_to = parts
            .uri
            .path_and_query()
            .map(|path| path.as_str())
            .filter(|path| is_local_path(path))
            .unwrap_or("/");

        debug!("no session, redirecting to the identity provider");
        Err(start_login(&cookies, state, return_to).into_response())
    }
}
